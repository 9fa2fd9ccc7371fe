use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::commands::{self, Label};
use docsieve_core::config;
use docsieve_core::export::{self, ExportFormat};
use docsieve_core::pipeline::Pipeline;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    tracing::debug!(database = %cfg.database.path, "opening pipeline");
    let pipeline = Pipeline::open(cfg).await?;

    match cli.command {
        Commands::Process {
            paths,
            threshold,
            json,
        } => run_process(&pipeline, &paths, threshold, json).await,
        Commands::Show {
            document_id,
            threshold,
            full,
            json,
        } => run_show(&pipeline, document_id.as_deref(), threshold, full, json).await,
        Commands::Feedback {
            document_id,
            section_id,
            label,
            json,
        } => run_feedback(&pipeline, &document_id, section_id, label, json).await,
        Commands::Train { json } => run_train(&pipeline, json).await,
        Commands::Status { json } => run_status(&pipeline, json).await,
        Commands::Export {
            document_id,
            format,
            threshold,
            output,
        } => run_export(&pipeline, &document_id, &format, threshold, output).await,
    }
}

#[derive(Parser)]
#[command(name = "docsieve", about = "Rank document sections by relevance", version)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, score and store documents (files or directories)
    Process {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Relevance cutoff; defaults to scoring.threshold
        #[arg(short, long, value_parser = commands::parse_threshold)]
        threshold: Option<f64>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored document, or list stored documents when no id is given
    Show {
        document_id: Option<String>,
        /// Only keep sections scoring at or above this value
        #[arg(short, long, value_parser = commands::parse_threshold)]
        threshold: Option<f64>,
        /// Print whole section contents instead of previews
        #[arg(long)]
        full: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Label a section; retrains once enough feedback is buffered
    Feedback {
        document_id: String,
        section_id: u32,
        #[arg(value_enum)]
        label: Label,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Retrain from the pending feedback buffer now
    Train {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Scoring mode, feedback buffer and store summary
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the relevant sections of a stored document
    Export {
        document_id: String,
        /// json or txt
        #[arg(short, long, default_value = "json")]
        format: String,
        #[arg(short, long, value_parser = commands::parse_threshold)]
        threshold: Option<f64>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

async fn run_process(
    pipeline: &Pipeline,
    paths: &[PathBuf],
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let summary = pipeline.process_paths(paths, threshold).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", commands::batch_report(&summary));
    }
    if summary.documents.is_empty() && !summary.failed.is_empty() {
        anyhow::bail!("no document could be processed");
    }
    Ok(())
}

async fn run_show(
    pipeline: &Pipeline,
    document_id: Option<&str>,
    threshold: Option<f64>,
    full: bool,
    json: bool,
) -> Result<()> {
    let Some(id) = document_id else {
        let documents = pipeline.repository().list_documents().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        } else {
            print!("{}", commands::document_list(&documents));
        }
        return Ok(());
    };

    let result = pipeline
        .document(id, threshold)
        .await?
        .with_context(|| format!("document {id} not found"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", commands::document_report(&result, full));
    }
    Ok(())
}

async fn run_feedback(
    pipeline: &Pipeline,
    document_id: &str,
    section_id: u32,
    label: Label,
    json: bool,
) -> Result<()> {
    let outcome = pipeline
        .feedback(document_id, section_id, label.is_relevant())
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", commands::feedback_report(&outcome));
    }
    Ok(())
}

async fn run_train(pipeline: &Pipeline, json: bool) -> Result<()> {
    let outcome = pipeline.train().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", commands::train_report(&outcome));
    }
    Ok(())
}

async fn run_status(pipeline: &Pipeline, json: bool) -> Result<()> {
    let status = pipeline.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", commands::status_report(&status));
    }
    Ok(())
}

async fn run_export(
    pipeline: &Pipeline,
    document_id: &str,
    format: &str,
    threshold: Option<f64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let result = pipeline
        .document(document_id, None)
        .await?
        .with_context(|| format!("document {document_id} not found"))?;
    let threshold = threshold.unwrap_or(result.threshold);
    let rendered = export::render(&result, threshold, format)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("exported to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
