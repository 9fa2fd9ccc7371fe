use crate::features::{FeatureVector, Tag};
use crate::models::{DocumentResult, ScoredSection};
use anyhow::Context;
use serde::Serialize;
use sqlx::SqlitePool;
use storage::models::{Document as DocumentRow, Section as SectionRow};

/// Summary line for a stored document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub total_sections: usize,
    pub threshold: f64,
    pub created_at: i64,
}

/// Processed results, kept so sections can be re-filtered and labelled later.
#[derive(Clone)]
pub struct ResultRepository {
    pool: SqlitePool,
}

impl ResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save_document(&self, result: &DocumentResult) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, name, threshold, processing_time)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                threshold=excluded.threshold,
                processing_time=excluded.processing_time
            "#,
        )
        .bind(&result.document_id)
        .bind(&result.document_name)
        .bind(result.threshold)
        .bind(result.processing_time)
        .execute(&mut *tx)
        .await
        .context("storing document")?;

        sqlx::query("DELETE FROM sections WHERE document_id = ?1")
            .bind(&result.document_id)
            .execute(&mut *tx)
            .await?;

        for section in &result.sections {
            sqlx::query(
                r#"
                INSERT INTO sections (document_id, section_id, title, content, relevance_score, page_number, features_json, tags_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&result.document_id)
            .bind(i64::from(section.id))
            .bind(&section.title)
            .bind(&section.content)
            .bind(section.relevance_score)
            .bind(section.page_number.map(i64::from))
            .bind(serde_json::to_string(&section.features)?)
            .bind(serde_json::to_string(&section.tags)?)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("storing section {}", section.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_document(&self, id: &str) -> anyhow::Result<Option<DocumentResult>> {
        let Some(doc) = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, name, threshold, processing_time, created_at FROM documents WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, SectionRow>(
            r#"
            SELECT document_id, section_id, title, content, relevance_score, page_number, features_json, tags_json
            FROM sections WHERE document_id = ?1 ORDER BY section_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let sections = rows
            .into_iter()
            .map(section_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut result = DocumentResult {
            document_id: doc.id,
            document_name: doc.name,
            total_sections: sections.len(),
            relevant_sections: 0,
            threshold: doc.threshold,
            processing_time: doc.processing_time,
            sections,
        };
        result.relevant_sections = result.relevant_count(result.threshold);
        Ok(Some(result))
    }

    /// Stored features of one section, for turning a label into feedback.
    pub async fn section_features(
        &self,
        document_id: &str,
        section_id: u32,
    ) -> anyhow::Result<Option<FeatureVector>> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT features_json FROM sections WHERE document_id = ?1 AND section_id = ?2",
        )
        .bind(document_id)
        .bind(i64::from(section_id))
        .fetch_optional(&self.pool)
        .await?;
        json.map(|j| serde_json::from_str(&j).context("decoding stored features"))
            .transpose()
    }

    pub async fn list_documents(&self) -> anyhow::Result<Vec<DocumentSummary>> {
        let rows: Vec<(String, String, f64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT d.id, d.name, d.threshold, d.created_at,
                   (SELECT COUNT(*) FROM sections s WHERE s.document_id = d.id)
            FROM documents d
            ORDER BY d.created_at DESC, d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, threshold, created_at, count)| DocumentSummary {
                id,
                name,
                total_sections: count.max(0) as usize,
                threshold,
                created_at,
            })
            .collect())
    }
}

fn section_from_row(row: SectionRow) -> anyhow::Result<ScoredSection> {
    let features: FeatureVector =
        serde_json::from_str(&row.features_json).context("decoding stored features")?;
    let tags: Vec<Tag> = serde_json::from_str(&row.tags_json).context("decoding stored tags")?;
    Ok(ScoredSection {
        id: u32::try_from(row.section_id).context("section id out of range")?,
        title: row.title,
        content: row.content,
        relevance_score: row.relevance_score,
        page_number: row.page_number.and_then(|p| u32::try_from(p).ok()),
        features,
        tags,
    })
}
