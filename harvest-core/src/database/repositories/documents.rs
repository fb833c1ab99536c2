use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::classify::parse_site_date;
use crate::error::{HarvestError, Result};
use crate::types::{Classification, ClassificationSource, Document, DocumentMetadata};

/// Result of a registration: the canonical identifier plus the
/// classification the document carries after the write.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub system_id: Uuid,
    pub classification: Classification,
    pub newly_created: bool,
}

/// PostgreSQL-backed canonical document registry: dedup against external
/// identifiers, metadata merge-on-update, first-writer-wins attribution.
#[derive(Clone, Debug)]
pub struct PostgresDocumentRepository {
    pool: PgPool,
}

impl PostgresDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a harvested document.
    ///
    /// Dedup key is the external identifier (falling back to the
    /// registration number). An existing row is merged: descriptive
    /// fields last-writer-wins on non-null input, owner fields and
    /// classification first-writer-wins. The owning worker's lifetime
    /// document counter moves exactly once per document, on first
    /// attribution.
    pub async fn register(
        &self,
        metadata: &DocumentMetadata,
        classification: &Classification,
        task_id: Option<Uuid>,
        worker_id: Option<Uuid>,
    ) -> Result<RegisterOutcome> {
        let external_id = match metadata.dedup_key() {
            Some(key) => key.to_string(),
            // The scraper could not extract any identifier; keep the record
            // under a generated one so nothing is silently dropped.
            None => format!("temp_{}", &Uuid::new_v4().simple().to_string()[..12]),
        };
        let decision_date = metadata.decision_date.as_deref().and_then(parse_site_date);
        let law_date = metadata.law_date.as_deref().and_then(parse_site_date);

        let mut tx = self.pool().begin().await?;

        let mut existing = self
            .lock_existing(&mut tx, &external_id, metadata.reg_number.as_deref())
            .await?;

        if existing.is_none() {
            let system_id = Uuid::new_v4();
            let reg_number = metadata
                .reg_number
                .clone()
                .unwrap_or_else(|| external_id.clone());

            // `ON CONFLICT DO NOTHING` covers the window between the probe
            // and the insert: a concurrent first registration of the same
            // external id commits first, and this one falls through to the
            // merge instead of surfacing a unique violation.
            let inserted = sqlx::query(
                r#"
                INSERT INTO documents (
                    system_id, external_id, reg_number, url,
                    court_name, judge_name, decision_type,
                    decision_date, law_date, case_type, case_number,
                    court_region, instance_type, classification_source,
                    classification_date, task_id, worker_id
                )
                VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14,
                    CASE WHEN $14::text IS NOT NULL THEN NOW() END,
                    $15, $16
                )
                ON CONFLICT (external_id) DO NOTHING
                "#,
            )
            .bind(system_id)
            .bind(&external_id)
            .bind(&reg_number)
            .bind(&metadata.url)
            .bind(&metadata.court_name)
            .bind(&metadata.judge_name)
            .bind(&metadata.decision_type)
            .bind(decision_date)
            .bind(law_date)
            .bind(&metadata.case_type)
            .bind(&metadata.case_number)
            .bind(&classification.court_region)
            .bind(&classification.instance_type)
            .bind(classification.source)
            .bind(task_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            if inserted {
                if worker_id.is_some() {
                    self.credit_worker(&mut tx, worker_id).await?;
                }
                tx.commit().await?;

                info!(
                    "Registered new document {} (external: {}) for worker {:?}",
                    system_id, external_id, worker_id
                );
                return Ok(RegisterOutcome {
                    system_id,
                    classification: classification.clone(),
                    newly_created: true,
                });
            }

            // Lost the insert race; the winner's row is committed now.
            existing = self
                .lock_existing(&mut tx, &external_id, metadata.reg_number.as_deref())
                .await?;
        }

        let Some((system_id, existing_worker)) = existing else {
            return Err(HarvestError::Internal(format!(
                "document {external_id} disappeared during registration"
            )));
        };

        let outcome = {
            let first_attribution = existing_worker.is_none() && worker_id.is_some();

            let stored: (
                Option<String>,
                Option<String>,
                Option<ClassificationSource>,
            ) = sqlx::query_as(
                r#"
                UPDATE documents
                SET url = COALESCE($1, url),
                    reg_number = COALESCE($2, reg_number),
                    court_name = COALESCE($3, court_name),
                    judge_name = COALESCE($4, judge_name),
                    decision_type = COALESCE($5, decision_type),
                    decision_date = COALESCE($6, decision_date),
                    law_date = COALESCE($7, law_date),
                    case_type = COALESCE($8, case_type),
                    case_number = COALESCE($9, case_number),
                    court_region = COALESCE(court_region, $10),
                    instance_type = COALESCE(instance_type, $11),
                    classification_source = COALESCE(classification_source, $12),
                    classification_date = CASE
                        WHEN classification_source IS NULL AND $12::text IS NOT NULL
                        THEN NOW()
                        ELSE classification_date
                    END,
                    task_id = COALESCE(task_id, $13),
                    worker_id = COALESCE(worker_id, $14),
                    updated_at = NOW()
                WHERE system_id = $15
                RETURNING court_region, instance_type, classification_source
                "#,
            )
            .bind(&metadata.url)
            .bind(&metadata.reg_number)
            .bind(&metadata.court_name)
            .bind(&metadata.judge_name)
            .bind(&metadata.decision_type)
            .bind(decision_date)
            .bind(law_date)
            .bind(&metadata.case_type)
            .bind(&metadata.case_number)
            .bind(&classification.court_region)
            .bind(&classification.instance_type)
            .bind(classification.source)
            .bind(task_id)
            .bind(worker_id)
            .bind(system_id)
            .fetch_one(&mut *tx)
            .await?;

            if first_attribution {
                self.credit_worker(&mut tx, worker_id).await?;
            }

            info!("Updated document {} (external: {})", system_id, external_id);
            RegisterOutcome {
                system_id,
                classification: Classification {
                    court_region: stored.0,
                    instance_type: stored.1,
                    source: stored.2,
                },
                newly_created: false,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Row-lock the dedup candidate so concurrent registrations of the
    /// same item serialize on the merge. The external id is unique; the
    /// registration-number match is a best-effort alias lookup with no
    /// constraint behind it.
    async fn lock_existing(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        external_id: &str,
        reg_number: Option<&str>,
    ) -> Result<Option<(Uuid, Option<Uuid>)>> {
        let row = sqlx::query_as(
            r#"
            SELECT system_id, worker_id
            FROM documents
            WHERE external_id = $1
               OR ($2::text IS NOT NULL AND reg_number = $2)
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(external_id)
        .bind(reg_number)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn credit_worker(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        worker_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers
            SET total_documents_downloaded = total_documents_downloaded + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(worker_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_by_system_id(&self, system_id: Uuid) -> Result<Option<Document>> {
        let document = sqlx::query_as("SELECT * FROM documents WHERE system_id = $1")
            .bind(system_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(document)
    }

    /// Lookup by either the site-native id or the registration number.
    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Document>> {
        let document = sqlx::query_as(
            r#"
            SELECT * FROM documents
            WHERE external_id = $1 OR reg_number = $1
            LIMIT 1
            "#,
        )
        .bind(external_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(document)
    }
}
