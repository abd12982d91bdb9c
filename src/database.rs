//! Postgres layer: pool handle and repository implementations
//!
//! `Database` owns the sqlx pool (sized and timed out per `DatabaseConfig`,
//! probed once at startup, drained on shutdown). `PgStore` implements the
//! catalog and rating repositories over that pool, loading each fragrance's
//! notes and accords eagerly so the scoring pipeline never goes back to
//! storage mid-request.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::recommendation::model::{
    Accord, Evaluation, Fragrance, Note, NotePosition, PositionedNote, Reviewer,
};
use crate::recommendation::store::{CatalogStore, RatingStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Statements slower than this are logged at warn
const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_secs(1);

/// Handle to the Postgres pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool described by `config` and probe it once before use
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| Error::config(format!("unparseable database URL: {}", e)))?
            .statement_cache_capacity(config.statement_cache_size)
            .log_statements(log::LevelFilter::Debug)
            .log_slow_statements(log::LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD);

        debug!(
            max = config.max_connections,
            min = config.min_connections,
            acquire_timeout_ms = config.connect_timeout.as_millis() as u64,
            "opening postgres pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_with(options)
            .await
            .map_err(|e| Error::database_with_source("could not open postgres pool", e))?;

        let db = Self { pool };
        db.health_check().await?;
        info!(connections = db.pool.size(), "postgres pool ready");
        Ok(db)
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query to confirm the pool is serving
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Error::database_with_source("postgres liveness probe failed", e))
    }

    /// Drain and close every connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool drained and closed");
    }
}

/// Apply any pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Migration(e.to_string()))?;

    info!("schema migrations up to date");
    Ok(())
}

// ============================================================================
// Postgres repositories
// ============================================================================

/// Catalog and rating repositories over Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load full fragrances (with notes and accords) for a set of base rows
    async fn assemble(&self, rows: Vec<FragranceRow>) -> Result<Vec<Fragrance>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let note_rows = sqlx::query_as::<_, FragranceNoteRow>(
            r#"
            SELECT fn.fragrance_id, n.id AS note_id, n.name, n.category, n.subcategory,
                   fn.position
            FROM fragrance_notes fn
            JOIN notes n ON n.id = fn.note_id
            WHERE fn.fragrance_id = ANY($1)
            ORDER BY fn.fragrance_id, n.name, n.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let accord_rows = sqlx::query_as::<_, AccordRow>(
            r#"
            SELECT fragrance_id, accord_type, intensity
            FROM fragrance_accords
            WHERE fragrance_id = ANY($1)
            ORDER BY fragrance_id, accord_type
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut notes_by_fragrance: HashMap<String, Vec<PositionedNote>> = HashMap::new();
        for row in note_rows {
            let position = NotePosition::parse(&row.position).ok_or_else(|| {
                Error::database(format!(
                    "invalid note position '{}' on fragrance {}",
                    row.position, row.fragrance_id
                ))
            })?;
            notes_by_fragrance
                .entry(row.fragrance_id)
                .or_default()
                .push(PositionedNote {
                    note: Note {
                        id: row.note_id,
                        name: row.name,
                        category: row.category,
                        subcategory: row.subcategory,
                    },
                    position,
                });
        }

        let mut accords_by_fragrance: HashMap<String, Vec<Accord>> = HashMap::new();
        for row in accord_rows {
            accords_by_fragrance
                .entry(row.fragrance_id)
                .or_default()
                .push(Accord {
                    accord_type: row.accord_type,
                    intensity: row.intensity,
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let notes = notes_by_fragrance.remove(&row.id).unwrap_or_default();
                let accords = accords_by_fragrance.remove(&row.id).unwrap_or_default();
                row.into_fragrance(notes, accords)
            })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn fragrance(&self, id: &str) -> Result<Option<Fragrance>> {
        let row = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand, concentration, launch_year, gender_target,
                   primary_family, subfamily, intensity, data_source, external_id
            FROM fragrances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn candidates(&self, exclude: &HashSet<String>) -> Result<Vec<Fragrance>> {
        let excluded: Vec<String> = exclude.iter().cloned().collect();
        let rows = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand, concentration, launch_year, gender_target,
                   primary_family, subfamily, intensity, data_source, external_id
            FROM fragrances
            WHERE NOT (id = ANY($1))
            ORDER BY name, id
            "#,
        )
        .bind(&excluded)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }
}

#[async_trait]
impl RatingStore for PgStore {
    async fn reviewer(&self, id: &str) -> Result<Option<Reviewer>> {
        let row = sqlx::query_as::<_, ReviewerRow>(
            r#"
            SELECT id, name FROM reviewers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Reviewer {
            id: r.id,
            name: r.name,
        }))
    }

    async fn evaluations_of(&self, reviewer_id: &str) -> Result<Vec<(Evaluation, Fragrance)>> {
        let eval_rows = sqlx::query_as::<_, EvaluationRow>(
            r#"
            SELECT id, fragrance_id, reviewer_id, rating, notes,
                   longevity_rating, sillage_rating, evaluated_at
            FROM evaluations
            WHERE reviewer_id = $1
            ORDER BY evaluated_at, id
            "#,
        )
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await?;

        if eval_rows.is_empty() {
            return Ok(Vec::new());
        }

        let fragrance_ids: Vec<String> =
            eval_rows.iter().map(|e| e.fragrance_id.clone()).collect();
        let fragrance_rows = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand, concentration, launch_year, gender_target,
                   primary_family, subfamily, intensity, data_source, external_id
            FROM fragrances
            WHERE id = ANY($1)
            "#,
        )
        .bind(&fragrance_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut fragrances: HashMap<String, Fragrance> = self
            .assemble(fragrance_rows)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        Ok(eval_rows
            .into_iter()
            .filter_map(|row| {
                let fragrance = fragrances.remove(&row.fragrance_id)?;
                Some((row.into_evaluation(), fragrance))
            })
            .collect())
    }

    async fn rated_fragrance_ids(&self, reviewer_id: &str) -> Result<HashSet<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT fragrance_id FROM evaluations WHERE reviewer_id = $1
            "#,
        )
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct FragranceRow {
    id: String,
    name: String,
    brand: String,
    concentration: String,
    launch_year: Option<i32>,
    gender_target: String,
    primary_family: String,
    subfamily: String,
    intensity: Option<String>,
    data_source: String,
    external_id: Option<String>,
}

impl FragranceRow {
    fn into_fragrance(self, notes: Vec<PositionedNote>, accords: Vec<Accord>) -> Fragrance {
        Fragrance {
            id: self.id,
            name: self.name,
            brand: self.brand,
            concentration: self.concentration,
            launch_year: self.launch_year,
            gender_target: self.gender_target,
            primary_family: self.primary_family,
            subfamily: self.subfamily,
            intensity: self.intensity,
            data_source: self.data_source,
            external_id: self.external_id,
            notes,
            accords,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FragranceNoteRow {
    fragrance_id: String,
    note_id: String,
    name: String,
    category: String,
    subcategory: Option<String>,
    position: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AccordRow {
    fragrance_id: String,
    accord_type: String,
    intensity: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewerRow {
    id: String,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct EvaluationRow {
    id: String,
    fragrance_id: String,
    reviewer_id: String,
    rating: i32,
    notes: Option<String>,
    longevity_rating: Option<i32>,
    sillage_rating: Option<i32>,
    evaluated_at: DateTime<Utc>,
}

impl EvaluationRow {
    fn into_evaluation(self) -> Evaluation {
        Evaluation {
            id: self.id,
            fragrance_id: self.fragrance_id,
            reviewer_id: self.reviewer_id,
            rating: self.rating.clamp(0, 255) as u8,
            notes: self.notes,
            longevity_rating: self.longevity_rating.map(|r| r.clamp(0, 255) as u8),
            sillage_rating: self.sillage_rating.map(|r| r.clamp(0, 255) as u8),
            evaluated_at: self.evaluated_at,
        }
    }
}
