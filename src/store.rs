//! Data-access seam and the Postgres implementation.
//!
//! The engine only talks to storage through the [`Store`] trait so tests can
//! inject an in-memory double. `PgStore` runs on the privileged connection;
//! the row-level-security read path used by public surfaces never goes
//! through this crate.
//!
//! Two rules live at the storage layer rather than in application code:
//! the `(round_id, fid)` uniqueness constraint, and the pot increment as a
//! single SQL `pot_amount = pot_amount + $n` so concurrent admissions never
//! lose updates.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::BigDecimal;

use crate::error::{EngineError, Result};
use crate::models::{EngagementCounts, Entry, Round, Winner, TEMP_CAST_PREFIX};

/// Fields for a new entry row. Both identifier columns start as the temp
/// placeholder; admission patches them as posting/reconciliation land.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub round_id: i64,
    pub fid: i64,
    pub wallet_address: String,
    pub temp_cast_hash: String,
    pub dunk_text: String,
    pub payment_tx_hash: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Create the round row if absent (status=active, empty pot).
    async fn ensure_round(&self, round_id: i64, date: NaiveDate) -> Result<()>;

    /// Atomically add `amount_wei` to the round's pot.
    async fn increment_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()>;

    /// Compensating action for a failed admission after the pot was bumped.
    async fn decrement_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()>;

    async fn entry_exists(&self, round_id: i64, fid: i64) -> Result<bool>;

    /// Insert an entry. A `(round_id, fid)` constraint violation surfaces as
    /// [`EngineError::DuplicateEntry`].
    async fn insert_entry(&self, new: NewEntry) -> Result<Entry>;

    async fn set_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()>;
    async fn set_contract_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()>;

    async fn round(&self, round_id: i64) -> Result<Option<Round>>;

    /// Entries of a round ranked by score descending, earliest created_at
    /// breaking ties. Must match the on-chain tie-break rule.
    async fn entries_ranked(&self, round_id: i64) -> Result<Vec<Entry>>;

    /// Entries of non-finalized rounds whose cast has been posted (real
    /// identifier), restricted to the given round ids.
    async fn pollable_entries(&self, round_ids: &[i64]) -> Result<Vec<Entry>>;

    async fn entry_by_contract_cast_hash(
        &self,
        round_id: i64,
        cast_hash: &str,
    ) -> Result<Option<Entry>>;

    /// Persist the latest counts/score on the entry and append one immutable
    /// engagement snapshot row.
    async fn record_engagement(
        &self,
        entry_id: i64,
        counts: EngagementCounts,
        weighted_score: i64,
    ) -> Result<()>;

    /// Optimistic finalize commit: active → finalized with winner fields.
    /// Fails with [`EngineError::Consistency`] if the round is not active.
    async fn mark_finalized(
        &self,
        round_id: i64,
        winner: Option<&Winner>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Compensating rollback: finalized → active, winner fields cleared.
    async fn rollback_finalized(&self, round_id: i64) -> Result<()>;

    /// finalized → claimed. Fails if the round is not exactly finalized.
    async fn mark_claimed(&self, round_id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn temp_pattern() -> String {
        format!("{}%", TEMP_CAST_PREFIX)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_round(&self, round_id: i64, date: NaiveDate) -> Result<()> {
        sqlx::query("INSERT INTO rounds (id, date) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(round_id)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()> {
        sqlx::query("UPDATE rounds SET pot_amount = pot_amount + $2 WHERE id = $1")
            .bind(round_id)
            .bind(amount_wei)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn decrement_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()> {
        sqlx::query("UPDATE rounds SET pot_amount = pot_amount - $2 WHERE id = $1")
            .bind(round_id)
            .bind(amount_wei)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn entry_exists(&self, round_id: i64, fid: i64) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM entries WHERE round_id = $1 AND fid = $2")
                .bind(round_id)
                .bind(fid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn insert_entry(&self, new: NewEntry) -> Result<Entry> {
        let res = sqlx::query_as::<_, Entry>(
            "INSERT INTO entries \
             (round_id, fid, wallet_address, cast_hash, contract_cast_hash, dunk_text, payment_tx_hash) \
             VALUES ($1, $2, $3, $4, $4, $5, $6) \
             RETURNING *",
        )
        .bind(new.round_id)
        .bind(new.fid)
        .bind(&new.wallet_address)
        .bind(&new.temp_cast_hash)
        .bind(&new.dunk_text)
        .bind(&new.payment_tx_hash)
        .fetch_one(&self.pool)
        .await;

        match res {
            Ok(entry) => Ok(entry),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(EngineError::DuplicateEntry {
                    round_id: new.round_id,
                    fid: new.fid,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()> {
        sqlx::query("UPDATE entries SET cast_hash = $2 WHERE id = $1")
            .bind(entry_id)
            .bind(cast_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_contract_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()> {
        sqlx::query("UPDATE entries SET contract_cast_hash = $2 WHERE id = $1")
            .bind(entry_id)
            .bind(cast_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn round(&self, round_id: i64) -> Result<Option<Round>> {
        let round = sqlx::query_as::<_, Round>("SELECT * FROM rounds WHERE id = $1")
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(round)
    }

    async fn entries_ranked(&self, round_id: i64) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            "SELECT * FROM entries WHERE round_id = $1 \
             ORDER BY engagement_score DESC, created_at ASC",
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn pollable_entries(&self, round_ids: &[i64]) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            "SELECT e.* FROM entries e \
             JOIN rounds r ON r.id = e.round_id \
             WHERE e.round_id = ANY($1) \
               AND r.status = 'active' \
               AND e.cast_hash NOT LIKE $2 \
             ORDER BY e.id",
        )
        .bind(round_ids)
        .bind(Self::temp_pattern())
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn entry_by_contract_cast_hash(
        &self,
        round_id: i64,
        cast_hash: &str,
    ) -> Result<Option<Entry>> {
        let entry = sqlx::query_as::<_, Entry>(
            "SELECT * FROM entries WHERE round_id = $1 AND contract_cast_hash = $2",
        )
        .bind(round_id)
        .bind(cast_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn record_engagement(
        &self,
        entry_id: i64,
        counts: EngagementCounts,
        weighted_score: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE entries SET likes = $2, recasts = $3, replies = $4, engagement_score = $5 \
             WHERE id = $1",
        )
        .bind(entry_id)
        .bind(counts.likes)
        .bind(counts.recasts)
        .bind(counts.replies)
        .bind(weighted_score)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO engagement_snapshots (entry_id, likes, recasts, replies, weighted_score) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry_id)
        .bind(counts.likes)
        .bind(counts.recasts)
        .bind(counts.replies)
        .bind(weighted_score)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_finalized(
        &self,
        round_id: i64,
        winner: Option<&Winner>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let res = sqlx::query(
            "UPDATE rounds SET status = 'finalized', finalized_at = $2, \
             winner_fid = $3, winner_cast_hash = $4, winner_wallet_address = $5 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(round_id)
        .bind(at)
        .bind(winner.map(|w| w.fid))
        .bind(winner.map(|w| w.cast_hash.as_str()))
        .bind(winner.map(|w| w.wallet_address.as_str()))
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(EngineError::Consistency {
                round_id,
                detail: "finalize commit found round not active".into(),
            });
        }
        Ok(())
    }

    async fn rollback_finalized(&self, round_id: i64) -> Result<()> {
        let res = sqlx::query(
            "UPDATE rounds SET status = 'active', finalized_at = NULL, \
             winner_fid = NULL, winner_cast_hash = NULL, winner_wallet_address = NULL \
             WHERE id = $1 AND status = 'finalized'",
        )
        .bind(round_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(EngineError::Consistency {
                round_id,
                detail: "rollback found round not finalized".into(),
            });
        }
        Ok(())
    }

    async fn mark_claimed(&self, round_id: i64, at: DateTime<Utc>) -> Result<()> {
        let res = sqlx::query(
            "UPDATE rounds SET status = 'claimed', claimed_at = $2 \
             WHERE id = $1 AND status = 'finalized'",
        )
        .bind(round_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(EngineError::Consistency {
                round_id,
                detail: "claim found round not finalized".into(),
            });
        }
        Ok(())
    }
}
