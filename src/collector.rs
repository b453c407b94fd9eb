//! Engagement collector: timer-driven polling of content metrics.
//!
//! Scope is the current and immediately preceding round, entries whose cast
//! has been posted, rounds still active. One fetch per distinct identifier
//! per run; a failed fetch skips that entry and the batch continues.
//!
//! Runs are not serialized against each other. An overlapping run can only
//! write an extra snapshot row — snapshots are an append-only audit trail,
//! so duplicates are tolerated rather than locked out.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::EngagementCounts;
use crate::round_clock::current_round_id;
use crate::social::ContentApi;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorRun {
    /// Entries whose counts were persisted this run.
    pub updated: usize,
    /// Entries skipped because their fetch failed.
    pub skipped: usize,
    /// Fetches saved by the in-run identifier cache.
    pub deduped: usize,
}

pub struct Collector<S, A> {
    store: Arc<S>,
    content: Arc<A>,
}

impl<S: Store, A: ContentApi> Collector<S, A> {
    pub fn new(store: Arc<S>, content: Arc<A>) -> Self {
        Self { store, content }
    }

    pub async fn run(&self) -> Result<CollectorRun> {
        let current = current_round_id();
        self.run_for(&[current - 1, current]).await
    }

    pub async fn run_for(&self, round_ids: &[i64]) -> Result<CollectorRun> {
        let entries = self.store.pollable_entries(round_ids).await?;
        let mut cache: HashMap<String, EngagementCounts> = HashMap::new();
        let mut run = CollectorRun::default();

        for entry in &entries {
            let counts = match cache.get(&entry.cast_hash) {
                Some(counts) => {
                    run.deduped += 1;
                    *counts
                }
                None => match self.content.fetch_engagement(&entry.cast_hash).await {
                    Ok(counts) => {
                        cache.insert(entry.cast_hash.clone(), counts);
                        counts
                    }
                    Err(e) => {
                        warn!(
                            "skipping entry {} (cast {}): engagement fetch failed: {}",
                            entry.id, entry.cast_hash, e
                        );
                        run.skipped += 1;
                        continue;
                    }
                },
            };

            self.store
                .record_engagement(entry.id, counts, counts.weighted_score())
                .await?;
            run.updated += 1;
        }

        info!(
            "engagement run: {} entries, {} updated, {} skipped, {} deduped",
            entries.len(),
            run.updated,
            run.skipped,
            run.deduped
        );
        Ok(run)
    }
}
