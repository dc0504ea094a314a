//! Windowed harvest across a population of user ids.
//!
//! Users are processed in windows of at most `concurrency_limit`. A window
//! runs cooperatively on the calling task and must fully settle before the
//! next one starts. Each user's fetch → merge → save is independent; a
//! failure is logged and counted, never propagated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::aggregator::{self, AggregateError};
use crate::source::{ChangesetSource, FetchOutcome, SourceError};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("source unavailable: {0}")]
    Source(#[from] SourceError),
    #[error("aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UserOutcome {
    /// New changesets were merged and saved.
    Updated,
    /// Nothing to merge: no changesets, or none above the watermark.
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub failed_users: Vec<u64>,
}

impl RunReport {
    fn record(&mut self, user_id: u64, result: Result<UserOutcome, HarvestError>) {
        match result {
            Ok(UserOutcome::Updated) => self.succeeded += 1,
            Ok(UserOutcome::Empty) => self.empty += 1,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "User harvest failed, skipping until next run");
                self.failed += 1;
                self.failed_users.push(user_id);
            }
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.empty + self.failed
    }
}

pub struct BatchScheduler {
    store: Arc<Store>,
    source: Arc<dyn ChangesetSource>,
}

impl BatchScheduler {
    pub fn new(store: Arc<Store>, source: Arc<dyn ChangesetSource>) -> Self {
        Self { store, source }
    }

    pub async fn run(&self, user_ids: &[u64], concurrency_limit: usize) -> RunReport {
        self.run_at(user_ids, concurrency_limit, Utc::now()).await
    }

    /// `reference_time` anchors the 30-day window for every user in the run.
    pub async fn run_at(
        &self,
        user_ids: &[u64],
        concurrency_limit: usize,
        reference_time: DateTime<Utc>,
    ) -> RunReport {
        let window_size = concurrency_limit.max(1);
        tracing::info!(
            users = user_ids.len(),
            window_size,
            reference_time = %reference_time,
            "Harvest run starting"
        );

        let mut report = RunReport::default();
        for (window_index, window) in user_ids.chunks(window_size).enumerate() {
            let results = join_all(window.iter().map(|&user_id| async move {
                (user_id, self.harvest_one(user_id, reference_time).await)
            }))
            .await;

            for (user_id, result) in results {
                report.record(user_id, result);
            }
            tracing::debug!(window = window_index, size = window.len(), "Harvest window settled");
        }

        tracing::info!(
            succeeded = report.succeeded,
            empty = report.empty,
            failed = report.failed,
            "Harvest run complete"
        );
        report
    }

    pub async fn harvest_one(
        &self,
        user_id: u64,
        reference_time: DateTime<Utc>,
    ) -> Result<UserOutcome, HarvestError> {
        let prior = self.store.load_summary(user_id)?;
        let watermark = prior.as_ref().map(|summary| summary.last_changeset_id);

        let records = match self.source.fetch(user_id, watermark).await? {
            FetchOutcome::Empty => {
                tracing::debug!(user_id, "No changesets found");
                return Ok(UserOutcome::Empty);
            }
            FetchOutcome::Records(records) => records,
        };

        match aggregator::merge(user_id, prior, &records, reference_time)? {
            Some(summary) if Some(summary.last_changeset_id) != watermark => {
                self.store.save_summary_if_watermark(&summary, watermark)?;
                tracing::info!(
                    user_id,
                    username = summary.username.as_deref().unwrap_or(""),
                    changesets = summary.changeset_count,
                    "Saved stats"
                );
                Ok(UserOutcome::Updated)
            }
            _ => {
                tracing::debug!(user_id, "No new changesets above watermark");
                Ok(UserOutcome::Empty)
            }
        }
    }
}
