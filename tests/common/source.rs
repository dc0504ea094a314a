use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use changeset_stats::source::{ChangesetRecord, ChangesetSource, FetchOutcome, SourceError};

#[derive(Debug, Clone)]
pub enum Scripted {
    Records(Vec<ChangesetRecord>),
    Empty,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEvent {
    Started(u64),
    Finished(u64),
}

/// In-memory source that returns canned outcomes and tracks concurrency.
/// Users without a script get `Empty`.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<u64, Scripted>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(u64, Option<u64>)>>,
    delays: Mutex<HashMap<u64, Duration>>,
    events: Mutex<Vec<FetchEvent>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, user_id: u64, outcome: Scripted) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(user_id, outcome);
    }

    /// Holds the user's fetch open for `delay` before it settles.
    pub fn delay(&self, user_id: u64, delay: Duration) {
        self.delays
            .lock()
            .expect("delays lock")
            .insert(user_id, delay);
    }

    pub fn events(&self) -> Vec<FetchEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(u64, Option<u64>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChangesetSource for ScriptedSource {
    async fn fetch(
        &self,
        user_id: u64,
        since_id: Option<u64>,
    ) -> Result<FetchOutcome, SourceError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((user_id, since_id));
        self.events
            .lock()
            .expect("events lock")
            .push(FetchEvent::Started(user_id));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Let the rest of the window start before settling.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let delay = self.delays.lock().expect("delays lock").get(&user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .expect("events lock")
            .push(FetchEvent::Finished(user_id));

        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(&user_id)
            .cloned()
            .unwrap_or(Scripted::Empty);

        // Deliberately unfiltered: the aggregator owns watermark filtering.
        match script {
            Scripted::Records(records) => Ok(FetchOutcome::from_records(records)),
            Scripted::Empty => Ok(FetchOutcome::Empty),
            Scripted::Unavailable => Err(SourceError::Status { status: 503 }),
        }
    }
}
