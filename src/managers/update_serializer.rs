//! Single-flight serialization of usage-ledger writes.
//!
//! The ledger write path is read-modify-write over one persisted blob, so
//! concurrent writers would race and lose updates. One in-flight flag plus
//! a FIFO queue keeps writes strictly ordered: the first caller becomes the
//! worker and drains everything submitted while it runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::managers::score_ledger::ScoreLedger;

struct PendingUpdate {
    new_tags: Vec<String>,
    old_tags: Option<Vec<String>>,
}

struct State {
    in_flight: bool,
    queue: VecDeque<PendingUpdate>,
}

/// FIFO write queue in front of the [`ScoreLedger`].
pub struct UpdateSerializer {
    ledger: Arc<ScoreLedger>,
    state: Mutex<State>,
}

impl UpdateSerializer {
    pub fn new(ledger: Arc<ScoreLedger>) -> Self {
        Self {
            ledger,
            state: Mutex::new(State {
                in_flight: false,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Submits a usage update.
    ///
    /// If no update is in flight the calling thread processes this update
    /// and then drains the queue in submission order, each queued update
    /// fully written before the next starts. If one is in flight the update
    /// is queued and the call returns immediately — fire-and-forget. A
    /// crash between enqueue and drain loses the queued update; that
    /// trade-off favors caller responsiveness and is accepted here.
    pub fn submit(&self, new_tags: Vec<String>, old_tags: Option<Vec<String>>) {
        let mut pending = PendingUpdate { new_tags, old_tags };
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.in_flight {
                state.queue.push_back(pending);
                return;
            }
            state.in_flight = true;
        }

        loop {
            if let Err(err) = self
                .ledger
                .add_recent_tags(&pending.new_tags, pending.old_tags.as_deref())
            {
                warn!(error = %err, "ledger update failed");
            }

            let Ok(mut state) = self.state.lock() else {
                return;
            };
            match state.queue.pop_front() {
                Some(next) => pending = next,
                None => {
                    state.in_flight = false;
                    return;
                }
            }
        }
    }

    /// Number of updates waiting behind the in-flight one.
    pub fn queued_len(&self) -> usize {
        self.state.lock().map(|state| state.queue.len()).unwrap_or(0)
    }
}
