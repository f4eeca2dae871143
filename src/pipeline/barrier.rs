/*!
 * Fan-in barrier for the translation fan-out.
 *
 * `FanInBarrier::new` returns the barrier together with exactly one
 * `OutcomeReporter` per expected segment. The barrier completes once every
 * expected segment has reported. A reporter that is dropped without
 * reporting (its task panicked or was aborted) reports a failure from
 * `Drop`, so waiting can never hang on a lost task.
 */

use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::transpile::outcome::{OutcomeStatus, TranslationOutcome};
use crate::transpile::segmenter::SegmentId;

/// Reason recorded for a reporter dropped without an outcome
pub const LOST_TASK_REASON: &str = "translation task ended without reporting an outcome";

/// Write-once handle a fan-out task uses to deliver its outcome
#[derive(Debug)]
pub struct OutcomeReporter {
    segment_id: SegmentId,
    sender: UnboundedSender<TranslationOutcome>,
    reported: bool,
}

impl OutcomeReporter {
    pub fn segment_id(&self) -> &SegmentId {
        &self.segment_id
    }

    /// Deliver the outcome, consuming the reporter
    pub fn report(mut self, status: OutcomeStatus, attempts: u32) {
        self.reported = true;
        let outcome = TranslationOutcome {
            segment_id: self.segment_id.clone(),
            status,
            attempts,
        };
        if self.sender.send(outcome).is_err() {
            debug!("Barrier for {} is gone, outcome discarded", self.segment_id);
        }
    }

    /// Shorthand for a failed outcome
    pub fn report_failure(self, reason: impl Into<String>, attempts: u32) {
        self.report(OutcomeStatus::Failed(reason.into()), attempts);
    }
}

impl Drop for OutcomeReporter {
    fn drop(&mut self) {
        if !self.reported {
            let outcome = TranslationOutcome::failed(self.segment_id.clone(), LOST_TASK_REASON, 0);
            let _ = self.sender.send(outcome);
        }
    }
}

/// N-completion join over the translation outcomes
#[derive(Debug)]
pub struct FanInBarrier {
    expected: Vec<SegmentId>,
    pending: HashSet<SegmentId>,
    receiver: UnboundedReceiver<TranslationOutcome>,
    received: HashMap<SegmentId, TranslationOutcome>,
}

impl FanInBarrier {
    /// Create a barrier over `expected` and one reporter per id.
    ///
    /// Duplicate ids are collapsed; the barrier keeps no sender of its own.
    pub fn new(expected: Vec<SegmentId>) -> (Self, Vec<OutcomeReporter>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut seen = HashSet::new();
        let expected: Vec<SegmentId> = expected.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let reporters = expected
            .iter()
            .map(|id| OutcomeReporter {
                segment_id: id.clone(),
                sender: sender.clone(),
                reported: false,
            })
            .collect();

        let barrier = Self {
            pending: seen,
            expected,
            receiver,
            received: HashMap::new(),
        };
        (barrier, reporters)
    }

    /// Number of expected outcomes
    pub fn expected_len(&self) -> usize {
        self.expected.len()
    }

    /// Number of distinct outcomes received so far
    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the next new outcome.
    ///
    /// Returns `None` once every expected id has reported, or when all
    /// reporters are gone. Repeated outcomes for an id keep the first one.
    pub async fn next_outcome(&mut self) -> Option<TranslationOutcome> {
        while !self.is_complete() {
            let outcome = self.receiver.recv().await?;
            if !self.pending.remove(&outcome.segment_id) {
                warn!("Ignoring repeated or unexpected outcome for {}", outcome.segment_id);
                continue;
            }
            self.received.insert(outcome.segment_id.clone(), outcome.clone());
            return Some(outcome);
        }
        None
    }

    /// Wait until every expected id has reported
    pub async fn wait(mut self) -> Vec<TranslationOutcome> {
        while self.next_outcome().await.is_some() {}
        self.into_outcomes()
    }

    /// Outcomes in expected order; ids that never reported count as failed
    pub fn into_outcomes(mut self) -> Vec<TranslationOutcome> {
        self.expected
            .iter()
            .map(|id| {
                self.received
                    .remove(id)
                    .unwrap_or_else(|| TranslationOutcome::failed(id.clone(), LOST_TASK_REASON, 0))
            })
            .collect()
    }
}
