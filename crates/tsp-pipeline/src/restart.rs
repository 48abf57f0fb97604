//! The restart protocol.
//!
//! A [`RestartRecord`] is created by the supervisor, installed on the
//! target stage's pending slot under the ring's shared mutex, and serviced
//! by that stage's worker at the top of its next iteration. Completion is
//! signalled through the record's own mutex/condvar, separate from the
//! ring's.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::RestartError;
use crate::report::SharedReportSink;

/// A pending restart request for one stage.
pub struct RestartRecord {
    /// Process-unique identifier from the owning [`crate::pipeline::Pipeline`]'s
    /// [`crate::uid::UidGenerator`], carried into every diagnostic the
    /// restart protocol reports so a supervisor can correlate them.
    pub id: u64,
    pub target_stage: usize,
    pub args: Vec<String>,
    pub same_args: bool,
    pub sink: SharedReportSink,
    outcome: Mutex<Option<Result<(), RestartError>>>,
    cv: Condvar,
}

impl RestartRecord {
    pub fn new(id: u64, target_stage: usize, args: Vec<String>, same_args: bool, sink: SharedReportSink) -> Arc<Self> {
        Arc::new(Self {
            id,
            target_stage,
            args,
            same_args,
            sink,
            outcome: Mutex::new(None),
            cv: Condvar::new(),
        })
    }

    /// Marks this record completed with `outcome`, waking the supervisor.
    /// Idempotent: called at most once by design, but a second call only
    /// overwrites the stored outcome rather than corrupting state.
    pub fn complete(&self, outcome: Result<(), RestartError>) {
        let mut guard = self.outcome.lock().unwrap();
        *guard = Some(outcome);
        self.cv.notify_all();
    }

    /// Blocks the calling (supervisor) thread until `complete` has been
    /// called, then returns the recorded outcome. This wait has no
    /// timeout: it ends when serviced or superseded.
    pub fn wait(&self) -> Result<(), RestartError> {
        let guard = self.outcome.lock().unwrap();
        let mut guard = self
            .cv
            .wait_while(guard, |outcome| outcome.is_none())
            .unwrap();
        guard.take().expect("predicate guarantees Some")
    }
}
