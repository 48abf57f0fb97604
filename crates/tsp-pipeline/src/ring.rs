//! The executor ring and window protocol: the core synchronization
//! mechanism of the whole crate.
//!
//! A single shared [`Mutex`] guards every stage's window state ("
//! shared mutex guards... every window field of every stage"). Each stage
//! additionally owns a [`Condvar`] it waits on in [`Ring::wait_work`].
//! Packet *contents* are never touched under this mutex — only the
//! bookkeeping that decides which stage currently owns which slots.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::buffer::PacketBuffer;
use crate::error::RestartError;
use crate::plugin::{BitrateConfidence, PluginKind, TimeoutAction};
use crate::restart::RestartRecord;
use std::sync::Arc;

/// Static identity and links for one stage. Immutable after construction,
/// so it needs no lock ("indexed array of stages plus prev_index /
/// next_index").
#[derive(Debug)]
pub struct StageMeta {
    pub index: usize,
    pub name: String,
    pub kind: PluginKind,
    pub prev: usize,
    pub next: usize,
    pub packet_timeout: Option<Duration>,
}

/// Mutable window state for one stage, living inside the ring's shared
/// mutex.
#[derive(Debug)]
struct WindowState {
    first: usize,
    count: usize,
    input_end: bool,
    aborting: bool,
    bitrate: u64,
    bitrate_confidence: BitrateConfidence,
    restart_pending: Option<Arc<RestartRecord>>,
}

/// A read-only copy of a stage's window state, for diagnostics and tests
/// (invariant checks need a snapshot they can inspect without holding the
/// lock across assertions).
#[derive(Clone, Copy, Debug)]
pub struct WindowSnapshot {
    pub first: usize,
    pub count: usize,
    pub input_end: bool,
    pub aborting: bool,
    pub bitrate: u64,
    pub bitrate_confidence: BitrateConfidence,
}

/// What `wait_work` handed back to the caller.
#[derive(Clone, Copy, Debug)]
pub struct WorkGrant {
    pub first: usize,
    pub count: usize,
    pub bitrate: u64,
    pub bitrate_confidence: BitrateConfidence,
    pub input_end: bool,
    pub aborted: bool,
    pub timed_out: bool,
}

pub struct Ring {
    pub buffer: PacketBuffer,
    pub stages: Vec<StageMeta>,
    state: Mutex<Vec<WindowState>>,
    condvars: Vec<Condvar>,
}

impl Ring {
    pub fn new(capacity: usize, stages: Vec<StageMeta>) -> Self {
        assert!(stages.len() >= 3, "ring requires at least 3 stages");
        let buffer = PacketBuffer::new(capacity);
        let mut windows = Vec::with_capacity(stages.len());
        for meta in &stages {
            let (first, count) = if meta.kind == PluginKind::Input {
                (0, capacity)
            } else {
                (0, 0)
            };
            windows.push(WindowState {
                first,
                count,
                input_end: false,
                aborting: false,
                bitrate: 0,
                bitrate_confidence: BitrateConfidence::Undefined,
                restart_pending: None,
            });
        }
        let condvars = stages.iter().map(|_| Condvar::new()).collect();
        Self {
            buffer,
            stages,
            state: Mutex::new(windows),
            condvars,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn snapshot(&self, stage: usize) -> WindowSnapshot {
        let guard = self.state.lock().unwrap();
        let w = &guard[stage];
        WindowSnapshot {
            first: w.first,
            count: w.count,
            input_end: w.input_end,
            aborting: w.aborting,
            bitrate: w.bitrate,
            bitrate_confidence: w.bitrate_confidence,
        }
    }

    /// Asserts the ring-wide invariants. Intended for tests and
    /// debug-only sanity checks, not the hot path.
    pub fn assert_invariants(&self) {
        let guard = self.state.lock().unwrap();
        let total: usize = guard.iter().map(|w| w.count).sum();
        assert_eq!(total, self.capacity(), "sum of window counts must equal buffer capacity");
        for meta in &self.stages {
            let s = &guard[meta.index];
            let next = &guard[meta.next];
            assert_eq!(
                (s.first + s.count) % self.capacity(),
                next.first,
                "window contiguity violated at stage {} -> {}",
                meta.index,
                meta.next
            );
        }
    }

    /// Blocks stage `stage` until it has work to do.
    ///
    /// `on_timeout` is invoked *outside* the shared mutex (plugins must
    /// not hold ring state across blocking calls) whenever `packet_timeout`
    /// elapses; its [`TimeoutAction`] decides whether to keep waiting or
    /// give up and report a timed-out empty grant.
    pub fn wait_work(
        &self,
        stage: usize,
        min_pkt_count: usize,
        mut on_timeout: impl FnMut() -> TimeoutAction,
    ) -> WorkGrant {
        let meta = &self.stages[stage];
        let cap = self.capacity();
        let min_pkt_count = if min_pkt_count > cap {
            tracing::warn!(
                stage = %meta.name,
                requested = min_pkt_count,
                capacity = cap,
                "wait_work: min_pkt_count exceeds buffer capacity, clamping"
            );
            cap
        } else {
            min_pkt_count
        };
        let next_idx = meta.next;
        let is_output = meta.kind == PluginKind::Output;

        let predicate = |guard: &Vec<WindowState>| -> bool {
            guard[stage].count >= min_pkt_count
                || guard[stage].input_end
                || (!is_output && guard[next_idx].aborting)
        };

        let mut guard = self.state.lock().unwrap();
        loop {
            if predicate(&guard) {
                break;
            }
            match meta.packet_timeout {
                None => {
                    guard = self.condvars[stage].wait(guard).unwrap();
                }
                Some(d) => {
                    let (new_guard, result) = self.condvars[stage].wait_timeout(guard, d).unwrap();
                    guard = new_guard;
                    if result.timed_out() && !predicate(&guard) {
                        drop(guard);
                        let action = on_timeout();
                        guard = self.state.lock().unwrap();
                        match action {
                            TimeoutAction::Continue => continue,
                            TimeoutAction::Abort => {
                                let aborted = !is_output && guard[next_idx].aborting;
                                return WorkGrant {
                                    first: guard[stage].first,
                                    count: 0,
                                    bitrate: guard[stage].bitrate,
                                    bitrate_confidence: guard[stage].bitrate_confidence,
                                    input_end: guard[stage].input_end,
                                    aborted,
                                    timed_out: true,
                                };
                            }
                        }
                    }
                }
            }
        }

        let available = guard[stage].count;
        let (head, _tail) = self.buffer.window_ranges(guard[stage].first, available);
        let head_len = head.len();
        let count = if head_len < available && head_len >= min_pkt_count {
            head_len
        } else {
            available
        };
        let aborted = !is_output && guard[next_idx].aborting;

        WorkGrant {
            first: guard[stage].first,
            count,
            bitrate: guard[stage].bitrate,
            bitrate_confidence: guard[stage].bitrate_confidence,
            input_end: guard[stage].input_end,
            aborted,
            timed_out: false,
        }
    }

    /// Advances `stage`'s window tail into `next(stage)`'s window head and
    /// propagates metadata/termination flags. Returns whether
    /// `stage` should keep looping.
    pub fn pass_packets(
        &self,
        stage: usize,
        count: usize,
        bitrate: u64,
        bitrate_confidence: BitrateConfidence,
        input_end: bool,
        mut aborted: bool,
    ) -> bool {
        let meta = &self.stages[stage];
        let next_idx = meta.next;
        let prev_idx = meta.prev;
        let is_output = meta.kind == PluginKind::Output;
        let cap = self.capacity();

        let mut guard = self.state.lock().unwrap();
        assert!(
            count <= guard[stage].count,
            "pass_packets: stage {} tried to pass {} packets but only owns {}",
            meta.name,
            count,
            guard[stage].count
        );

        guard[stage].first = (guard[stage].first + count) % cap;
        guard[stage].count -= count;
        guard[next_idx].count += count;

        // The Output -> Input edge recycles slots only, nothing else.
        // An aborting stage also counts as end-of-input for its immediate
        // successor: no more packets will ever arrive from it, so the next
        // stage must stop waiting rather than block forever on a predicate
        // that only watches its own `next`.
        if !is_output {
            guard[next_idx].bitrate = bitrate;
            guard[next_idx].bitrate_confidence = bitrate_confidence;
            if input_end || aborted {
                guard[next_idx].input_end = true;
            }
        }

        if count > 0 || (!is_output && (input_end || aborted)) {
            self.condvars[next_idx].notify_one();
        }

        if !is_output {
            aborted = aborted || guard[next_idx].aborting;
        }

        if aborted {
            guard[stage].aborting = true;
            self.condvars[prev_idx].notify_one();
        }

        !input_end && !aborted
    }

    /// External abort request: marks `stage` aborting
    /// and wakes its predecessor so the abort propagates backward.
    pub fn set_abort(&self, stage: usize) {
        let prev_idx = self.stages[stage].prev;
        let mut guard = self.state.lock().unwrap();
        if !guard[stage].aborting {
            guard[stage].aborting = true;
        }
        self.condvars[prev_idx].notify_one();
        // Also wake the stage itself, in case it is blocked waiting on its
        // own condvar for reasons unrelated to downstream abort (e.g. an
        // Output stage, which never observes `next.aborting`).
        self.condvars[stage].notify_one();
    }

    /// Installs a restart record on `stage`'s pending slot. If a previous
    /// record was still pending (not yet serviced), it is returned so the
    /// caller can complete it with [`RestartError::Interrupted`] (see
    /// 1) — note the shared mutex is already held for that completion,
    /// matching the locking discipline below ("shared mutex... before
    /// any restart-record mutex").
    pub fn install_restart(&self, record: Arc<RestartRecord>) -> Option<Arc<RestartRecord>> {
        let stage = record.target_stage;
        let mut guard = self.state.lock().unwrap();
        let previous = guard[stage].restart_pending.replace(record);
        self.condvars[stage].notify_one();
        previous
    }

    /// Services a pending restart on `stage`, if any. `f` runs the actual
    /// `stop`/`reset_context`/`start` sequence and is called *while the
    /// shared mutex is held* ("the shared mutex is held across the
    /// entire restart... an acknowledged limitation"). Returns `false` if
    /// there was nothing pending.
    pub fn service_restart(
        &self,
        stage: usize,
        f: impl FnOnce(&RestartRecord) -> Result<(), RestartError>,
    ) -> bool {
        let mut guard = self.state.lock().unwrap();
        let record = match guard[stage].restart_pending.take() {
            Some(r) => r,
            None => return false,
        };
        // The shared mutex stays held across the plugin's stop/reset/start
        // sequence (coarse but simple, an accepted tradeoff): `f` must not
        // call back into wait_work/pass_packets for this ring.
        let outcome = f(&record);
        drop(guard);
        record.complete(outcome);
        true
    }
}
