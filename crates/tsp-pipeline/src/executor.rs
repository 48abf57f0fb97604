//! The per-stage worker loop.
//!
//! Each stage runs on its own OS thread, built the same way across every
//! stage: a `thread::Builder` with a descriptive name, an optional core
//! pinning, and a body that repeatedly services pending restarts, blocks
//! in [`Ring::wait_work`], invokes the plugin, and reports the outcome
//! through [`Ring::pass_packets`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{PipelineError, PluginError, RestartError};
use crate::events::{EventContext, EventRegistry};
use crate::packet::TsPacket;
use crate::plugin::{PacketStatus, PluginCommon, PluginObject};
use crate::report::ReportLevel;
use crate::ring::Ring;
use crate::uid::UidGenerator;

/// Shared counters every stage increments so event contexts and periodic
/// reports can carry a running total, mirroring the reference executor's
/// per-stage/global packet counters.
#[derive(Default)]
pub struct PacketCounters {
    pub global: AtomicU64,
}

pub struct Worker {
    ring: Arc<Ring>,
    stage: usize,
    plugin: PluginObject,
    args: Vec<String>,
    events: EventRegistry,
    counters: Arc<PacketCounters>,
    uids: Arc<UidGenerator>,
    local_packets: u64,
    core: Option<core_affinity::CoreId>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ring: Arc<Ring>,
        stage: usize,
        plugin: PluginObject,
        args: Vec<String>,
        events: EventRegistry,
        counters: Arc<PacketCounters>,
        uids: Arc<UidGenerator>,
        core: Option<core_affinity::CoreId>,
    ) -> Self {
        Self {
            ring,
            stage,
            plugin,
            args,
            events,
            counters,
            uids,
            local_packets: 0,
            core,
        }
    }

    /// Spawns the worker on its own named thread.
    pub fn spawn(mut self) -> std::io::Result<JoinHandle<Result<(), PipelineError>>> {
        let name = self.ring.stages[self.stage].name.clone();
        std::thread::Builder::new()
            .name(format!("tsp-stage-{}-{name}", self.stage))
            .spawn(move || self.run())
    }

    fn run(&mut self) -> Result<(), PipelineError> {
        if let Some(core) = self.core {
            core_affinity::set_for_current(core);
        }

        let stage = self.stage;
        let stage_count = self.ring.stage_count();
        let stage_name = self.ring.stages[stage].name.clone();

        let args = std::mem::take(&mut self.args);
        self.plugin.common_mut().configure(&stage_name, &args).map_err(|e| {
            PipelineError::InvariantViolated(format!("stage '{stage_name}' failed to configure: {e}"))
        })?;
        self.plugin.common_mut().start().map_err(|e| {
            PipelineError::InvariantViolated(format!("stage '{stage_name}' failed to start: {e}"))
        })?;

        loop {
            if self.service_pending_restart() {
                continue;
            }

            let plugin = &mut self.plugin;
            let grant = self.ring.wait_work(stage, 1, || plugin.common_mut().handle_packet_timeout());

            if grant.timed_out || grant.aborted {
                self.ring
                    .pass_packets(stage, 0, grant.bitrate, grant.bitrate_confidence, grant.input_end, true);
                self.report(ReportLevel::Info, "stopping: aborted or timed out waiting for work");
                break;
            }
            if grant.count == 0 && grant.input_end {
                self.ring
                    .pass_packets(stage, 0, grant.bitrate, grant.bitrate_confidence, true, false);
                break;
            }

            let outcome = match &mut self.plugin {
                PluginObject::Input(_) => self.run_input(grant.first, grant.count, grant.input_end),
                PluginObject::Processor(_) => self.run_processor(grant.first, grant.count),
                PluginObject::Output(_) => self.run_output(grant.first, grant.count),
            };

            let (consumed, input_end, aborted) = match outcome {
                Ok(v) => v,
                Err(err) => {
                    self.report(ReportLevel::Error, &format!("stage error: {err}"));
                    (0, grant.input_end, true)
                }
            };

            self.local_packets += consumed as u64;
            self.counters.global.fetch_add(consumed as u64, Ordering::Relaxed);

            let keep_going = self.ring.pass_packets(
                stage,
                consumed,
                grant.bitrate,
                grant.bitrate_confidence,
                input_end || grant.input_end,
                aborted,
            );

            for (code, data) in self.plugin.common_mut().take_events() {
                self.events.dispatch(&EventContext {
                    event_id: self.uids.next(),
                    code,
                    stage_name: stage_name.clone(),
                    stage_index: stage,
                    stage_count,
                    bitrate: grant.bitrate,
                    bitrate_confidence: grant.bitrate_confidence,
                    local_packets: self.local_packets,
                    global_packets: self.counters.global.load(Ordering::Relaxed),
                    data,
                });
            }

            if !keep_going {
                break;
            }
        }

        self.plugin.common_mut().stop().map_err(|e| {
            PipelineError::InvariantViolated(format!("stage '{stage_name}' failed to stop cleanly: {e}"))
        })?;
        Ok(())
    }

    fn run_input(&mut self, first: usize, count: usize, already_ended: bool) -> Result<(usize, bool, bool), PluginError> {
        let PluginObject::Input(plugin) = &mut self.plugin else {
            unreachable!("run_input called on non-input stage")
        };
        let (head, tail) = unsafe { self.ring.buffer.packet_window_mut(first, count) };
        let (head_meta, tail_meta) = unsafe { self.ring.buffer.metadata_window_mut(first, count) };

        let head_len = head.len();
        let mut produced = plugin.receive(head, head_meta)?;
        if produced == head_len && !tail.is_empty() {
            produced += plugin.receive(tail, tail_meta)?;
        }
        let ended = produced == 0 && !already_ended;
        Ok((produced, ended, false))
    }

    fn run_processor(&mut self, first: usize, count: usize) -> Result<(usize, bool, bool), PluginError> {
        let PluginObject::Processor(plugin) = &mut self.plugin else {
            unreachable!("run_processor called on non-processor stage")
        };
        let (head, tail) = unsafe { self.ring.buffer.packet_window_mut(first, count) };
        let (head_meta, tail_meta) = unsafe { self.ring.buffer.metadata_window_mut(first, count) };

        let mut consumed = 0usize;
        let mut ended = false;
        let mut aborted = false;
        'chunks: for (pkts, metas) in [(head, head_meta), (tail, tail_meta)] {
            for (pkt, meta) in pkts.iter_mut().zip(metas.iter_mut()) {
                match plugin.process_packet(pkt, meta)? {
                    PacketStatus::Keep => {}
                    PacketStatus::Drop => meta.valid = false,
                    PacketStatus::StuffNull => *pkt = TsPacket::null_packet(),
                    PacketStatus::End => ended = true,
                    PacketStatus::Abort => aborted = true,
                }
                consumed += 1;
                if ended || aborted {
                    break 'chunks;
                }
            }
        }
        Ok((consumed, ended, aborted))
    }

    fn run_output(&mut self, first: usize, count: usize) -> Result<(usize, bool, bool), PluginError> {
        let PluginObject::Output(plugin) = &mut self.plugin else {
            unreachable!("run_output called on non-output stage")
        };
        let (head, tail) = unsafe { self.ring.buffer.packet_window(first, count) };
        let (head_meta, tail_meta) = unsafe { self.ring.buffer.metadata_window(first, count) };

        let mut ok = plugin.send(head, head_meta)?;
        if ok && !tail.is_empty() {
            ok = plugin.send(tail, tail_meta)?;
        }
        Ok((count, false, !ok))
    }

    /// Checks for, and if present runs, a pending restart request. Returns
    /// whether one was serviced (the caller should re-check for work
    /// rather than assume it still holds a valid grant).
    fn service_pending_restart(&mut self) -> bool {
        let stage = self.stage;
        let plugin = &mut self.plugin;
        self.ring.service_restart(stage, |record| {
            Self::perform_restart(plugin, record)
        })
    }

    fn perform_restart(
        plugin: &mut PluginObject,
        record: &crate::restart::RestartRecord,
    ) -> Result<(), RestartError> {
        let common = plugin.common_mut();
        let previous_sink = common.redirect_report(record.sink.clone());

        if let Err(e) = common.stop() {
            common.redirect_report(previous_sink);
            return Err(RestartError::Unrecoverable(format!("stop() failed: {e}")));
        }

        let result = Self::apply_args(common, &record.args);
        let final_result = match result {
            Ok(()) => Ok(()),
            Err(e) if record.same_args => {
                Err(RestartError::Unrecoverable(format!("restart with identical arguments failed: {e}")))
            }
            Err(e) => {
                record.sink.report(
                    ReportLevel::Warning,
                    &format!("new configuration rejected ({e}); falling back to previous configuration"),
                );
                match Self::apply_args(common, &[]) {
                    Ok(()) => Err(RestartError::ConfigurationFallback(e.to_string())),
                    Err(fallback_err) => {
                        common.redirect_report(previous_sink);
                        return Err(RestartError::Unrecoverable(format!(
                            "fallback to previous configuration also failed: {fallback_err}"
                        )));
                    }
                }
            }
        };

        common.redirect_report(previous_sink);
        final_result
    }

    fn apply_args(common: &mut dyn PluginCommon, args: &[String]) -> Result<(), PluginError> {
        common.reset_context(args)?;
        common.configure("restart", args)?;
        common.start()
    }

    fn report(&self, level: ReportLevel, message: &str) {
        // Stage lifecycle messages (not plugin-originated) go straight to
        // tracing; only plugin-originated reports go through the plugin's
        // current (possibly redirected) sink.
        match level {
            ReportLevel::Debug => tracing::debug!(stage = self.stage, "{message}"),
            ReportLevel::Info => tracing::info!(stage = self.stage, "{message}"),
            ReportLevel::Warning => tracing::warn!(stage = self.stage, "{message}"),
            ReportLevel::Error => tracing::error!(stage = self.stage, "{message}"),
        }
    }
}
