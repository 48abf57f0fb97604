//! Top-level construction and supervision: the API a caller actually uses
//! to stand up a ring of stages, abort it, restart one stage in place, and
//! wait for it to finish.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, RestartError};
use crate::events::EventRegistry;
use crate::executor::{PacketCounters, Worker};
use crate::plugin::{PluginKind, PluginObject};
use crate::report::SharedReportSink;
use crate::restart::RestartRecord;
use crate::ring::{Ring, StageMeta};
use crate::uid::UidGenerator;

/// Static per-stage configuration handed to [`Pipeline::start`], distinct
/// from the plugin object itself.
pub struct StageSpec {
    pub name: String,
    pub kind: PluginKind,
    /// Argument vector handed to the plugin's `configure`/`start` at
    /// pipeline startup, the same shape `restart_stage` later hands it on
    /// a restart.
    pub args: Vec<String>,
    pub packet_timeout: Option<Duration>,
    pub pin_core: Option<usize>,
}

impl StageSpec {
    /// Converts a parsed [`crate::config::StageConfig`] into the form
    /// [`Pipeline::start`] consumes.
    pub fn from_config(cfg: &crate::config::StageConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            args: cfg.args.clone(),
            packet_timeout: cfg.packet_timeout(),
            pin_core: cfg.pin_core,
        }
    }
}

pub struct Pipeline {
    pub id: Uuid,
    ring: Arc<Ring>,
    handles: Vec<JoinHandle<Result<(), PipelineError>>>,
    uids: Arc<UidGenerator>,
}

impl Pipeline {
    /// Validates the stage shape, builds the ring, and spawns one thread
    /// per stage. Threads begin running immediately; call [`Pipeline::join`]
    /// to wait for natural completion (end-of-input draining through) or
    /// [`Pipeline::abort`] to stop early.
    pub fn start(
        buffer_capacity: usize,
        specs: Vec<StageSpec>,
        plugins: Vec<PluginObject>,
        events: EventRegistry,
    ) -> PipelineResult<Self> {
        let n = specs.len();
        if n < 3 {
            return Err(PipelineError::TooFewStages(n));
        }
        if n != plugins.len() {
            return Err(PipelineError::PluginCountMismatch {
                plugins: plugins.len(),
                stages: n,
            });
        }
        if buffer_capacity == 0 {
            return Err(PipelineError::InvalidBufferCapacity);
        }

        for (i, (spec, plugin)) in specs.iter().zip(plugins.iter()).enumerate() {
            let expected = if i == 0 {
                PluginKind::Input
            } else if i == n - 1 {
                PluginKind::Output
            } else {
                PluginKind::Processor
            };
            if spec.kind != expected || plugin.kind() != expected {
                return Err(PipelineError::StageKindMismatch {
                    index: i,
                    name: spec.name.clone(),
                    found: plugin.kind(),
                    expected,
                });
            }
        }

        let id = Uuid::new_v4();
        let stage_metas: Vec<StageMeta> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| StageMeta {
                index: i,
                name: s.name.clone(),
                kind: s.kind,
                prev: (i + n - 1) % n,
                next: (i + 1) % n,
                packet_timeout: s.packet_timeout,
            })
            .collect();
        let cores: Vec<Option<core_affinity::CoreId>> = specs
            .iter()
            .map(|s| s.pin_core.map(|id| core_affinity::CoreId { id }))
            .collect();

        let ring = Arc::new(Ring::new(buffer_capacity, stage_metas));
        let counters = Arc::new(PacketCounters::default());
        let uids = Arc::new(UidGenerator::new());

        tracing::info!(pipeline = %id, stages = n, capacity = buffer_capacity, "starting pipeline");

        let args: Vec<Vec<String>> = specs.into_iter().map(|s| s.args).collect();
        let mut handles = Vec::with_capacity(n);
        for (i, plugin) in plugins.into_iter().enumerate() {
            let worker = Worker::new(
                ring.clone(),
                i,
                plugin,
                args[i].clone(),
                events.clone(),
                counters.clone(),
                uids.clone(),
                cores[i],
            );
            let handle = worker
                .spawn()
                .map_err(|e| PipelineError::InvariantViolated(format!("failed to spawn stage thread {i}: {e}")))?;
            handles.push(handle);
        }

        Ok(Self { id, ring, handles, uids })
    }

    /// Validates `config` and starts a pipeline from it, converting each
    /// [`crate::config::StageConfig`] into the [`StageSpec`] `start` expects.
    /// Plugin objects are still supplied by the caller: this crate has no
    /// dynamic stage registry, so `config` only carries the declarative
    /// shape (name, kind, args, timeout, core pinning), not the plugin
    /// implementations themselves.
    pub fn from_config(config: &PipelineConfig, plugins: Vec<PluginObject>, events: EventRegistry) -> PipelineResult<Self> {
        config.validate()?;
        let specs = config.stages.iter().map(StageSpec::from_config).collect();
        Self::start(config.buffer_capacity, specs, plugins, events)
    }

    /// Forces every stage to notice abort as soon as it next checks, rather
    /// than waiting for the natural backward cascade from one entry point.
    pub fn abort(&self) {
        tracing::info!(pipeline = %self.id, "abort requested");
        for stage in 0..self.ring.stage_count() {
            self.ring.set_abort(stage);
        }
    }

    /// Runs the full restart protocol for one stage: installs a record
    /// (superseding, with [`RestartError::Interrupted`], any restart still
    /// pending for that stage), then blocks until the stage's worker has
    /// serviced it.
    pub fn restart_stage(
        &self,
        stage: usize,
        args: Vec<String>,
        same_args: bool,
        sink: SharedReportSink,
    ) -> Result<(), RestartError> {
        if stage >= self.ring.stage_count() {
            return Err(RestartError::StageNotFound(stage));
        }
        let record = RestartRecord::new(self.uids.next(), stage, args, same_args, sink);
        tracing::info!(pipeline = %self.id, restart = record.id, stage, "restart requested");
        if let Some(superseded) = self.ring.install_restart(record.clone()) {
            superseded.complete(Err(RestartError::Interrupted));
        }
        record.wait()
    }

    /// Blocks until every stage thread has exited, surfacing the first
    /// error or panic encountered.
    pub fn join(self) -> PipelineResult<()> {
        for handle in self.handles {
            match handle.join() {
                Ok(result) => result?,
                Err(panic) => return Err(PipelineError::WorkerPanicked(panic_message(&panic))),
            }
        }
        tracing::info!(pipeline = %self.id, "pipeline finished");
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
