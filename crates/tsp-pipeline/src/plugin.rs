//! The plugin contract.
//!
//! Rather than the source's virtual-inheritance hierarchy, each stage
//! kind gets a narrow trait (`InputPlugin`/`ProcessorPlugin`/
//! `OutputPlugin`) on top of a shared `PluginCommon`. A [`PluginObject`]
//! is the tagged variant an executor stage actually stores.

use crate::error::PluginError;
use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;
use crate::report::{ReportSink, SharedReportSink, TracingSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three stage kinds supported by this pipeline. Adding new kinds is
/// explicitly out of scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Input,
    Processor,
    Output,
}

/// Quality tag on a propagated bitrate measurement (GLOSSARY).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitrateConfidence {
    #[default]
    Undefined,
    Low,
    High,
}

/// What a processor decided to do with one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketStatus {
    /// Keep the packet, pass it on unchanged (labels aside).
    Keep,
    /// Logically drop the packet: it does not reach the next stage.
    Drop,
    /// Replace the packet's content with a null packet but still pass it.
    StuffNull,
    /// This is the last packet; propagate end-of-input after it.
    End,
    /// Abort: stop the stage (and, via backward propagation, everything upstream).
    Abort,
}

/// What `wait_work` should do after its packet timeout elapses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutAction {
    Continue,
    Abort,
}

/// Operations common to every plugin kind.
pub trait PluginCommon: Send {
    /// Reinitializes transient state before a (re)start. Called by the
    /// restart protocol before `start()`.
    fn reset_context(&mut self, _args: &[String]) -> Result<(), PluginError> {
        Ok(())
    }

    /// Parses and validates `args`, the plugin's command-line-shaped
    /// argument vector analogue. `partial` mirrors the source's
    /// allow-partial-validation mode used during restart fallback.
    fn configure(&mut self, _name: &str, _args: &[String]) -> Result<(), PluginError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when `wait_work` times out waiting for this stage.
    /// Defaults to treating every timeout as fatal, forcing stages to
    /// opt in to benign-timeout handling (mirrors the bitrate monitor,
    /// which overrides this to tick its windowing logic).
    fn handle_packet_timeout(&mut self) -> TimeoutAction {
        TimeoutAction::Abort
    }

    fn is_real_time(&self) -> bool {
        false
    }

    /// Installs a new report sink, returning the previous one so the
    /// caller (the restart protocol) can restore it afterwards.
    fn redirect_report(&mut self, sink: SharedReportSink) -> SharedReportSink {
        std::mem::replace(self.report_slot(), sink)
    }

    /// Gives the restart protocol direct access to the sink field so the
    /// default `redirect_report` can swap it. Implementors typically keep
    /// one `SharedReportSink` field and return `&mut` to it here.
    fn report_slot(&mut self) -> &mut SharedReportSink;

    /// Drains whatever events this plugin queued (via its own
    /// [`crate::events::EventCell`]) since the last drain. The executor
    /// calls this after every packet pass and dispatches one
    /// [`crate::events::EventContext`] per returned `(code, data)` pair.
    /// Plugins that never raise events can leave the default empty `Vec`.
    fn take_events(&mut self) -> Vec<(u32, serde_json::Value)> {
        Vec::new()
    }
}

pub trait InputPlugin: PluginCommon {
    /// Writes up to `packets.len()` fresh packets/metadata into the given
    /// slices and returns how many were produced. Returns `Ok(0)` on
    /// end-of-input.
    fn receive(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize, PluginError>;
}

pub trait ProcessorPlugin: PluginCommon {
    fn process_packet(
        &mut self,
        packet: &mut TsPacket,
        metadata: &mut PacketMetadata,
    ) -> Result<PacketStatus, PluginError>;
}

pub trait OutputPlugin: PluginCommon {
    /// Consumes `packets`/`metadata`. Returns `Ok(false)` to signal the
    /// send failed.
    fn send(&mut self, packets: &[TsPacket], metadata: &[PacketMetadata]) -> Result<bool, PluginError>;
}

/// The tagged variant an executor stage stores.
pub enum PluginObject {
    Input(Box<dyn InputPlugin>),
    Processor(Box<dyn ProcessorPlugin>),
    Output(Box<dyn OutputPlugin>),
}

impl PluginObject {
    pub fn kind(&self) -> PluginKind {
        match self {
            PluginObject::Input(_) => PluginKind::Input,
            PluginObject::Processor(_) => PluginKind::Processor,
            PluginObject::Output(_) => PluginKind::Output,
        }
    }

    pub fn common_mut(&mut self) -> &mut dyn PluginCommon {
        match self {
            PluginObject::Input(p) => p.as_mut(),
            PluginObject::Processor(p) => p.as_mut(),
            PluginObject::Output(p) => p.as_mut(),
        }
    }
}

/// A convenience base other plugin implementations embed to get a working
/// `report_slot` for free, mirroring how concrete plugins in the reference
/// repository hold their own small piece of shared state.
pub struct ReportCell(pub SharedReportSink);

impl Default for ReportCell {
    fn default() -> Self {
        Self(Arc::new(TracingSink))
    }
}

impl ReportCell {
    pub fn slot(&mut self) -> &mut SharedReportSink {
        &mut self.0
    }
}
