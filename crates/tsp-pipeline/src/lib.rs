//! A multi-threaded, fixed-capacity transport-stream packet pipeline: a
//! ring of stages sharing one packet buffer through disjoint windows,
//! coordinated by a single mutex and one condition variable per stage.

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod metadata;
pub mod packet;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod report;
pub mod restart;
pub mod ring;
pub mod uid;

pub use buffer::PacketBuffer;
pub use config::{PipelineConfig, StageConfig};
pub use error::{PipelineError, PipelineResult, PluginError, RestartError};
pub use events::{EventCell, EventContext, EventHandler, EventRegistry};
pub use metadata::{LabelSet, PacketMetadata, MAX_LABELS};
pub use packet::{TsPacket, NULL_PID, PACKET_SIZE};
pub use pipeline::{Pipeline, StageSpec};
pub use plugin::{
    BitrateConfidence, InputPlugin, OutputPlugin, PacketStatus, PluginCommon, PluginKind, PluginObject,
    ProcessorPlugin, ReportCell, TimeoutAction,
};
pub use report::{CollectingSink, ReportLevel, ReportSink, SharedReportSink, TracingSink};
pub use restart::RestartRecord;
pub use ring::{Ring, StageMeta, WindowSnapshot, WorkGrant};
pub use uid::UidGenerator;
