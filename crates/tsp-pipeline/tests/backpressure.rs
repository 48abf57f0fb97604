//! Scenario 2: a deliberately tiny buffer forces Input to block on free
//! slots recycled from a slow Output, and no packets are lost or
//! duplicated in the process.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tsp_pipeline::error::PluginError;
use tsp_pipeline::events::EventRegistry;
use tsp_pipeline::metadata::PacketMetadata;
use tsp_pipeline::packet::TsPacket;
use tsp_pipeline::pipeline::{Pipeline, StageSpec};
use tsp_pipeline::plugin::{OutputPlugin, PluginCommon, PluginKind, PluginObject, ReportCell};
use tsp_pipeline::plugins::{GeneratorInput, PassthroughProcessor};
use tsp_pipeline::report::SharedReportSink;

/// An Output that sleeps briefly per call, slow enough to make the ring's
/// tiny buffer fill up and force Input to wait.
struct SlowOutput {
    received: Arc<std::sync::atomic::AtomicU64>,
    report: ReportCell,
}

impl PluginCommon for SlowOutput {
    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl OutputPlugin for SlowOutput {
    fn send(&mut self, packets: &[TsPacket], _metadata: &[PacketMetadata]) -> Result<bool, PluginError> {
        thread::sleep(Duration::from_micros(500));
        self.received.fetch_add(packets.len() as u64, Ordering::SeqCst);
        Ok(true)
    }
}

#[test]
fn small_buffer_forces_backpressure_without_losing_packets() {
    let total = 500u64;
    let received = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let generator = GeneratorInput::new(0x0100, Some(total));
    let passthrough = PassthroughProcessor::new(false);
    let output = SlowOutput {
        received: received.clone(),
        report: ReportCell::default(),
    };

    let specs = vec![
        StageSpec {
            name: "gen".into(),
            kind: PluginKind::Input,
            packet_timeout: None,
            pin_core: None,
            args: vec![],
        },
        StageSpec {
            name: "pass".into(),
            kind: PluginKind::Processor,
            packet_timeout: None,
            pin_core: None,
            args: vec![],
        },
        StageSpec {
            name: "sink".into(),
            kind: PluginKind::Output,
            packet_timeout: None,
            pin_core: None,
            args: vec![],
        },
    ];
    let plugins = vec![
        PluginObject::Input(Box::new(generator)),
        PluginObject::Processor(Box::new(passthrough)),
        PluginObject::Output(Box::new(output)),
    ];

    // Capacity far smaller than `total`: Input must block on recycled slots
    // repeatedly over the run rather than producing everything up front.
    let pipeline = Pipeline::start(8, specs, plugins, EventRegistry::default()).expect("pipeline starts");
    pipeline.join().expect("pipeline runs to completion");

    assert_eq!(received.load(Ordering::SeqCst), total);
}
