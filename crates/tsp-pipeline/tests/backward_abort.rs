//! Scenario 3: a processor aborts partway through the run, and that
//! propagates backward through every stage so the whole pipeline still
//! joins cleanly instead of hanging.

use std::sync::atomic::Ordering;

use tsp_pipeline::error::PluginError;
use tsp_pipeline::events::EventRegistry;
use tsp_pipeline::metadata::PacketMetadata;
use tsp_pipeline::packet::TsPacket;
use tsp_pipeline::pipeline::{Pipeline, StageSpec};
use tsp_pipeline::plugin::{PacketStatus, PluginCommon, PluginKind, PluginObject, ProcessorPlugin, ReportCell};
use tsp_pipeline::plugins::{CountingOutput, GeneratorInput};
use tsp_pipeline::report::SharedReportSink;

/// Aborts once it has passed `limit` packets through.
struct AbortAfter {
    limit: u64,
    seen: u64,
    report: ReportCell,
}

impl PluginCommon for AbortAfter {
    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl ProcessorPlugin for AbortAfter {
    fn process_packet(&mut self, _packet: &mut TsPacket, _metadata: &mut PacketMetadata) -> Result<PacketStatus, PluginError> {
        self.seen += 1;
        if self.seen > self.limit {
            return Ok(PacketStatus::Abort);
        }
        Ok(PacketStatus::Keep)
    }
}

#[test]
fn processor_abort_cascades_and_pipeline_still_joins() {
    // Generator would happily produce far more than the abort threshold;
    // the pipeline must still stop well short of it.
    let generator = GeneratorInput::new(0x0100, Some(1_000_000));
    let aborter = AbortAfter {
        limit: 300,
        seen: 0,
        report: ReportCell::default(),
    };
    let output = CountingOutput::new();
    let sent = output.sent_counter();

    let specs = vec![
        StageSpec {
            name: "gen".into(),
            kind: PluginKind::Input,
            packet_timeout: None,
            pin_core: None,
            args: vec![],
        },
        StageSpec {
            name: "aborter".into(),
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
        PluginObject::Processor(Box::new(aborter)),
        PluginObject::Output(Box::new(output)),
    ];

    let pipeline = Pipeline::start(16, specs, plugins, EventRegistry::default()).expect("pipeline starts");
    pipeline.join().expect("abort cascade lets the pipeline join cleanly");

    // The output must have seen strictly fewer packets than the generator's
    // total and the run must have actually terminated (join returned).
    assert!(sent.load(Ordering::SeqCst) < 1_000_000);
}
