//! Scenarios 4 and 5: restarting a stage in place, both the same-args
//! success path and the bad-new-args fallback-to-previous-config path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tsp_pipeline::error::PluginError;
use tsp_pipeline::events::EventRegistry;
use tsp_pipeline::metadata::PacketMetadata;
use tsp_pipeline::packet::TsPacket;
use tsp_pipeline::pipeline::{Pipeline, StageSpec};
use tsp_pipeline::plugin::{PacketStatus, PluginCommon, PluginKind, PluginObject, ProcessorPlugin, ReportCell};
use tsp_pipeline::plugins::{CountingOutput, GeneratorInput};
use tsp_pipeline::report::{SharedReportSink, TracingSink};

/// A processor whose `configure` rejects the literal argument `"bad"`,
/// letting tests exercise both the same-args and fallback restart paths.
/// Tracks how many times it has been started, so tests can confirm a
/// restart actually ran the stop/reset/start sequence.
struct ConfigurableProcessor {
    starts: Arc<AtomicUsize>,
    report: ReportCell,
}

impl PluginCommon for ConfigurableProcessor {
    fn configure(&mut self, _name: &str, args: &[String]) -> Result<(), PluginError> {
        if args.iter().any(|a| a == "bad") {
            return Err(PluginError::Configuration("argument 'bad' is not allowed".into()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), PluginError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl ProcessorPlugin for ConfigurableProcessor {
    fn process_packet(&mut self, _packet: &mut TsPacket, _metadata: &mut PacketMetadata) -> Result<PacketStatus, PluginError> {
        Ok(PacketStatus::Keep)
    }
}

fn build_pipeline(starts: Arc<AtomicUsize>) -> (Pipeline, Arc<std::sync::atomic::AtomicU64>) {
    let generator = GeneratorInput::new(0x0100, None); // runs until aborted
    let processor = ConfigurableProcessor {
        starts,
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
            name: "configurable".into(),
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
        PluginObject::Processor(Box::new(processor)),
        PluginObject::Output(Box::new(output)),
    ];

    let pipeline = Pipeline::start(32, specs, plugins, EventRegistry::default()).expect("pipeline starts");
    (pipeline, sent)
}

#[test]
fn restart_with_same_args_succeeds_and_pipeline_keeps_running() {
    let starts = Arc::new(AtomicUsize::new(1)); // initial start() from Pipeline::start
    let (pipeline, sent) = build_pipeline(starts.clone());

    thread::sleep(Duration::from_millis(20));
    let result = pipeline.restart_stage(1, vec!["ok".into()], true, Arc::new(TracingSink));
    assert!(result.is_ok(), "same-args restart should succeed: {result:?}");
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    thread::sleep(Duration::from_millis(20));
    let before = sent.load(Ordering::SeqCst);
    pipeline.abort();
    pipeline.join().expect("pipeline joins after abort");
    assert!(sent.load(Ordering::SeqCst) >= before);
}

#[test]
fn restart_with_bad_args_falls_back_and_pipeline_keeps_running() {
    let starts = Arc::new(AtomicUsize::new(1));
    let (pipeline, sent) = build_pipeline(starts.clone());

    thread::sleep(Duration::from_millis(20));
    let result = pipeline.restart_stage(1, vec!["bad".into()], false, Arc::new(TracingSink));
    assert!(
        matches!(result, Err(tsp_pipeline::error::RestartError::ConfigurationFallback(_))),
        "bad new args should fall back, got {result:?}"
    );
    // The rejected attempt never reaches start(); only the fallback retry does.
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    thread::sleep(Duration::from_millis(20));
    let before = sent.load(Ordering::SeqCst);
    pipeline.abort();
    pipeline.join().expect("pipeline still joins after a fallback restart");
    assert!(sent.load(Ordering::SeqCst) >= before);
}
