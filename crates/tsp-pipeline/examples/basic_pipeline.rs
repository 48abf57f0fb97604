//! Wires the three demo fixture plugins into a runnable three-stage
//! pipeline: a bounded packet generator, a null-stuffing passthrough, and
//! a counting sink. Run with `cargo run --example basic_pipeline`.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tsp_pipeline::events::{EventContext, EventRegistry};
use tsp_pipeline::pipeline::{Pipeline, StageSpec};
use tsp_pipeline::plugin::{PluginKind, PluginObject};
use tsp_pipeline::plugins::{CountingOutput, GeneratorInput, PassthroughProcessor};

fn main() {
    tracing_subscriber::fmt::init();

    let generator = GeneratorInput::new(0x0100, Some(50_000));
    let passthrough = PassthroughProcessor::new(false);
    let output = CountingOutput::new();
    let sent = output.sent_counter();
    let skipped = output.skipped_counter();

    let specs = vec![
        StageSpec {
            name: "generator".into(),
            kind: PluginKind::Input,
            packet_timeout: Some(Duration::from_millis(200)),
            pin_core: None,
            args: vec![],
        },
        StageSpec {
            name: "passthrough".into(),
            kind: PluginKind::Processor,
            packet_timeout: Some(Duration::from_millis(200)),
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

    let events = EventRegistry::new(vec![std::sync::Arc::new(|ctx: &EventContext| {
        if ctx.global_packets % 10_000 == 0 {
            tracing::info!(
                stage = %ctx.stage_name,
                global = ctx.global_packets,
                "progress"
            );
        }
    })]);

    let pipeline = Pipeline::start(512, specs, plugins, events).expect("pipeline configuration is valid");
    pipeline.join().expect("pipeline runs to completion");

    println!(
        "sent={} skipped={}",
        sent.load(Ordering::SeqCst),
        skipped.load(Ordering::SeqCst)
    );
}
