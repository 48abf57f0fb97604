//! Property-based checks of the window protocol itself, independent of any
//! plugin or thread: random sequences of `pass_packets` calls must never
//! violate the ring's bookkeeping invariants, and `input_end`/`aborting`
//! must only ever go from false to true, never back.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use tsp_pipeline::plugin::{BitrateConfidence, PluginKind};
use tsp_pipeline::ring::{Ring, StageMeta};

const CAPACITY: usize = 32;

fn three_stage_ring() -> Ring {
    let stages = vec![
        StageMeta {
            index: 0,
            name: "in".into(),
            kind: PluginKind::Input,
            prev: 2,
            next: 1,
            packet_timeout: None,
        },
        StageMeta {
            index: 1,
            name: "proc".into(),
            kind: PluginKind::Processor,
            prev: 0,
            next: 2,
            packet_timeout: None,
        },
        StageMeta {
            index: 2,
            name: "out".into(),
            kind: PluginKind::Output,
            prev: 1,
            next: 0,
            packet_timeout: None,
        },
    ];
    Ring::new(CAPACITY, stages)
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Advance { stage: usize, frac: u8 },
    MarkEnd { stage: usize },
    MarkAbort { stage: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, any::<u8>()).prop_map(|(stage, frac)| Op::Advance { stage, frac }),
        (0..3usize).prop_map(|stage| Op::MarkEnd { stage }),
        (0..3usize).prop_map(|stage| Op::MarkAbort { stage }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn window_invariants_hold_under_random_advances(ops in prop_vec(op_strategy(), 0..200)) {
        let ring = three_stage_ring();
        let mut prev_input_end = [false; 3];
        let mut prev_aborting = [false; 3];

        ring.assert_invariants();

        for op in ops {
            match op {
                Op::Advance { stage, frac } => {
                    let snap = ring.snapshot(stage);
                    if snap.count == 0 {
                        continue;
                    }
                    // frac in 0..=255 maps onto 0..=count, always <= what the
                    // stage actually owns.
                    let count = (snap.count * frac as usize) / 255;
                    let kept_going = ring.pass_packets(
                        stage,
                        count,
                        snap.bitrate,
                        snap.bitrate_confidence,
                        false,
                        false,
                    );
                    // Passing zero packets with no end/abort never asks the
                    // stage to stop.
                    if count == 0 {
                        prop_assert!(kept_going);
                    }
                }
                Op::MarkEnd { stage } => {
                    let snap = ring.snapshot(stage);
                    ring.pass_packets(stage, 0, snap.bitrate, BitrateConfidence::Undefined, true, false);
                }
                Op::MarkAbort { stage } => {
                    ring.set_abort(stage);
                }
            }

            ring.assert_invariants();

            for s in 0..3 {
                let snap = ring.snapshot(s);
                prop_assert!(
                    !prev_input_end[s] || snap.input_end,
                    "input_end went from true back to false on stage {s}"
                );
                prop_assert!(
                    !prev_aborting[s] || snap.aborting,
                    "aborting went from true back to false on stage {s}"
                );
                prev_input_end[s] = snap.input_end;
                prev_aborting[s] = snap.aborting;
            }
        }
    }
}
