use crate::bfir::{parse, Cell, Instruction, Opcode};
use crate::dataflow::{net_cell_delta, net_motion, CellDelta};
use crate::execution::{Engine, MemoryFlags, Outcome};
use crate::flatten::check_links;
use crate::peephole::{optimize, OptimisationLevel};
use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};
use std::num::Wrapping;

const MAX_STEPS: u64 = 10_000;
const BAND: usize = 4096;
const ORIGIN: usize = BAND / 2;
const INPUT: &[u8] = b"quickcheck";

/// Random BF source with balanced brackets.
#[derive(Debug, Clone)]
struct Source(String);

impl Arbitrary for Source {
    fn arbitrary<G: Gen>(g: &mut G) -> Source {
        let mut source = String::new();
        push_arbitrary_body(g, &mut source, 3);
        Source(source)
    }
}

fn push_arbitrary_body<G: Gen>(g: &mut G, source: &mut String, max_depth: usize) {
    let len = usize::arbitrary(g) % 12;
    for _ in 0..len {
        let modulus = if max_depth == 0 { 6 } else { 8 };
        match usize::arbitrary(g) % modulus {
            0 => source.push('+'),
            1 => source.push('-'),
            2 => source.push('>'),
            3 => source.push('<'),
            4 => source.push('.'),
            5 => source.push(','),
            6 => {
                source.push('[');
                push_arbitrary_body(g, source, max_depth - 1);
                source.push(']');
            }
            _ => {
                // Loops that count their cell down terminate far more
                // often.
                source.push_str("[-");
                push_arbitrary_body(g, source, max_depth - 1);
                source.push(']');
            }
        }
    }
}

struct Run {
    outcome: Outcome,
    output: Vec<u8>,
    memory: Vec<Cell>,
    dp: i64,
}

fn run(instrs: &[Instruction]) -> Run {
    let engine = Engine::with_memory(instrs, BAND, MemoryFlags::empty(), INPUT, vec![]);
    let mut engine = engine.starting_at(ORIGIN);
    let outcome = engine.run_bounded(MAX_STEPS);
    let dp = engine.data_pointer();
    let memory = engine.memory().to_vec();
    Run {
        outcome,
        output: engine.into_output(),
        memory,
        dp,
    }
}

fn completed(run: &Run) -> bool {
    matches!(run.outcome, Outcome::Completed(_))
}

fn loaded(source: &Source) -> Vec<Instruction> {
    parse(source.0.as_bytes()).0
}

fn optimized(source: &Source) -> Vec<Instruction> {
    optimize(loaded(source), OptimisationLevel::Minimal).0
}

quickcheck! {
    fn optimize_preserves_behaviour(source: Source) -> TestResult {
        let before = run(&loaded(&source));
        if !completed(&before) {
            return TestResult::discard();
        }

        let after = run(&optimized(&source));
        TestResult::from_bool(
            completed(&after)
                && after.output == before.output
                && after.memory == before.memory
                && after.dp == before.dp,
        )
    }

    fn optimize_is_idempotent(source: Source) -> bool {
        let once = optimized(&source);
        let (twice, warnings) = optimize(once.clone(), OptimisationLevel::Minimal);
        warnings.is_empty() && twice == once
    }

    fn optimize_leaves_no_holes(source: Source) -> bool {
        let (instrs, warnings) = optimize(loaded(&source), OptimisationLevel::Minimal);
        warnings.is_empty()
            && instrs.iter().all(|instr| instr.op != Opcode::Nop)
            && check_links(&instrs).is_empty()
    }

    fn optimize_leaves_no_adjacent_aggregatable(source: Source) -> bool {
        optimized(&source)
            .windows(2)
            .all(|pair| !(pair[0].op == pair[1].op && pair[0].op.is_aggregatable()))
    }

    fn load_aggregates_runs(source: Source) -> bool {
        loaded(&source)
            .windows(2)
            .all(|pair| !(pair[0].op == pair[1].op && pair[0].op.is_aggregatable()))
    }

    fn load_links_every_bracket(source: Source) -> bool {
        check_links(&loaded(&source)).is_empty()
    }

    fn net_motion_is_sound(source: Source) -> TestResult {
        for instrs in vec![loaded(&source), optimized(&source)] {
            let motion = match net_motion(&instrs, 0..instrs.len()) {
                Some(motion) => motion,
                None => continue,
            };
            let result = run(&instrs);
            if completed(&result) && result.dp - ORIGIN as i64 != motion {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }

    fn net_cell_delta_is_sound(source: Source, target: i8) -> TestResult {
        let target = i64::from(target % 8);
        for instrs in vec![loaded(&source), optimized(&source)] {
            let delta = match net_cell_delta(&instrs, 0..instrs.len(), target) {
                Some(delta) => delta,
                None => continue,
            };
            let result = run(&instrs);
            if !completed(&result) {
                continue;
            }

            let cell = result.memory[(ORIGIN as i64 + target) as usize];
            let expected = match delta {
                CellDelta::Relative(change) => Wrapping(change.rem_euclid(256) as u8),
                CellDelta::Assigned(value) => Wrapping(value),
            };
            if cell != expected {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }
}
