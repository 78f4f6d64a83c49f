//! Static analyses over spans of a flat program.
//!
//! Every analysis is pure and answers with `None` when it cannot
//! decide ("unpredictable"). Optimisations that depend on an analysis
//! simply don't fire in that case.

use crate::bfir::Instruction;
use crate::bfir::Opcode::*;
use std::ops::Range;

#[cfg(test)]
use crate::bfir::{parse, Opcode};
#[cfg(test)]
use pretty_assertions::assert_eq;

/// The statically known effect of a span on one cell.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CellDelta {
    /// The cell changes by this amount (modulo 256).
    Relative(i64),
    /// The cell ends up holding this value, whatever it held before.
    Assigned(u8),
}

impl CellDelta {
    fn add(self, amount: i64) -> CellDelta {
        match self {
            CellDelta::Relative(delta) => CellDelta::Relative(delta.wrapping_add(amount)),
            CellDelta::Assigned(value) => {
                CellDelta::Assigned(value.wrapping_add(amount.rem_euclid(256) as u8))
            }
        }
    }

    /// True if the span leaves the cell exactly as it found it.
    pub fn is_unchanged(self) -> bool {
        self == CellDelta::Relative(0)
    }
}

/// Find the close matching the open at `open`, provided both ends
/// link to each other and the close lies inside `span`.
fn matching_close(instrs: &[Instruction], open: usize, span: &Range<usize>) -> Option<usize> {
    let opener = instrs.get(open)?;
    let close = opener.target()?;
    if close <= open || close >= span.end {
        return None;
    }
    let closer = instrs.get(close)?;
    if Some(closer.op) == opener.op.partner() && closer.target() == Some(open) {
        Some(close)
    } else {
        None
    }
}

/// Net displacement of the data pointer after executing `span`.
///
/// A `While` has zero motion by construction, so we skip its body
/// without looking. A general loop is only summarised when its body
/// has zero motion: otherwise the displacement depends on the trip
/// count.
pub fn net_motion(instrs: &[Instruction], span: Range<usize>) -> Option<i64> {
    let mut motion: i64 = 0;
    let mut index = span.start;

    while index < span.end {
        let instr = instrs.get(index)?;
        match instr.op {
            MoveLeft | MoveRight => motion = motion.wrapping_add(instr.amount()),
            JumpIfZero => {
                let close = matching_close(instrs, index, &span)?;
                if net_motion(instrs, index + 1..close)? != 0 {
                    return None;
                }
                index = close;
            }
            While => index = matching_close(instrs, index, &span)?,
            _ => {}
        }
        index += 1;
    }

    Some(motion)
}

/// Net effect of `span` on the cell `target`, measured from the data
/// pointer at the start of the span.
pub fn net_cell_delta(
    instrs: &[Instruction],
    span: Range<usize>,
    target: i64,
) -> Option<CellDelta> {
    let mut cell = CellDelta::Relative(0);
    let mut dp: i64 = 0;
    let mut index = span.start;

    while index < span.end {
        let instr = instrs.get(index)?;
        match instr.op {
            MoveLeft | MoveRight => dp = dp.wrapping_add(instr.amount()),
            Add | Sub | AddLeft | AddRight | SubLeft | SubRight => {
                if dp + instr.offset() == target {
                    cell = cell.add(instr.amount());
                }
            }
            Set | SetLeft | SetRight => {
                if dp + instr.offset() == target {
                    cell = CellDelta::Assigned(instr.operand1 as u8);
                }
            }
            Input if dp == target => return None,
            JumpIfZero | While => {
                let close = matching_close(instrs, index, &span)?;
                let body = index + 1..close;
                if instr.op == JumpIfZero && net_motion(instrs, body.clone())? != 0 {
                    return None;
                }

                if dp == target {
                    // Loops only exit once their cell is zero.
                    cell = CellDelta::Assigned(0);
                } else if !net_cell_delta(instrs, body, target - dp)?.is_unchanged() {
                    return None;
                }
                index = close;
            }
            _ => {}
        }
        index += 1;
    }

    Some(cell)
}

/// Could executing `span` observe the value of the cell `target`?
/// Answers `true` whenever it can't tell.
pub fn reads_cell(instrs: &[Instruction], span: Range<usize>, target: i64) -> bool {
    let mut dp: i64 = 0;
    let mut index = span.start;

    while index < span.end {
        let instr = match instrs.get(index) {
            Some(instr) => instr,
            None => return true,
        };
        match instr.op {
            MoveLeft | MoveRight => dp = dp.wrapping_add(instr.amount()),
            Print | Input | JumpIfNonZero | WhileEnd if dp == target => return true,
            JumpIfZero | While => {
                if dp == target {
                    return true;
                }
                let close = match matching_close(instrs, index, &span) {
                    Some(close) => close,
                    None => return true,
                };
                let body = index + 1..close;
                if instr.op == JumpIfZero && net_motion(instrs, body.clone()) != Some(0) {
                    return true;
                }
                if reads_cell(instrs, body, target - dp) {
                    return true;
                }
                index = close;
            }
            _ => {}
        }
        index += 1;
    }

    false
}

#[cfg(test)]
fn motion_of(source: &str) -> Option<i64> {
    let (instrs, _) = parse(source.as_bytes());
    net_motion(&instrs, 0..instrs.len())
}

#[cfg(test)]
fn delta_of(source: &str, target: i64) -> Option<CellDelta> {
    let (instrs, _) = parse(source.as_bytes());
    net_cell_delta(&instrs, 0..instrs.len(), target)
}

#[test]
fn motion_linear() {
    assert_eq!(motion_of(">>>.<++.>"), Some(3));
}

#[test]
fn motion_motionless_loop() {
    assert_eq!(motion_of(">>>.<[++].>"), Some(3));
}

#[test]
fn motion_in_loop_is_unpredictable() {
    assert_eq!(motion_of(">>>.<[+>>>+].>"), None);
}

#[test]
fn motion_in_nested_loop_is_unpredictable() {
    assert_eq!(motion_of(">>>.<[+[>>>]+].>"), None);
}

#[test]
fn motion_motionless_nested_loop() {
    assert_eq!(motion_of(">>>.<[+[>+.<]+].>"), Some(3));
    assert_eq!(motion_of(">>>.<[->+[>+.<]+[->+<]<].>"), Some(3));
}

#[test]
fn motion_skips_while_body() {
    let instrs = [
        Instruction::new(Add, 2),
        Instruction::new(MoveLeft, 1),
        Instruction::new(Set, 10),
        Instruction::new(While, 5),
        Instruction::new(Add, 1),
        Instruction::new(WhileEnd, 3),
    ];
    assert_eq!(net_motion(&instrs, 0..instrs.len()), Some(-1));
}

#[test]
fn motion_unresolved_loop_is_unpredictable() {
    assert_eq!(motion_of(">[>"), None);
}

#[test]
fn motion_loop_leaving_span_is_unpredictable() {
    let (instrs, _) = parse(b">[<>]");
    assert_eq!(net_motion(&instrs, 0..3), None);
    assert_eq!(net_motion(&instrs, 0..1), Some(1));
}

#[test]
fn delta_linear() {
    assert_eq!(delta_of(">>+<-->+>+<<+>-<>", 2), Some(CellDelta::Relative(1)));
}

#[test]
fn delta_of_untouched_cell() {
    assert_eq!(delta_of("+>+<-", 5), Some(CellDelta::Relative(0)));
}

#[test]
fn delta_of_malformed_loop_is_unknown() {
    // The close points somewhere other than its open.
    let instrs = [
        Instruction::new(JumpIfZero, 2),
        Instruction::new(Add, 1),
        Instruction::new(JumpIfNonZero, 1),
    ];
    assert_eq!(net_cell_delta(&instrs, 0..instrs.len(), 0), None);
    assert_eq!(net_cell_delta(&instrs, 0..instrs.len(), 3), None);
}

#[test]
fn delta_input_is_unpredictable() {
    assert_eq!(delta_of(">,<", 1), None);
    assert_eq!(delta_of(">,<", 0), Some(CellDelta::Relative(0)));
}

#[test]
fn delta_set_resets_running_value() {
    let instrs = [
        Instruction::new(Add, 4),
        Instruction::at_offset(SetRight, 7, 1),
        Instruction::new(MoveRight, 1),
        Instruction::new(Sub, 2),
    ];
    assert_eq!(
        net_cell_delta(&instrs, 0..instrs.len(), 1),
        Some(CellDelta::Assigned(5))
    );
}

#[test]
fn delta_loop_on_target_assigns_zero() {
    assert_eq!(delta_of("+++[->+<]", 0), Some(CellDelta::Assigned(0)));
}

#[test]
fn delta_loop_changing_target_each_iteration_is_unpredictable() {
    assert_eq!(delta_of("+++[->+<]", 1), None);
}

#[test]
fn delta_loop_not_touching_target() {
    assert_eq!(delta_of(">+<[->>+<<]>-", 1), Some(CellDelta::Relative(0)));
}

#[test]
fn delta_while_on_target_assigns_zero() {
    let instrs = [
        Instruction::new(Add, 1),
        Instruction::new(While, 3),
        Instruction::at_offset(AddRight, 1, 1),
        Instruction::new(WhileEnd, 1),
    ];
    assert_eq!(
        net_cell_delta(&instrs, 0..instrs.len(), 0),
        Some(CellDelta::Assigned(0))
    );
    assert_eq!(net_cell_delta(&instrs, 0..instrs.len(), 1), None);
    assert_eq!(
        net_cell_delta(&instrs, 0..instrs.len(), 2),
        Some(CellDelta::Relative(0))
    );
}

#[test]
fn reads_cell_print_and_loops() {
    let (instrs, _) = parse(b">.<");
    assert!(reads_cell(&instrs, 0..instrs.len(), 1));
    assert!(!reads_cell(&instrs, 0..instrs.len(), 0));

    let (instrs, _) = parse(b">[-]<+");
    assert!(reads_cell(&instrs, 0..instrs.len(), 1));
    assert!(!reads_cell(&instrs, 0..instrs.len(), 0));
}

#[test]
fn reads_cell_unknown_motion_is_conservative() {
    let (instrs, _) = parse(b"[>]+");
    assert!(reads_cell(&instrs, 0..instrs.len(), 5));
}

#[test]
fn arithmetic_classification() {
    assert!(Opcode::SubLeft.is_arithmetic());
    assert!(!Opcode::SetLeft.is_arithmetic());
}
