//! Optimisations that replace parts of the instruction stream with
//! denser equivalents.
//!
//! Rewrites never move instructions. A rule overwrites the window it
//! matched and turns the slots it no longer needs into `Nop`s, so
//! every index (and every jump target) stays valid until the end of
//! the pass, when `flatten` compacts the program.

use crate::bfir::Opcode::*;
use crate::bfir::{Instruction, Opcode};
use crate::dataflow::{net_cell_delta, net_motion, reads_cell};
use crate::diagnostics::Warning;
use crate::flatten::flatten;
use std::ops::Range;
use tracing::{debug, trace};

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum OptimisationLevel {
    /// Run the program exactly as loaded.
    #[default]
    None,
    /// Apply the pattern rules until none fires.
    Minimal,
    /// Reserved. Currently the same as `Minimal`.
    Maximal,
}

/// A local rewrite rule. Rules are tried in the order of `RULES`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Rule {
    InverseFold,
    ConstantSet,
    OffsetArithmetic,
    OffsetSet,
    MergeSets,
    UnreachableLoop,
    FoldIntoSet,
    SafeWhile,
}

pub const RULES: [Rule; 8] = [
    Rule::InverseFold,
    Rule::ConstantSet,
    Rule::OffsetArithmetic,
    Rule::OffsetSet,
    Rule::MergeSets,
    Rule::UnreachableLoop,
    Rule::FoldIntoSet,
    Rule::SafeWhile,
];

impl Rule {
    /// Try to rewrite the window starting at `index`. Returns true if
    /// the program changed.
    pub fn try_apply(self, instrs: &mut [Instruction], index: usize) -> bool {
        match self {
            Rule::InverseFold => fold_inverse(instrs, index),
            Rule::ConstantSet => fold_constant_set(instrs, index),
            Rule::OffsetArithmetic => fold_offset_arithmetic(instrs, index),
            Rule::OffsetSet => fold_offset_set(instrs, index),
            Rule::MergeSets => merge_sets(instrs, index),
            Rule::UnreachableLoop => remove_unreachable_loop(instrs, index),
            Rule::FoldIntoSet => fold_into_set(instrs, index),
            Rule::SafeWhile => convert_safe_while(instrs, index),
        }
    }
}

/// Given a program, return an optimised equivalent and any warnings
/// raised while compacting it.
///
/// Each pass costs at least linear time and may rewrite only a few
/// instructions. Deeply nested loops that each begin with `-` need
/// about one pass per level, so they optimise in quadratic time.
pub fn optimize(
    instrs: Vec<Instruction>,
    level: OptimisationLevel,
) -> (Vec<Instruction>, Vec<Warning>) {
    match level {
        OptimisationLevel::None => (instrs, vec![]),
        OptimisationLevel::Minimal | OptimisationLevel::Maximal => optimize_to_fixed_point(instrs),
    }
}

fn optimize_to_fixed_point(mut instrs: Vec<Instruction>) -> (Vec<Instruction>, Vec<Warning>) {
    let mut warnings = vec![];
    let mut pass = 0;

    loop {
        pass += 1;
        let rewrites = optimize_pass(&mut instrs);
        warnings.extend(flatten(&mut instrs));
        debug!(pass, rewrites, len = instrs.len(), "optimiser pass");

        if rewrites == 0 {
            return (instrs, warnings);
        }
    }
}

/// One backward scan over the program, trying every rule at every
/// index. Returns the number of rewrites.
pub fn optimize_pass(instrs: &mut [Instruction]) -> usize {
    let mut rewrites = 0;
    for index in (0..instrs.len()).rev() {
        if let Some(rule) = RULES.iter().find(|rule| rule.try_apply(instrs, index)) {
            trace!(?rule, index, "rewrite");
            rewrites += 1;
        }
    }
    rewrites
}

/// Overwrite `range` with no-ops.
fn erase(instrs: &mut [Instruction], range: Range<usize>) {
    for instr in &mut instrs[range] {
        *instr = Instruction::NOP;
    }
}

/// The plain constant-set value once `amount` is applied to zero.
fn wrap_cell(amount: i64) -> u32 {
    amount.rem_euclid(256) as u32
}

/// Combine adjacent inverse instructions (`+-`, `<>`, and their
/// offset forms) and adjacent identical aggregatable instructions.
fn fold_inverse(instrs: &mut [Instruction], index: usize) -> bool {
    let (current, next) = match (instrs.get(index), instrs.get(index + 1)) {
        (Some(&current), Some(&next)) => (current, next),
        _ => return false,
    };
    if current.operand2 != next.operand2 {
        return false;
    }

    if current.op.inverse() == Some(next.op) {
        let difference = i64::from(current.operand1) - i64::from(next.operand1);
        instrs[index] = if difference == 0 {
            Instruction::NOP
        } else if difference < 0 {
            Instruction::at_offset(next.op, (-difference) as u32, current.operand2)
        } else {
            Instruction::at_offset(current.op, difference as u32, current.operand2)
        };
        instrs[index + 1] = Instruction::NOP;
        return true;
    }

    if current.op == next.op && current.op.is_aggregatable() {
        instrs[index].operand1 = current.operand1.wrapping_add(next.operand1);
        instrs[index + 1] = Instruction::NOP;
        return true;
    }

    false
}

/// `[-]` and `[+]` always leave the cell at zero. A plain `+`/`-` run
/// right after the loop is folded into the constant.
fn fold_constant_set(instrs: &mut [Instruction], index: usize) -> bool {
    let window = match instrs.get(index..index + 3) {
        Some(window) => window,
        None => return false,
    };
    let is_unit_step = matches!(window[1].op, Add | Sub) && window[1].operand1 == 1;
    let is_linked = window[0].op == JumpIfZero
        && window[0].target() == Some(index + 2)
        && window[2].op == JumpIfNonZero
        && window[2].target() == Some(index);
    if !is_linked || !is_unit_step {
        return false;
    }

    let (value, consumed) = match instrs.get(index + 3) {
        Some(next) if matches!(next.op, Add | Sub) => (wrap_cell(next.amount()), 1),
        _ => (0, 0),
    };

    instrs[index] = Instruction::new(Set, value);
    erase(instrs, index + 1..index + 3 + consumed);
    true
}

/// Map a motion to the offset variant of `plain` in that direction.
fn offset_variant(motion: Opcode, plain: Opcode) -> Option<Opcode> {
    match (motion, plain) {
        (MoveLeft, Add) => Some(AddLeft),
        (MoveLeft, Sub) => Some(SubLeft),
        (MoveLeft, Set) => Some(SetLeft),
        (MoveRight, Add) => Some(AddRight),
        (MoveRight, Sub) => Some(SubRight),
        (MoveRight, Set) => Some(SetRight),
        _ => None,
    }
}

/// Match `move, op, inverse move` with equal motion counts, returning
/// the motion and the middle instruction.
fn bracketed_by_motion(
    instrs: &[Instruction],
    index: usize,
) -> Option<(Instruction, Instruction)> {
    let window = instrs.get(index..index + 3)?;
    let (there, middle, back) = (window[0], window[1], window[2]);
    if !there.op.is_motion() || there.op.inverse() != Some(back.op) {
        return None;
    }
    if there.operand1 == 0 || there.operand1 != back.operand1 {
        return None;
    }
    Some((there, middle))
}

/// `>>+++<<` becomes `ADD 3 TO 2 RIGHT`.
fn fold_offset_arithmetic(instrs: &mut [Instruction], index: usize) -> bool {
    let (motion, arithmetic) = match bracketed_by_motion(instrs, index) {
        Some(found) => found,
        None => return false,
    };
    if !matches!(arithmetic.op, Add | Sub) || arithmetic.operand1 == 0 {
        return false;
    }

    match offset_variant(motion.op, arithmetic.op) {
        Some(op) => {
            instrs[index] = Instruction::at_offset(op, arithmetic.operand1, motion.operand1);
            erase(instrs, index + 1..index + 3);
            true
        }
        None => false,
    }
}

/// `<<` `SET k` `>>` becomes `SET k TO 2 LEFT`.
fn fold_offset_set(instrs: &mut [Instruction], index: usize) -> bool {
    let (motion, set) = match bracketed_by_motion(instrs, index) {
        Some(found) => found,
        None => return false,
    };
    if set.op != Set {
        return false;
    }

    match offset_variant(motion.op, Set) {
        Some(op) => {
            instrs[index] = Instruction::at_offset(op, set.operand1, motion.operand1);
            erase(instrs, index + 1..index + 3);
            true
        }
        None => false,
    }
}

/// Consecutive sets of the same cell: only the last one matters.
fn merge_sets(instrs: &mut [Instruction], index: usize) -> bool {
    let first = match instrs.get(index) {
        Some(&first) if first.op.is_set() => first,
        _ => return false,
    };

    let run = instrs[index..]
        .iter()
        .take_while(|instr| instr.op == first.op && instr.operand2 == first.operand2)
        .count();
    if run < 2 {
        return false;
    }

    instrs[index].operand1 = instrs[index + run - 1].operand1;
    erase(instrs, index + 1..index + run);
    true
}

/// `SET 0` followed by a loop: the loop can never run, so the whole
/// loop goes.
fn remove_unreachable_loop(instrs: &mut [Instruction], index: usize) -> bool {
    let (set, open) = match (instrs.get(index), instrs.get(index + 1)) {
        (Some(&set), Some(&open)) => (set, open),
        _ => return false,
    };
    if set.op != Set || set.operand1 != 0 || !open.op.is_open() {
        return false;
    }

    let open_index = index + 1;
    let close = match open.target() {
        Some(close) if close > open_index => close,
        _ => return false,
    };
    let closer = match instrs.get(close) {
        Some(&closer) => closer,
        None => return false,
    };
    if Some(closer.op) != open.op.partner() || closer.target() != Some(open_index) {
        return false;
    }

    erase(instrs, open_index..close + 1);
    true
}

/// Fold `+`/`-` into a preceding set of the same cell.
fn fold_into_set(instrs: &mut [Instruction], index: usize) -> bool {
    let (set, arithmetic) = match (instrs.get(index), instrs.get(index + 1)) {
        (Some(&set), Some(&arithmetic)) => (set, arithmetic),
        _ => return false,
    };
    let same_family = match set.op {
        Set => matches!(arithmetic.op, Add | Sub),
        SetLeft => matches!(arithmetic.op, AddLeft | SubLeft),
        SetRight => matches!(arithmetic.op, AddRight | SubRight),
        _ => false,
    };
    if !same_family || set.operand2 != arithmetic.operand2 {
        return false;
    }

    instrs[index].operand1 = wrap_cell(i64::from(set.operand1) + arithmetic.amount());
    instrs[index + 1] = Instruction::NOP;
    true
}

fn is_unit_decrement(instr: &Instruction) -> bool {
    instr.op == Sub && instr.operand1 == 1
}

/// Zero net motion, and the cell at offset 0 ends where it started.
fn is_neutral(instrs: &[Instruction], span: Range<usize>) -> bool {
    net_motion(instrs, span.clone()) == Some(0)
        && net_cell_delta(instrs, span, 0).map_or(false, |delta| delta.is_unchanged())
}

/// `[->+<]` and friends become `WHILE`/`END`, where the engine
/// decrements the loop cell itself on every iteration.
///
/// The rest of the body must have zero net motion and must leave the
/// loop cell unchanged. When the decrement is at the back of the body,
/// moving it to the front also requires that the body never looks at
/// the loop cell.
fn convert_safe_while(instrs: &mut [Instruction], index: usize) -> bool {
    let open = match instrs.get(index) {
        Some(&open) if open.op == JumpIfZero => open,
        _ => return false,
    };
    let close = match open.target() {
        Some(close) if close > index + 1 && close < instrs.len() => close,
        _ => return false,
    };
    if instrs[close].op != JumpIfNonZero || instrs[close].target() != Some(index) {
        return false;
    }

    let decrement = if is_unit_decrement(&instrs[index + 1])
        && is_neutral(instrs, index + 2..close)
    {
        index + 1
    } else if is_unit_decrement(&instrs[close - 1])
        && is_neutral(instrs, index + 1..close - 1)
        && !reads_cell(instrs, index + 1..close - 1, 0)
    {
        close - 1
    } else {
        return false;
    };

    instrs[decrement] = Instruction::NOP;
    instrs[index] = Instruction::new(While, close as u32);
    instrs[close] = Instruction::new(WhileEnd, index as u32);
    true
}
