//! Compaction of the no-op holes left behind by the optimiser.

use crate::bfir::{Instruction, Opcode, UNRESOLVED};
use crate::diagnostics::Warning;
use tracing::warn;

#[cfg(test)]
use crate::bfir::Opcode::*;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// Remove every `Nop` and retarget jumps to the new indices. Returns
/// a warning for each jump that no longer designates a partner which
/// links back to it.
pub fn flatten(instrs: &mut Vec<Instruction>) -> Vec<Warning> {
    if instrs.iter().all(|instr| instr.op != Opcode::Nop) {
        return vec![];
    }

    // new_index[old] is where the instruction at `old` (or the first
    // survivor after it) lands.
    let mut new_index = Vec::with_capacity(instrs.len() + 1);
    let mut survivors: u32 = 0;
    for instr in instrs.iter() {
        new_index.push(survivors);
        if instr.op != Opcode::Nop {
            survivors += 1;
        }
    }
    new_index.push(survivors);

    instrs.retain(|instr| instr.op != Opcode::Nop);
    for instr in instrs.iter_mut() {
        if instr.op.is_jump() && instr.operand1 != UNRESOLVED {
            let old = (instr.operand1 as usize).min(new_index.len() - 1);
            instr.operand1 = new_index[old];
        }
    }

    check_links(instrs)
}

/// Every resolved jump must designate its partner, and the partner
/// must point back.
pub fn check_links(instrs: &[Instruction]) -> Vec<Warning> {
    let mut warnings = vec![];
    for (index, instr) in instrs.iter().enumerate() {
        let target = match (instr.op.partner(), instr.target()) {
            (Some(_), Some(target)) => target,
            _ => continue,
        };
        let linked = instrs.get(target).map_or(false, |partner| {
            Some(partner.op) == instr.op.partner() && partner.target() == Some(index)
        });
        if !linked {
            warn!(index, target, op = ?instr.op, "jump target lost its partner");
            warnings.push(Warning::new(format!(
                "Instruction {} ({}) no longer has a matching partner at {}",
                index, instr, target
            )));
        }
    }
    warnings
}

#[test]
fn flatten_removes_nops_and_repairs_links() {
    let mut instrs = vec![
        Instruction::NOP,
        Instruction::new(Add, 1),
        Instruction::new(JumpIfZero, 5),
        Instruction::NOP,
        Instruction::new(Sub, 1),
        Instruction::new(JumpIfNonZero, 2),
        Instruction::NOP,
        Instruction::new(Print, 1),
    ];
    let warnings = flatten(&mut instrs);
    assert!(warnings.is_empty());
    assert_eq!(
        instrs,
        vec![
            Instruction::new(Add, 1),
            Instruction::new(JumpIfZero, 3),
            Instruction::new(Sub, 1),
            Instruction::new(JumpIfNonZero, 1),
            Instruction::new(Print, 1),
        ]
    );
}

#[test]
fn flatten_repairs_while_links() {
    let mut instrs = vec![
        Instruction::new(While, 3),
        Instruction::NOP,
        Instruction::at_offset(AddRight, 1, 2),
        Instruction::new(WhileEnd, 0),
    ];
    assert!(flatten(&mut instrs).is_empty());
    assert_eq!(
        instrs,
        vec![
            Instruction::new(While, 2),
            Instruction::at_offset(AddRight, 1, 2),
            Instruction::new(WhileEnd, 0),
        ]
    );
}

#[test]
fn flatten_keeps_unresolved_opens() {
    let mut instrs = vec![
        Instruction::NOP,
        Instruction::new(JumpIfZero, UNRESOLVED),
        Instruction::new(Add, 1),
    ];
    assert!(flatten(&mut instrs).is_empty());
    assert_eq!(instrs[0], Instruction::new(JumpIfZero, UNRESOLVED));
}

#[test]
fn flatten_reports_orphaned_close() {
    let mut instrs = vec![
        Instruction::new(Add, 1),
        Instruction::NOP,
        Instruction::new(Print, 1),
        Instruction::new(JumpIfNonZero, 1),
    ];
    let warnings = flatten(&mut instrs);
    assert_eq!(warnings.len(), 1);
    assert_eq!(instrs.len(), 3);
}

#[test]
fn flatten_without_nops_is_untouched() {
    let mut instrs = vec![Instruction::new(Add, 1), Instruction::new(Print, 1)];
    let before = instrs.clone();
    assert!(flatten(&mut instrs).is_empty());
    assert_eq!(instrs, before);
}
