use crate::bfir::Opcode::*;
use crate::bfir::{parse, Instruction, UNRESOLVED};
use crate::execution::execute;
use crate::flatten::check_links;
use crate::peephole::{optimize, OptimisationLevel, Rule};
use pretty_assertions::assert_eq;

fn optimized(source: &str) -> Vec<Instruction> {
    let (instrs, _) = parse(source.as_bytes());
    let (instrs, warnings) = optimize(instrs, OptimisationLevel::Minimal);
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    instrs
}

#[test]
fn no_optimisation_keeps_program() {
    let (instrs, _) = parse(b"+-[-]");
    let (result, warnings) = optimize(instrs.clone(), OptimisationLevel::None);
    assert_eq!(result, instrs);
    assert!(warnings.is_empty());
}

#[test]
fn default_level_keeps_program() {
    let (instrs, _) = parse(b"[-]>+<");
    let (result, _) = optimize(instrs.clone(), OptimisationLevel::default());
    assert_eq!(result, instrs);
}

#[test]
fn maximal_behaves_as_minimal() {
    let (instrs, _) = parse(b"++[->+<]>.");
    assert_eq!(
        optimize(instrs.clone(), OptimisationLevel::Maximal),
        optimize(instrs, OptimisationLevel::Minimal)
    );
}

#[test]
fn combine_inverse_increments() {
    assert_eq!(optimized("+-"), []);
    assert_eq!(optimized("++-"), [Instruction::new(Add, 1)]);
    assert_eq!(optimized("+---"), [Instruction::new(Sub, 2)]);
}

#[test]
fn combine_inverse_motion() {
    assert_eq!(optimized("<>>"), [Instruction::new(MoveRight, 1)]);
    assert_eq!(optimized("><"), []);
}

#[test]
fn combine_inverse_offset_arithmetic() {
    let mut instrs = [
        Instruction::at_offset(AddLeft, 3, 2),
        Instruction::at_offset(SubLeft, 5, 2),
    ];
    assert!(Rule::InverseFold.try_apply(&mut instrs, 0));
    assert_eq!(
        instrs,
        [Instruction::at_offset(SubLeft, 2, 2), Instruction::NOP]
    );
}

#[test]
fn inverse_needs_same_offset() {
    let mut instrs = [
        Instruction::at_offset(AddLeft, 3, 2),
        Instruction::at_offset(SubLeft, 5, 1),
    ];
    assert!(!Rule::InverseFold.try_apply(&mut instrs, 0));
}

#[test]
fn merge_adjacent_aggregatable() {
    let mut instrs = [Instruction::new(Add, 3), Instruction::new(Add, 4)];
    assert!(Rule::InverseFold.try_apply(&mut instrs, 0));
    assert_eq!(instrs, [Instruction::new(Add, 7), Instruction::NOP]);
}

#[test]
fn prints_are_not_merged() {
    assert_eq!(
        optimized(".."),
        [Instruction::new(Print, 1), Instruction::new(Print, 1)]
    );
}

#[test]
fn constant_set_zero() {
    assert_eq!(optimized("[-]"), [Instruction::new(Set, 0)]);
    assert_eq!(optimized("[+]"), [Instruction::new(Set, 0)]);
}

#[test]
fn constant_set_folds_following_increment() {
    assert_eq!(optimized("[-]+++"), [Instruction::new(Set, 3)]);
}

#[test]
fn constant_set_folds_following_decrement() {
    assert_eq!(optimized("[-]---"), [Instruction::new(Set, 253)]);
}

#[test]
fn constant_set_needs_unit_step() {
    let (instrs, _) = parse(b"[--]");
    let mut window = instrs.clone();
    assert!(!Rule::ConstantSet.try_apply(&mut window, 0));
    assert_eq!(window, instrs);
}

#[test]
fn offset_increment() {
    assert_eq!(
        optimized(">>+++<<"),
        [Instruction::at_offset(AddRight, 3, 2)]
    );
}

#[test]
fn offset_increment_needs_equal_motion() {
    let (instrs, _) = parse(b">>+<");
    assert_eq!(optimized(">>+<"), instrs);
}

#[test]
fn offset_set() {
    assert_eq!(
        optimized("<<[-]>>"),
        [Instruction::at_offset(SetLeft, 0, 2)]
    );
}

#[test]
fn merge_consecutive_sets() {
    assert_eq!(optimized("[-]+[-]++"), [Instruction::new(Set, 2)]);
}

#[test]
fn merge_sets_keeps_distinct_offsets() {
    let mut instrs = [
        Instruction::at_offset(SetRight, 1, 1),
        Instruction::at_offset(SetRight, 2, 3),
    ];
    assert!(!Rule::MergeSets.try_apply(&mut instrs, 0));
}

#[test]
fn set_zero_removes_following_loop() {
    assert_eq!(optimized("[-][>+<-]"), [Instruction::new(Set, 0)]);
    assert_eq!(
        optimized("[-][.[,]]."),
        [Instruction::new(Set, 0), Instruction::new(Print, 1)]
    );
}

#[test]
fn nonzero_set_keeps_following_loop() {
    let result = optimized("[-]+[.-]");
    assert_eq!(result[0], Instruction::new(Set, 1));
    assert_eq!(result[1].op, JumpIfZero);
    assert!(check_links(&result).is_empty());
}

#[test]
fn fold_increment_into_offset_set() {
    assert_eq!(
        optimized(">[-]<>+<"),
        [Instruction::at_offset(SetRight, 1, 1)]
    );
}

#[test]
fn fold_decrement_into_set() {
    let mut instrs = [Instruction::new(Set, 1), Instruction::new(Sub, 3)];
    assert!(Rule::FoldIntoSet.try_apply(&mut instrs, 0));
    assert_eq!(instrs, [Instruction::new(Set, 254), Instruction::NOP]);
}

#[test]
fn fold_into_set_needs_same_cell() {
    let mut instrs = [
        Instruction::at_offset(SetLeft, 1, 2),
        Instruction::at_offset(AddRight, 3, 2),
    ];
    assert!(!Rule::FoldIntoSet.try_apply(&mut instrs, 0));
}

#[test]
fn safe_while_with_front_decrement() {
    assert_eq!(
        optimized("[->+<]"),
        [
            Instruction::new(While, 2),
            Instruction::at_offset(AddRight, 1, 1),
            Instruction::new(WhileEnd, 0),
        ]
    );
}

#[test]
fn safe_while_with_back_decrement() {
    assert_eq!(
        optimized("[>+<-]"),
        [
            Instruction::new(While, 2),
            Instruction::at_offset(AddRight, 1, 1),
            Instruction::new(WhileEnd, 0),
        ]
    );
}

#[test]
fn safe_while_front_decrement_may_print() {
    assert_eq!(
        optimized("[-.]"),
        [
            Instruction::new(While, 2),
            Instruction::new(Print, 1),
            Instruction::new(WhileEnd, 0),
        ]
    );
}

#[test]
fn safe_while_back_decrement_must_not_read_cell() {
    let (instrs, _) = parse(b"[.-]");
    assert_eq!(optimized("[.-]"), instrs);
}

#[test]
fn safe_while_rejects_motion() {
    let (instrs, _) = parse(b"[->]");
    assert_eq!(optimized("[->]"), instrs);
}

#[test]
fn safe_while_rejects_change_to_loop_cell() {
    assert_eq!(
        optimized("[->+<+]"),
        [
            Instruction::new(JumpIfZero, 4),
            Instruction::new(Sub, 1),
            Instruction::at_offset(AddRight, 1, 1),
            Instruction::new(Add, 1),
            Instruction::new(JumpIfNonZero, 0),
        ]
    );
}

#[test]
fn unresolved_open_is_left_alone() {
    assert_eq!(
        optimized("+[-"),
        [
            Instruction::new(Add, 1),
            Instruction::new(JumpIfZero, UNRESOLVED),
            Instruction::new(Sub, 1),
        ]
    );
}

#[test]
fn optimize_is_idempotent_on_sample() {
    let once = optimized(HELLO_WORLD);
    let (twice, _) = optimize(once.clone(), OptimisationLevel::Minimal);
    assert_eq!(once, twice);
}

#[test]
fn optimized_program_has_consistent_links() {
    let result = optimized(HELLO_WORLD);
    assert!(result.iter().all(|instr| instr.op != Nop));
    assert!(check_links(&result).is_empty());
}

#[test]
fn optimize_preserves_hello_world() {
    let (instrs, _) = parse(HELLO_WORLD.as_bytes());
    let (plain, fault) = execute(&instrs, b"");
    assert_eq!(fault, None);
    assert_eq!(plain, b"Hello World!\n".to_vec());

    let (fast, fault) = execute(&optimized(HELLO_WORLD), b"");
    assert_eq!(fault, None);
    assert_eq!(fast, plain);
}

#[test]
fn optimize_preserves_copy_loop() {
    // Copy cell 0 into cells 1 and 2, then restore cell 0 from 2.
    let source = ",[->+>+<<]>>[-<<+>>]<<.>.";
    let (instrs, _) = parse(source.as_bytes());
    assert_eq!(execute(&instrs, b"A"), execute(&optimized(source), b"A"));
    assert_eq!(execute(&optimized(source), b"A").0, b"AA".to_vec());
}

#[test]
fn optimize_shrinks_program() {
    let (instrs, _) = parse(HELLO_WORLD.as_bytes());
    assert!(optimized(HELLO_WORLD).len() < instrs.len());
}

const HELLO_WORLD: &str = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
