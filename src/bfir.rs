//! bfir defines the flat instruction stream for BF. Loops are not
//! nested nodes: a loop is a pair of jump instructions that hold each
//! other's index, so the optimizer can rewrite the stream in place.
//!
//! It also provides the loader that builds a stream from source code,
//! and the one-way textual rendering used for diagnostics.

use self::Opcode::*;
use crate::diagnostics::Warning;
use itertools::Itertools;
use std::fmt;
use std::io::{self, Read};
use std::num::Wrapping;
use tracing::debug;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A cell is the fundamental BF datatype that we work with. BF
/// requires this to be at least one byte, we provide a cell of
/// exactly one byte.
pub type Cell = Wrapping<u8>;

/// Jump target of a `[` whose `]` never appeared.
pub const UNRESOLVED: u32 = u32::MAX;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Opcode {
    Nop,
    MoveLeft,
    MoveRight,
    Add,
    Sub,
    Print,
    Input,
    JumpIfZero,
    JumpIfNonZero,
    /// These opcodes have no direct equivalent in BF, but we
    /// generate them during optimisation.
    Set,
    AddLeft,
    AddRight,
    SubLeft,
    SubRight,
    SetLeft,
    SetRight,
    While,
    WhileEnd,
}

impl Opcode {
    /// Repeated adjacent occurrences merge into one instruction with
    /// a summed count.
    pub fn is_aggregatable(self) -> bool {
        matches!(self, MoveLeft | MoveRight | Add | Sub)
    }

    pub fn is_motion(self) -> bool {
        matches!(self, MoveLeft | MoveRight)
    }

    /// Add or subtract, on the current cell or at an offset.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Add | Sub | AddLeft | AddRight | SubLeft | SubRight)
    }

    pub fn is_set(self) -> bool {
        matches!(self, Set | SetLeft | SetRight)
    }

    pub fn is_jump(self) -> bool {
        matches!(self, JumpIfZero | JumpIfNonZero | While | WhileEnd)
    }

    pub fn is_open(self) -> bool {
        matches!(self, JumpIfZero | While)
    }

    /// The opcode that undoes this one, if any.
    pub fn inverse(self) -> Option<Opcode> {
        match self {
            Add => Some(Sub),
            Sub => Some(Add),
            MoveLeft => Some(MoveRight),
            MoveRight => Some(MoveLeft),
            AddLeft => Some(SubLeft),
            SubLeft => Some(AddLeft),
            AddRight => Some(SubRight),
            SubRight => Some(AddRight),
            _ => None,
        }
    }

    /// The opcode at the other end of a bracket pair.
    pub fn partner(self) -> Option<Opcode> {
        match self {
            JumpIfZero => Some(JumpIfNonZero),
            JumpIfNonZero => Some(JumpIfZero),
            While => Some(WhileEnd),
            WhileEnd => Some(While),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub operand1: u32,
    pub operand2: u32,
}

impl Instruction {
    pub const NOP: Instruction = Instruction {
        op: Nop,
        operand1: 0,
        operand2: 0,
    };

    pub fn new(op: Opcode, operand1: u32) -> Self {
        Instruction {
            op,
            operand1,
            operand2: 0,
        }
    }

    pub fn at_offset(op: Opcode, operand1: u32, operand2: u32) -> Self {
        Instruction {
            op,
            operand1,
            operand2,
        }
    }

    /// Signed distance from the data pointer to the cell this
    /// instruction touches.
    pub fn offset(&self) -> i64 {
        match self.op {
            AddLeft | SubLeft | SetLeft => -i64::from(self.operand2),
            AddRight | SubRight | SetRight => i64::from(self.operand2),
            _ => 0,
        }
    }

    /// Signed change applied to the addressed cell by an arithmetic
    /// instruction, or to the data pointer by a motion.
    pub fn amount(&self) -> i64 {
        match self.op {
            Add | AddLeft | AddRight | MoveRight => i64::from(self.operand1),
            Sub | SubLeft | SubRight | MoveLeft => -i64::from(self.operand1),
            _ => 0,
        }
    }

    /// The index this jump designates, or `None` for an unresolved
    /// open.
    pub fn target(&self) -> Option<usize> {
        if self.operand1 == UNRESOLVED {
            None
        } else {
            Some(self.operand1 as usize)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (n, m) = (self.operand1, self.operand2);
        match self.op {
            Nop => write!(f, "NOP"),
            MoveLeft => write!(f, "MOVE {} LEFT", n),
            MoveRight => write!(f, "MOVE {} RIGHT", n),
            Add => write!(f, "ADD {}", n),
            Sub => write!(f, "SUB {}", n),
            Print => write!(f, "PRINT"),
            Input => write!(f, "INPUT"),
            JumpIfZero => write!(f, "JZ {}", n),
            JumpIfNonZero => write!(f, "JNZ {}", n),
            Set => write!(f, "SET {}", n),
            AddLeft => write!(f, "ADD {} TO {} LEFT", n, m),
            AddRight => write!(f, "ADD {} TO {} RIGHT", n, m),
            SubLeft => write!(f, "SUB {} TO {} LEFT", n, m),
            SubRight => write!(f, "SUB {} TO {} RIGHT", n, m),
            SetLeft => write!(f, "SET {} TO {} LEFT", n, m),
            SetRight => write!(f, "SET {} TO {} RIGHT", n, m),
            While => write!(f, "WHILE {}", n),
            WhileEnd => write!(f, "END {}", n),
        }
    }
}

/// Render a program one instruction per line. The output is meant
/// for humans and is never parsed back.
pub fn render(instrs: &[Instruction]) -> String {
    if instrs.is_empty() {
        return String::new();
    }
    format!("{}\n", instrs.iter().join("\n"))
}

/// Builds a program one source symbol at a time.
struct Loader {
    instrs: Vec<Instruction>,
    open_loops: Vec<usize>,
    warnings: Vec<Warning>,
}

impl Loader {
    fn new() -> Self {
        Loader {
            instrs: vec![],
            open_loops: vec![],
            warnings: vec![],
        }
    }

    fn insert(&mut self, op: Opcode, byte_offset: usize) {
        if op.is_aggregatable() {
            if let Some(last) = self.instrs.last_mut() {
                if last.op == op {
                    last.operand1 = last.operand1.wrapping_add(1);
                    return;
                }
            }
        }

        match op {
            JumpIfZero => {
                self.open_loops.push(self.instrs.len());
                self.instrs.push(Instruction::new(JumpIfZero, UNRESOLVED));
            }
            JumpIfNonZero => match self.open_loops.pop() {
                Some(open) => {
                    let close = self.instrs.len();
                    self.instrs[open].operand1 = close as u32;
                    self.instrs
                        .push(Instruction::new(JumpIfNonZero, open as u32));
                }
                None => {
                    debug!(byte = byte_offset, "unmatched ] discarded");
                    self.warnings
                        .push(Warning::at("This ] has no matching [", byte_offset));
                }
            },
            _ => self.instrs.push(Instruction::new(op, 1)),
        }
    }

    fn feed(&mut self, offset: usize, byte: u8) {
        let op = match byte {
            b'<' => MoveLeft,
            b'>' => MoveRight,
            b'+' => Add,
            b'-' => Sub,
            b'.' => Print,
            b',' => Input,
            b'[' => JumpIfZero,
            b']' => JumpIfNonZero,
            _ => return,
        };
        self.insert(op, offset);
    }

    fn finish(self) -> (Vec<Instruction>, Vec<Warning>) {
        (self.instrs, self.warnings)
    }
}

/// Given BF source code, return the initial instruction stream and
/// any warnings. An unmatched `]` is reported and dropped; an
/// unmatched `[` keeps an `UNRESOLVED` target.
pub fn parse(source: &[u8]) -> (Vec<Instruction>, Vec<Warning>) {
    let mut loader = Loader::new();
    for (offset, &byte) in source.iter().enumerate() {
        loader.feed(offset, byte);
    }
    loader.finish()
}

/// Like `parse`, but reads the source from a stream.
pub fn load<R: Read>(reader: R) -> io::Result<(Vec<Instruction>, Vec<Warning>)> {
    let mut loader = Loader::new();
    for (offset, byte) in reader.bytes().enumerate() {
        loader.feed(offset, byte?);
    }
    Ok(loader.finish())
}

#[cfg(test)]
fn instrs(source: &str) -> Vec<Instruction> {
    parse(source.as_bytes()).0
}

#[test]
fn parse_increment() {
    assert_eq!(instrs("+"), [Instruction::new(Add, 1)]);
    assert_eq!(instrs("+++"), [Instruction::new(Add, 3)]);
}

#[test]
fn parse_decrement() {
    assert_eq!(instrs("--"), [Instruction::new(Sub, 2)]);
}

#[test]
fn parse_pointer_motion() {
    assert_eq!(
        instrs(">><"),
        [
            Instruction::new(MoveRight, 2),
            Instruction::new(MoveLeft, 1),
        ]
    );
}

#[test]
fn parse_io_is_not_aggregated() {
    assert_eq!(
        instrs("..,"),
        [
            Instruction::new(Print, 1),
            Instruction::new(Print, 1),
            Instruction::new(Input, 1)
        ]
    );
}

#[test]
fn parse_empty_loop() {
    assert_eq!(
        instrs("[]"),
        [
            Instruction::new(JumpIfZero, 1),
            Instruction::new(JumpIfNonZero, 0)
        ]
    );
}

#[test]
fn parse_nested_loop_links() {
    let program = instrs("+[>[-]<]");
    assert_eq!(
        program,
        [
            Instruction::new(Add, 1),
            Instruction::new(JumpIfZero, 7),
            Instruction::new(MoveRight, 1),
            Instruction::new(JumpIfZero, 5),
            Instruction::new(Sub, 1),
            Instruction::new(JumpIfNonZero, 3),
            Instruction::new(MoveLeft, 1),
            Instruction::new(JumpIfNonZero, 1),
        ]
    );
}

#[test]
fn parse_aggregation_stops_at_loops() {
    assert_eq!(
        instrs("+[]+"),
        [
            Instruction::new(Add, 1),
            Instruction::new(JumpIfZero, 2),
            Instruction::new(JumpIfNonZero, 1),
            Instruction::new(Add, 1),
        ]
    );
}

#[test]
fn parse_unmatched_close_is_dropped() {
    let (program, warnings) = parse(b"+]+");
    assert_eq!(program, [Instruction::new(Add, 2)]);
    assert_eq!(warnings, [Warning::at("This ] has no matching [", 1)]);
}

#[test]
fn parse_unmatched_open_is_tolerated() {
    let (program, warnings) = parse(b"[[]");
    assert!(warnings.is_empty());
    assert_eq!(
        program,
        [
            Instruction::new(JumpIfZero, UNRESOLVED),
            Instruction::new(JumpIfZero, 2),
            Instruction::new(JumpIfNonZero, 1),
        ]
    );
}

#[test]
fn parse_comment() {
    assert_eq!(instrs("foo! "), []);
}

#[test]
fn load_from_reader() {
    let (program, _) = load(&b"hello +- world"[..]).unwrap();
    assert_eq!(
        program,
        [Instruction::new(Add, 1), Instruction::new(Sub, 1)]
    );
}

#[test]
fn render_templates() {
    let program = [
        Instruction::new(MoveLeft, 3),
        Instruction::new(JumpIfZero, 4),
        Instruction::new(Set, 7),
        Instruction::at_offset(SubRight, 2, 5),
        Instruction::new(JumpIfNonZero, 1),
        Instruction::new(WhileEnd, 0),
    ];
    assert_eq!(
        render(&program),
        "MOVE 3 LEFT\nJZ 4\nSET 7\nSUB 2 TO 5 RIGHT\nJNZ 1\nEND 0\n"
    );
}

#[test]
fn offset_and_amount() {
    assert_eq!(Instruction::at_offset(SetLeft, 9, 4).offset(), -4);
    assert_eq!(Instruction::at_offset(AddRight, 9, 4).offset(), 4);
    assert_eq!(Instruction::at_offset(SubLeft, 9, 4).amount(), -9);
    assert_eq!(Instruction::new(MoveLeft, 2).amount(), -2);
}
