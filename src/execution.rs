//! Interpretation of a flat BF program.

use crate::bfir::Opcode::*;
use crate::bfir::{Cell, Instruction};
use bitflags::bitflags;
use std::io::{self, Read, Write};
use std::num::Wrapping;
use thiserror::Error;
use tracing::trace;

#[cfg(test)]
use crate::bfir::parse;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// Cells available when no size is requested, and the amount a
/// growable band is extended by past the faulting address.
pub const DEFAULT_MEMORY_LENGTH: usize = 30_000;

bitflags! {
    pub struct MemoryFlags: u8 {
        /// Accesses past the end zero-extend the band instead of
        /// faulting.
        const GROWABLE = 0b0000_0001;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("memory access out of bounds (ip: {ip}, dp: {dp}, address: {address}, size: {len})")]
    OutOfBounds {
        ip: usize,
        dp: i64,
        address: i64,
        len: usize,
    },
    #[error("failed to write output (ip: {ip}): {kind:?}")]
    Output { ip: usize, kind: io::ErrorKind },
    #[error("failed to read input (ip: {ip}): {kind:?}")]
    Input { ip: usize, kind: io::ErrorKind },
}

/// How a bounded run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(u64),
    Faulted(u64, ExecutionError),
    OutOfSteps(u64),
}

/// One execution of a program. The engine owns its memory band; the
/// program is only borrowed.
pub struct Engine<'p, R, W> {
    program: &'p [Instruction],
    ip: usize,
    dp: i64,
    memory: Vec<Cell>,
    flags: MemoryFlags,
    fault: Option<ExecutionError>,
    steps: u64,
    input: R,
    output: W,
}

impl<'p, R: Read, W: Write> Engine<'p, R, W> {
    /// A fixed band of `DEFAULT_MEMORY_LENGTH` cells.
    pub fn new(program: &'p [Instruction], input: R, output: W) -> Self {
        Engine::with_memory(
            program,
            DEFAULT_MEMORY_LENGTH,
            MemoryFlags::empty(),
            input,
            output,
        )
    }

    pub fn with_memory(
        program: &'p [Instruction],
        length: usize,
        flags: MemoryFlags,
        input: R,
        output: W,
    ) -> Self {
        Engine {
            program,
            ip: 0,
            dp: 0,
            memory: vec![Wrapping(0); length],
            flags,
            fault: None,
            steps: 0,
            input,
            output,
        }
    }

    /// Start with the data pointer at `dp` instead of cell 0.
    pub fn starting_at(mut self, dp: usize) -> Self {
        self.dp = dp as i64;
        self
    }

    pub fn data_pointer(&self) -> i64 {
        self.dp
    }

    pub fn memory(&self) -> &[Cell] {
        &self.memory
    }

    pub fn fault(&self) -> Option<&ExecutionError> {
        self.fault.as_ref()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn is_running(&self) -> bool {
        self.fault.is_none() && self.ip < self.program.len()
    }

    /// Run until the program ends or faults. Returns the number of
    /// instructions executed.
    pub fn run(&mut self) -> u64 {
        while self.is_running() {
            self.step();
        }
        self.finish();
        self.steps
    }

    /// Like `run`, but give up after `max_steps` instructions.
    pub fn run_bounded(&mut self, max_steps: u64) -> Outcome {
        while self.is_running() {
            if self.steps >= max_steps {
                self.finish();
                return Outcome::OutOfSteps(self.steps);
            }
            self.step();
        }
        self.finish();

        match self.fault {
            Some(ref error) => Outcome::Faulted(self.steps, error.clone()),
            None => Outcome::Completed(self.steps),
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.output.flush() {
            self.raise(ExecutionError::Output {
                ip: self.ip,
                kind: e.kind(),
            });
        }
    }

    fn raise(&mut self, error: ExecutionError) {
        trace!(%error, steps = self.steps, "execution fault");
        if self.fault.is_none() {
            self.fault = Some(error);
        }
    }

    /// The band index for the cell `offset` away from the data
    /// pointer, growing the band if allowed.
    fn address(&mut self, offset: i64) -> Option<usize> {
        let address = self.dp.wrapping_add(offset);
        if address >= 0 {
            let index = address as usize;
            if index < self.memory.len() {
                return Some(index);
            }
            if self.flags.contains(MemoryFlags::GROWABLE) {
                self.memory
                    .resize(index.saturating_add(DEFAULT_MEMORY_LENGTH), Wrapping(0));
                return Some(index);
            }
        }

        self.raise(ExecutionError::OutOfBounds {
            ip: self.ip,
            dp: self.dp,
            address,
            len: self.memory.len(),
        });
        None
    }

    fn read(&mut self, offset: i64) -> Cell {
        match self.address(offset) {
            Some(index) => self.memory[index],
            None => Wrapping(0),
        }
    }

    fn update(&mut self, offset: i64, f: impl FnOnce(Cell) -> Cell) {
        if let Some(index) = self.address(offset) {
            self.memory[index] = f(self.memory[index]);
        }
    }

    fn read_input(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.raise(ExecutionError::Input {
                        ip: self.ip,
                        kind: e.kind(),
                    });
                    return None;
                }
            }
        }
    }

    /// Continue after the instruction at `target`. An unresolved jump
    /// leaves the program.
    fn jump_past(&mut self, target: Option<usize>) {
        self.ip = match target {
            Some(target) => target.saturating_add(1),
            None => self.program.len(),
        };
    }

    /// Execute the instruction under the instruction pointer.
    fn step(&mut self) {
        let instr = self.program[self.ip];
        self.steps += 1;
        let mut next = Some(self.ip + 1);

        match instr.op {
            Nop => {}
            MoveLeft | MoveRight => self.dp = self.dp.wrapping_add(instr.amount()),
            Add | Sub | AddLeft | AddRight | SubLeft | SubRight => {
                let amount = Wrapping(instr.amount().rem_euclid(256) as u8);
                self.update(instr.offset(), |cell| cell + amount);
            }
            Set | SetLeft | SetRight => {
                let value = Wrapping(instr.operand1 as u8);
                self.update(instr.offset(), |_| value);
            }
            Print => {
                let cell = self.read(0);
                if self.fault.is_none() {
                    if let Err(e) = self.output.write_all(&[cell.0]) {
                        self.raise(ExecutionError::Output {
                            ip: self.ip,
                            kind: e.kind(),
                        });
                    }
                }
            }
            Input => {
                if let Some(byte) = self.read_input() {
                    self.update(0, |_| Wrapping(byte));
                }
            }
            JumpIfZero => {
                if self.read(0).0 == 0 {
                    self.jump_past(instr.target());
                    next = None;
                }
            }
            JumpIfNonZero => {
                if self.read(0).0 != 0 {
                    self.jump_past(instr.target());
                    next = None;
                }
            }
            While => {
                if self.read(0).0 == 0 {
                    self.jump_past(instr.target());
                    next = None;
                } else {
                    self.update(0, |cell| cell - Wrapping(1));
                }
            }
            WhileEnd => {
                if self.read(0).0 != 0 {
                    self.ip = instr.target().unwrap_or(self.program.len());
                    next = None;
                }
            }
        }

        if let Some(next) = next {
            self.ip = next;
        }
    }
}

/// Run `program` on a fixed default band, reading `input` and
/// collecting everything it prints.
pub fn execute(program: &[Instruction], input: &[u8]) -> (Vec<u8>, Option<ExecutionError>) {
    let mut engine = Engine::new(program, input, vec![]);
    engine.run();
    let fault = engine.fault().cloned();
    (engine.into_output(), fault)
}

#[cfg(test)]
fn run_source(source: &str, input: &[u8]) -> (Vec<u8>, Option<ExecutionError>) {
    let (program, _) = parse(source.as_bytes());
    execute(&program, input)
}

#[test]
fn prints_cell_value() {
    let (output, fault) = run_source("++++++++[>++++++++<-]>+.", b"");
    assert_eq!(output, b"A".to_vec());
    assert_eq!(fault, None);
}

#[test]
fn echo_until_input_exhausted() {
    let (output, _) = run_source(",.,.,.", b"hi");
    // The third read leaves the cell holding 'i'.
    assert_eq!(output, b"hii".to_vec());
}

#[test]
fn counts_steps() {
    let (program, _) = parse(b"++[-]");
    let mut engine = Engine::new(&program, &b""[..], vec![]);
    // ADD, JZ, then SUB and JNZ once per iteration.
    assert_eq!(engine.run(), 6);
}

#[test]
fn fixed_band_faults_past_end() {
    let program = [
        Instruction::new(MoveRight, 5),
        Instruction::new(Add, 1),
        Instruction::new(Print, 1),
    ];
    let mut engine = Engine::with_memory(&program, 4, MemoryFlags::empty(), &b""[..], vec![]);
    let steps = engine.run();
    assert_eq!(steps, 2);
    assert_eq!(
        engine.fault(),
        Some(&ExecutionError::OutOfBounds {
            ip: 1,
            dp: 5,
            address: 5,
            len: 4
        })
    );
    assert!(engine.output().is_empty());
}

#[test]
fn loop_test_past_end_faults() {
    let (program, _) = parse(b">>>[");
    let mut engine = Engine::with_memory(&program, 2, MemoryFlags::empty(), &b""[..], vec![]);
    assert_eq!(
        engine.run_bounded(10),
        Outcome::Faulted(
            2,
            ExecutionError::OutOfBounds {
                ip: 1,
                dp: 3,
                address: 3,
                len: 2
            }
        )
    );
}

#[test]
fn print_past_end_faults_without_output() {
    let (program, _) = parse(b">>.");
    let mut engine = Engine::with_memory(&program, 2, MemoryFlags::empty(), &b""[..], vec![]);
    assert_eq!(engine.run(), 2);
    assert!(matches!(
        engine.fault(),
        Some(ExecutionError::OutOfBounds { address: 2, .. })
    ));
    assert!(engine.output().is_empty());
}

#[test]
fn negative_address_faults() {
    let (_, fault) = run_source("<+", b"");
    assert!(matches!(
        fault,
        Some(ExecutionError::OutOfBounds { address: -1, .. })
    ));
}

#[test]
fn growable_band_extends() {
    let program = [
        Instruction::at_offset(SetRight, 42, 10),
        Instruction::new(MoveRight, 10),
        Instruction::new(Print, 1),
    ];
    let mut engine = Engine::with_memory(&program, 4, MemoryFlags::GROWABLE, &b""[..], vec![]);
    assert_eq!(engine.run_bounded(100), Outcome::Completed(3));
    assert_eq!(*engine.output(), vec![42u8]);
    assert!(engine.memory().len() > 10);
}

#[test]
fn offset_arithmetic_uses_current_pointer() {
    let program = [
        Instruction::new(MoveRight, 3),
        Instruction::at_offset(AddLeft, 5, 2),
        Instruction::at_offset(SubRight, 1, 1),
        Instruction::at_offset(SetLeft, 9, 3),
    ];
    let mut engine = Engine::new(&program, &b""[..], vec![]);
    engine.run();
    assert_eq!(engine.memory()[0], Wrapping(9));
    assert_eq!(engine.memory()[1], Wrapping(5));
    assert_eq!(engine.memory()[4], Wrapping(255));
    assert_eq!(engine.data_pointer(), 3);
}

#[test]
fn while_loop_decrements_implicitly() {
    // SET 3, WHILE { ADD 2 TO 1 RIGHT } END
    let program = [
        Instruction::new(Set, 3),
        Instruction::new(While, 3),
        Instruction::at_offset(AddRight, 2, 1),
        Instruction::new(WhileEnd, 1),
    ];
    let mut engine = Engine::new(&program, &b""[..], vec![]);
    engine.run();
    assert_eq!(engine.memory()[0], Wrapping(0));
    assert_eq!(engine.memory()[1], Wrapping(6));
}

#[test]
fn while_loop_skipped_on_zero() {
    let program = [
        Instruction::new(While, 2),
        Instruction::new(Add, 1),
        Instruction::new(WhileEnd, 0),
        Instruction::new(Print, 1),
    ];
    let (output, fault) = execute(&program, b"");
    assert_eq!(output, vec![0]);
    assert_eq!(fault, None);
}

#[test]
fn unresolved_open_ends_program() {
    let (output, fault) = run_source(".[.", b"");
    assert_eq!(output, vec![0]);
    assert_eq!(fault, None);
}

#[test]
fn bounded_run_stops() {
    let (program, _) = parse(b"+[]");
    let mut engine = Engine::new(&program, &b""[..], vec![]);
    assert_eq!(engine.run_bounded(50), Outcome::OutOfSteps(50));
}

#[test]
fn starting_pointer() {
    let (program, _) = parse(b"<<+");
    let mut engine = Engine::new(&program, &b""[..], vec![]).starting_at(2);
    engine.run();
    assert_eq!(engine.fault(), None);
    assert_eq!(engine.memory()[0], Wrapping(1));
}
