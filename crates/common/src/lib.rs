use std::collections::HashMap;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use once_cell::sync::Lazy;
use strum::{Display, EnumIter};
use thiserror::Error;

pub mod alu;
pub mod cpu;
pub mod image;
pub mod machine;

pub use cpu::{Cpu, HaltReason, HostIO, StdHostIO};
pub use image::{LoadError, ProgramImage};
pub use machine::{Flag, Machine, Memory, Registers};

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;
/// Register whose value is used as the stack address.
pub const STACK_POINTER: u8 = 7;
/// Largest memory an 8-bit address can reach.
pub const MAX_MEMORY_SIZE: usize = 256;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Trying to access invalid memory location (@{:#04x}/@{})", .0, .0)]
    InvalidMemoryLocation(usize),
    #[error("Trying to access invalid register R{0}")]
    InvalidRegister(u8),
    #[error("Stack Overflow")]
    StackOverflow,
    #[error("Stack Underflow")]
    StackUnderflow,
    #[error("Unsupported ALU operation: {0}")]
    UnsupportedOperation(Bytecode),
    #[error("Invalid Opcode: {:#010b} at (@{:#04x}/@{})", .0, .1, .1)]
    InvalidOpcode(u8, usize),
    #[error("Program of {len} bytes does not fit into {capacity} bytes of memory")]
    ProgramTooLarge { len: usize, capacity: usize },
    #[error("Memory size must be between 1 and 256, got {0}")]
    InvalidMemorySize(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub instructions: usize,
    pub memory_reads: usize,
    pub memory_writes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Run,
    RunFor(usize),
}

/// Opcodes of the machine.
///
/// The two high bits of every opcode hold its operand count, bit 5 marks
/// ALU operations and bit 4 marks instructions that set the program counter.
#[derive(
    Debug,
    Display,
    PartialEq,
    PartialOrd,
    Copy,
    Clone,
    Hash,
    Eq,
    Ord,
    FromPrimitive,
    ToPrimitive,
    EnumIter,
)]
#[repr(u8)]
pub enum Bytecode {
    //
    // No operands
    //
    Hlt = 0b0000_0001,
    Ret = 0b0001_0001,

    //
    // One register operand
    //
    Push = 0b0100_0101,
    Pop = 0b0100_0110,
    Prn = 0b0100_0111,
    Call = 0b0101_0000,
    Jmp = 0b0101_0100,
    Jeq = 0b0101_0101,
    Jne = 0b0101_0110,

    //
    // Two operands
    //
    Ldi = 0b1000_0010,
    Add = 0b1010_0000,
    Mul = 0b1010_0010,
    Cmp = 0b1010_0111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Register,
    Immediate,
}

#[derive(Debug, Clone)]
pub struct InstructionPattern {
    pub bytecode: Bytecode,
    pub operands: &'static [OperandType],
    pub mnemonic: &'static str,
}

impl InstructionPattern {
    const fn new(
        bytecode: Bytecode,
        operands: &'static [OperandType],
        mnemonic: &'static str,
    ) -> Self {
        Self {
            bytecode,
            operands,
            mnemonic,
        }
    }

    /// Bytes taken by the instruction, opcode included.
    pub fn size(&self) -> usize {
        1 + self.operands.len()
    }
}

pub static INSTRUCTION_PATTERNS: Lazy<HashMap<Bytecode, &'static InstructionPattern>> =
    Lazy::new(|| {
        use OperandType::{Immediate, Register};

        static PATTERNS: &[InstructionPattern] = &[
            InstructionPattern::new(Bytecode::Hlt, &[], "HLT"),
            InstructionPattern::new(Bytecode::Ret, &[], "RET"),
            // Stack
            InstructionPattern::new(Bytecode::Push, &[Register], "PUSH"),
            InstructionPattern::new(Bytecode::Pop, &[Register], "POP"),
            // Output
            InstructionPattern::new(Bytecode::Prn, &[Register], "PRN"),
            // Control flow
            InstructionPattern::new(Bytecode::Call, &[Register], "CALL"),
            InstructionPattern::new(Bytecode::Jmp, &[Register], "JMP"),
            InstructionPattern::new(Bytecode::Jeq, &[Register], "JEQ"),
            InstructionPattern::new(Bytecode::Jne, &[Register], "JNE"),
            // Load
            InstructionPattern::new(Bytecode::Ldi, &[Register, Immediate], "LDI"),
            // ALU
            InstructionPattern::new(Bytecode::Add, &[Register, Register], "ADD"),
            InstructionPattern::new(Bytecode::Mul, &[Register, Register], "MUL"),
            InstructionPattern::new(Bytecode::Cmp, &[Register, Register], "CMP"),
        ];

        let mut map = HashMap::new();
        for pattern in PATTERNS {
            map.insert(pattern.bytecode, pattern);
        }
        map
    });

pub fn get_pattern(bytecode: Bytecode) -> Option<&'static InstructionPattern> {
    INSTRUCTION_PATTERNS.get(&bytecode).copied()
}

/// Mnemonics are matched case-insensitively.
pub fn get_pattern_by_mnemonic(mnemonic: &str) -> Option<&'static InstructionPattern> {
    INSTRUCTION_PATTERNS
        .values()
        .find(|pattern| pattern.mnemonic.eq_ignore_ascii_case(mnemonic))
        .copied()
}

/// Decodes a raw opcode byte. `None` means the byte is not an instruction.
pub fn decode(opcode: u8) -> Option<&'static InstructionPattern> {
    Bytecode::from_u8(opcode).and_then(get_pattern)
}

/// Renders an instruction as `MNEMONIC op, op`.
pub fn format_instruction(pattern: &InstructionPattern, operands: &[u8]) -> String {
    let mut result = pattern.mnemonic.to_string();

    if !operands.is_empty() {
        result.push(' ');
        let rendered: Vec<String> = pattern
            .operands
            .iter()
            .zip(operands)
            .map(|(operand_type, value)| match operand_type {
                OperandType::Register => format!("R{value}"),
                OperandType::Immediate => format!("{value}"),
            })
            .collect();
        result.push_str(&rendered.join(", "));
    }

    result
}
