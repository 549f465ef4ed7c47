use indexmap::IndexMap;
use ls8_common::{
    get_pattern_by_mnemonic, OperandType, ProgramImage, MAX_MEMORY_SIZE, REGISTER_COUNT,
};
use thiserror::Error;

pub mod disassembler;

pub use disassembler::{Disassembler, DisassemblerError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Wrong number of operands for {mnemonic}: expected {expected}, got {got}")]
    WrongOperandCount {
        mnemonic: String,
        expected: usize,
        got: usize,
    },
    #[error("Invalid register name: {0}")]
    InvalidRegister(String),
    #[error("Invalid immediate value: {0}")]
    InvalidImmediate(String),
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Label defined twice: {0}")]
    DuplicateLabel(String),
    #[error("Program needs {0} bytes, more than the machine can address")]
    ProgramTooLarge(usize),
}

/// Pseudo instruction emitting one raw byte.
const DATA_BYTE: &str = "DB";

/// Two pass assembler. Labels are collected first so they can be used
/// before their definition.
#[derive(Debug, Default)]
pub struct Assembler {
    labels: IndexMap<String, u8>,
    current_address: usize,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &IndexMap<String, u8> {
        &self.labels
    }

    pub fn parse_register(reg: &str) -> Result<u8, AssemblerError> {
        let index = reg
            .strip_prefix(['R', 'r'])
            .and_then(|index| index.parse::<u8>().ok())
            .ok_or_else(|| AssemblerError::InvalidRegister(reg.to_string()))?;

        if index as usize >= REGISTER_COUNT {
            return Err(AssemblerError::InvalidRegister(reg.to_string()));
        }
        Ok(index)
    }

    fn parse_immediate(&self, operand: &str) -> Result<u8, AssemblerError> {
        if let Some(&address) = self.labels.get(operand) {
            return Ok(address);
        }

        let parsed = if let Some(hex) = operand.strip_prefix("0x") {
            u8::from_str_radix(hex, 16)
        } else if let Some(bin) = operand.strip_prefix("0b") {
            u8::from_str_radix(bin, 2)
        } else {
            operand.parse::<u8>()
        };

        match parsed {
            Ok(value) => Ok(value),
            Err(_) if is_label_name(operand) => {
                Err(AssemblerError::UndefinedLabel(operand.to_string()))
            }
            Err(_) => Err(AssemblerError::InvalidImmediate(operand.to_string())),
        }
    }

    fn instruction_size(line: &str) -> Result<usize, AssemblerError> {
        let mnemonic = line.split_whitespace().next().unwrap_or_default();
        if mnemonic.eq_ignore_ascii_case(DATA_BYTE) {
            return Ok(1);
        }
        get_pattern_by_mnemonic(mnemonic)
            .map(|pattern| pattern.size())
            .ok_or_else(|| AssemblerError::UnknownInstruction(mnemonic.to_string()))
    }

    pub fn assemble_line(&mut self, line: &str) -> Result<Vec<u8>, AssemblerError> {
        let line = strip_comment(line);

        if line.is_empty() || line.ends_with(':') {
            return Ok(vec![]);
        }

        let mut parts = line.split_whitespace();
        let mnemonic = match parts.next() {
            Some(m) => m,
            None => return Ok(vec![]),
        };

        let operand_str = parts.collect::<Vec<_>>().join("");
        let operand_strs: Vec<&str> = if operand_str.is_empty() {
            vec![]
        } else {
            operand_str.split(',').map(str::trim).collect()
        };

        let result = if mnemonic.eq_ignore_ascii_case(DATA_BYTE) {
            if operand_strs.len() != 1 {
                return Err(AssemblerError::WrongOperandCount {
                    mnemonic: mnemonic.to_string(),
                    expected: 1,
                    got: operand_strs.len(),
                });
            }
            vec![self.parse_immediate(operand_strs[0])?]
        } else {
            let pattern = get_pattern_by_mnemonic(mnemonic)
                .ok_or_else(|| AssemblerError::UnknownInstruction(mnemonic.to_string()))?;

            if operand_strs.len() != pattern.operands.len() {
                return Err(AssemblerError::WrongOperandCount {
                    mnemonic: mnemonic.to_string(),
                    expected: pattern.operands.len(),
                    got: operand_strs.len(),
                });
            }

            let mut result = vec![pattern.bytecode as u8];
            for (operand, operand_type) in operand_strs.iter().zip(pattern.operands) {
                result.push(match operand_type {
                    OperandType::Register => Self::parse_register(operand)?,
                    OperandType::Immediate => self.parse_immediate(operand)?,
                });
            }
            result
        };

        self.current_address += result.len();
        Ok(result)
    }

    pub fn assemble_program(&mut self, program: &str) -> Result<ProgramImage, AssemblerError> {
        // First pass: collect labels
        self.labels.clear();
        self.current_address = 0;
        for line in program.lines() {
            let line = strip_comment(line);
            if let Some(label) = line.strip_suffix(':') {
                let address = u8::try_from(self.current_address)
                    .map_err(|_| AssemblerError::ProgramTooLarge(self.current_address))?;
                let label = label.trim().to_string();
                if self.labels.insert(label.clone(), address).is_some() {
                    return Err(AssemblerError::DuplicateLabel(label));
                }
            } else if !line.is_empty() {
                self.current_address += Self::instruction_size(line)?;
            }
        }

        if self.current_address > MAX_MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge(self.current_address));
        }

        // Reset for second pass
        self.current_address = 0;
        let mut bytecode = Vec::new();

        // Second pass: generate bytecode
        for line in program.lines() {
            let mut line_code = self.assemble_line(line)?;
            bytecode.append(&mut line_code);
        }

        Ok(ProgramImage::new(bytecode))
    }
}

fn strip_comment(line: &str) -> &str {
    match line.split_once(';') {
        Some((code, _)) => code.trim(),
        None => line.trim(),
    }
}

fn is_label_name(operand: &str) -> bool {
    let mut chars = operand.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
