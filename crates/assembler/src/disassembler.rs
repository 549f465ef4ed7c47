use std::collections::HashMap;

use indexmap::IndexMap;
use ls8_common::{decode, format_instruction};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DisassemblerError {
    #[error("Unexpected end of bytecode at @{0}")]
    UnexpectedEnd(usize),
}

#[derive(Debug, Default)]
pub struct Disassembler {
    labels: HashMap<usize, String>,
}

impl Disassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(labels: &IndexMap<String, u8>) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(name, &address)| (address as usize, name.clone()))
                .collect(),
        }
    }

    /// Disassembles the instruction at the start of `bytecode`, returning
    /// its text and size. Bytes that are no opcode become `DB` lines.
    pub fn disassemble_instruction(
        &self,
        bytecode: &[u8],
        address: usize,
    ) -> Result<(String, usize), DisassemblerError> {
        let &opcode = bytecode
            .first()
            .ok_or(DisassemblerError::UnexpectedEnd(address))?;

        let Some(pattern) = decode(opcode) else {
            return Ok((format!("DB {opcode:#010b}"), 1));
        };

        let operands = bytecode
            .get(1..pattern.size())
            .ok_or(DisassemblerError::UnexpectedEnd(address))?;

        Ok((format_instruction(pattern, operands), pattern.size()))
    }

    pub fn disassemble_program(&self, bytecode: &[u8]) -> Result<String, DisassemblerError> {
        let mut result = String::new();
        let mut offset = 0;

        while offset < bytecode.len() {
            // Add label if this address has one
            if let Some(label) = self.labels.get(&offset) {
                result.push_str(&format!("{}:\n", label));
            }

            let (instruction, size) = self.disassemble_instruction(&bytecode[offset..], offset)?;
            result.push_str(&format!("    {}\n", instruction));
            offset += size;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Assembler;
    use ls8_common::Bytecode;

    #[test]
    fn test_simple_disassembly() {
        let bytecode = vec![
            Bytecode::Ldi as u8,
            0,
            42,
            Bytecode::Prn as u8,
            0,
            Bytecode::Hlt as u8,
        ];
        let disassembler = Disassembler::new();
        let result = disassembler.disassemble_program(&bytecode).unwrap();
        assert_eq!(result, "    LDI R0, 42\n    PRN R0\n    HLT\n");
    }

    #[test]
    fn test_unknown_byte() {
        let disassembler = Disassembler::new();
        let result = disassembler.disassemble_program(&[0xFF, 0x01]).unwrap();
        assert_eq!(result, "    DB 0b11111111\n    HLT\n");
    }

    #[test]
    fn test_truncated() {
        let disassembler = Disassembler::new();
        assert_eq!(
            disassembler.disassemble_program(&[Bytecode::Hlt as u8, Bytecode::Mul as u8, 0]),
            Err(DisassemblerError::UnexpectedEnd(1))
        );
    }

    #[test]
    fn test_roundtrip() {
        let program = "start:\nLDI R1, start\nJMP R1\n";
        let mut assembler = Assembler::new();
        let bytecode = assembler.assemble_program(program).unwrap();
        let disassembler = Disassembler::with_labels(assembler.labels());
        let result = disassembler.disassemble_program(&bytecode.data).unwrap();
        insta::assert_snapshot!(result, @r"
        start:
            LDI R1, 0
            JMP R1
        ");

        let mut reassembler = Assembler::new();
        assert_eq!(reassembler.assemble_program(&result).unwrap(), bytecode);
    }

    #[test]
    fn test_sctest_listing() {
        let mut assembler = Assembler::new();
        let image = assembler
            .assemble_program(include_str!("../../../programs/sctest.asm"))
            .unwrap();
        let disassembler = Disassembler::with_labels(assembler.labels());
        let listing = disassembler.disassemble_program(&image.data).unwrap();

        assert!(listing.contains("Test1:\n    LDI R2, 32\n"));
        assert!(listing.ends_with("Test5:\n    HLT\n"));

        let mut reassembler = Assembler::new();
        assert_eq!(reassembler.assemble_program(&listing).unwrap(), image);
    }
}
