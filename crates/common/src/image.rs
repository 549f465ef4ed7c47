use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{decode, format_instruction};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Could not open program image '{}'", .path.display())]
    ImageNotFound { path: PathBuf, source: io::Error },
    #[error("Line {line}: expected an 8 digit binary literal, got '{text}'")]
    InvalidLiteral { line: usize, text: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Program bytes, in load order starting at address 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    pub data: Vec<u8>,
}

impl ProgramImage {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn load<P: AsRef<Path>>(p: P) -> Result<Self, LoadError> {
        let path = p.as_ref();
        let file = File::open(path).map_err(|source| LoadError::ImageNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut data = Vec::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            if let Some(value) = parse_line(index + 1, &line?)? {
                data.push(value);
            }
        }
        Ok(Self { data })
    }

    pub fn parse(source: &str) -> Result<Self, LoadError> {
        Self::from_reader(source.as_bytes())
    }

    /// Renders the image in the text format `parse` reads, annotating each
    /// opcode with its disassembly.
    pub fn to_source(&self) -> String {
        let mut result = String::new();
        let mut offset = 0;

        while offset < self.data.len() {
            let opcode = self.data[offset];
            match decode(opcode) {
                Some(pattern) if offset + pattern.size() <= self.data.len() => {
                    let operands = &self.data[offset + 1..offset + pattern.size()];
                    result.push_str(&format!(
                        "{:08b} # {}\n",
                        opcode,
                        format_instruction(pattern, operands)
                    ));
                    for operand in operands {
                        result.push_str(&format!("{operand:08b}\n"));
                    }
                    offset += pattern.size();
                }
                _ => {
                    result.push_str(&format!("{opcode:08b}\n"));
                    offset += 1;
                }
            }
        }

        result
    }
}

fn parse_line(line: usize, text: &str) -> Result<Option<u8>, LoadError> {
    let code = match text.split_once('#') {
        Some((code, _)) => code,
        None => text,
    }
    .trim();

    if code.is_empty() {
        return Ok(None);
    }

    if code.len() != 8 || !code.chars().all(|c| c == '0' || c == '1') {
        return Err(LoadError::InvalidLiteral {
            line,
            text: code.to_string(),
        });
    }

    u8::from_str_radix(code, 2)
        .map(Some)
        .map_err(|_| LoadError::InvalidLiteral {
            line,
            text: code.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments() {
        let source = "\
# print8.ls8
10000010 # LDI R0,8
00000000
00001000

01000111 # PRN R0
00000000
00000001 # HLT
";
        let image = ProgramImage::parse(source).unwrap();
        assert_eq!(
            image.data,
            vec![0b1000_0010, 0, 8, 0b0100_0111, 0, 0b0000_0001]
        );
    }

    #[test]
    fn test_parse_surrounding_whitespace() {
        let image = ProgramImage::parse("   11111111   \n\t00000000#zero\n").unwrap();
        assert_eq!(image.data, vec![255, 0]);
    }

    #[test]
    fn test_invalid_literals() {
        for bad in ["1010", "101000001", "1010002a", "LDI R0,8"] {
            match ProgramImage::parse(&format!("00000001\n{bad}\n")) {
                Err(LoadError::InvalidLiteral { line, text }) => {
                    assert_eq!(line, 2);
                    assert_eq!(text, bad);
                }
                other => panic!("expected InvalidLiteral for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_file() {
        let err = ProgramImage::load("this/path/does/not/exist.ls8").unwrap_err();
        assert!(matches!(err, LoadError::ImageNotFound { .. }));
    }

    #[test]
    fn test_to_source_reparses() {
        let image = ProgramImage::new(vec![0b1000_0010, 1, 5, 0b0100_0111, 1, 0b0000_0001]);
        let source = image.to_source();
        assert_eq!(
            source,
            "10000010 # LDI R1, 5\n00000001\n00000101\n01000111 # PRN R1\n00000001\n00000001 # HLT\n"
        );
        assert_eq!(ProgramImage::parse(&source).unwrap(), image);
    }

    #[test]
    fn test_to_source_unknown_and_truncated() {
        // The operand byte of the truncated LDI is no opcode itself.
        let image = ProgramImage::new(vec![0xFF, 0b1000_0010, 0]);
        assert_eq!(image.to_source(), "11111111\n10000010\n00000000\n");
    }

    #[test]
    fn test_missing_file_message() {
        let err = ProgramImage::load("this/path/does/not/exist.ls8").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not open program image 'this/path/does/not/exist.ls8'"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
