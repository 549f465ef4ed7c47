use crate::{Bytecode, ExecutionError};

/// What the engine has to do with an ALU result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluResult {
    /// Store into the first operand register.
    Write(u8),
    /// Hand to the host as program output. No register changes.
    Emit(u8),
}

/// Evaluates `op` over two register values. Results wrap at 8 bits.
pub fn evaluate(op: Bytecode, a: u8, b: u8) -> Result<AluResult, ExecutionError> {
    match op {
        Bytecode::Add => Ok(AluResult::Write(a.wrapping_add(b))),
        Bytecode::Mul => Ok(AluResult::Emit(a.wrapping_mul(b))),
        _ => Err(ExecutionError::UnsupportedOperation(op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps() {
        assert_eq!(evaluate(Bytecode::Add, 2, 3), Ok(AluResult::Write(5)));
        assert_eq!(evaluate(Bytecode::Add, 250, 10), Ok(AluResult::Write(4)));
    }

    #[test]
    fn test_mul_emits() {
        assert_eq!(evaluate(Bytecode::Mul, 8, 9), Ok(AluResult::Emit(72)));
        assert_eq!(evaluate(Bytecode::Mul, 16, 17), Ok(AluResult::Emit(16)));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(
            evaluate(Bytecode::Cmp, 1, 1),
            Err(ExecutionError::UnsupportedOperation(Bytecode::Cmp))
        );
        assert_eq!(
            evaluate(Bytecode::Ldi, 1, 1),
            Err(ExecutionError::UnsupportedOperation(Bytecode::Ldi))
        );
    }
}
