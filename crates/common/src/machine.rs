use std::cmp::Ordering;

use crate::{CpuStats, ExecutionError, MAX_MEMORY_SIZE, REGISTER_COUNT, STACK_POINTER};

/// Flat, bounds checked byte memory.
#[derive(Debug, Clone)]
pub struct Memory {
    cells: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Result<Self, ExecutionError> {
        if size == 0 || size > MAX_MEMORY_SIZE {
            return Err(ExecutionError::InvalidMemorySize(size));
        }
        Ok(Self {
            cells: vec![0; size],
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn read(&self, address: usize) -> Result<u8, ExecutionError> {
        self.cells
            .get(address)
            .copied()
            .ok_or(ExecutionError::InvalidMemoryLocation(address))
    }

    pub fn write(&mut self, address: usize, value: u8) -> Result<(), ExecutionError> {
        let cell = self
            .cells
            .get_mut(address)
            .ok_or(ExecutionError::InvalidMemoryLocation(address))?;
        *cell = value;
        Ok(())
    }

    /// Copies `data` into memory starting at `address`. Nothing is written
    /// unless all of it fits.
    pub fn load(&mut self, address: usize, data: &[u8]) -> Result<(), ExecutionError> {
        let end = address + data.len();
        if end > self.cells.len() {
            return Err(ExecutionError::ProgramTooLarge {
                len: data.len(),
                capacity: self.cells.len().saturating_sub(address),
            });
        }
        self.cells[address..end].copy_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registers {
    slots: [u8; REGISTER_COUNT],
}

impl Registers {
    pub fn read(&self, index: u8) -> Result<u8, ExecutionError> {
        self.slots
            .get(index as usize)
            .copied()
            .ok_or(ExecutionError::InvalidRegister(index))
    }

    pub fn write(&mut self, index: u8, value: u8) -> Result<(), ExecutionError> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(ExecutionError::InvalidRegister(index))?;
        *slot = value;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.slots
    }
}

/// Result of the most recent comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flag {
    #[default]
    Unset,
    Equal,
    Less,
    Greater,
}

impl Flag {
    pub fn compare(a: u8, b: u8) -> Self {
        match a.cmp(&b) {
            Ordering::Equal => Flag::Equal,
            Ordering::Less => Flag::Less,
            Ordering::Greater => Flag::Greater,
        }
    }
}

/// Everything an instruction can observe or change.
#[derive(Debug, Clone)]
pub struct Machine {
    pub memory: Memory,
    pub registers: Registers,
    pub pc: usize,
    pub flag: Flag,
    pub stats: CpuStats,
    stack_top: u8,
}

impl Machine {
    /// Creates a zeroed machine whose stack pointer starts at the last
    /// valid address.
    pub fn new(memory_size: usize) -> Result<Self, ExecutionError> {
        let memory = Memory::new(memory_size)?;
        let stack_top = (memory.len() - 1) as u8;
        let mut registers = Registers::default();
        registers.write(STACK_POINTER, stack_top)?;

        Ok(Self {
            memory,
            registers,
            pc: 0,
            flag: Flag::Unset,
            stats: CpuStats::default(),
            stack_top,
        })
    }

    pub fn read_memory(&mut self, address: usize) -> Result<u8, ExecutionError> {
        let value = self.memory.read(address)?;
        self.stats.memory_reads += 1;
        Ok(value)
    }

    pub fn write_memory(&mut self, address: usize, value: u8) -> Result<(), ExecutionError> {
        self.memory.write(address, value)?;
        self.stats.memory_writes += 1;
        Ok(())
    }

    pub fn read_register(&self, index: u8) -> Result<u8, ExecutionError> {
        self.registers.read(index)
    }

    pub fn write_register(&mut self, index: u8, value: u8) -> Result<(), ExecutionError> {
        self.registers.write(index, value)
    }

    pub fn stack_pointer(&self) -> u8 {
        self.registers.as_slice()[STACK_POINTER as usize]
    }

    pub fn push_stack(&mut self, value: u8) -> Result<(), ExecutionError> {
        let sp = self.stack_pointer();
        if sp == 0 {
            return Err(ExecutionError::StackOverflow);
        }

        self.write_memory((sp - 1) as usize, value)?;
        self.write_register(STACK_POINTER, sp - 1)
    }

    pub fn pop_stack(&mut self) -> Result<u8, ExecutionError> {
        let sp = self.stack_pointer();
        if sp >= self.stack_top {
            return Err(ExecutionError::StackUnderflow);
        }

        let value = self.read_memory(sp as usize)?;
        self.write_register(STACK_POINTER, sp + 1)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bounds() {
        let mut memory = Memory::new(16).unwrap();
        memory.write(15, 42).unwrap();
        assert_eq!(memory.read(15), Ok(42));
        assert_eq!(
            memory.read(16),
            Err(ExecutionError::InvalidMemoryLocation(16))
        );
        assert_eq!(
            memory.write(300, 1),
            Err(ExecutionError::InvalidMemoryLocation(300))
        );
    }

    #[test]
    fn test_memory_size_limits() {
        assert_eq!(
            Memory::new(0).unwrap_err(),
            ExecutionError::InvalidMemorySize(0)
        );
        assert_eq!(
            Memory::new(257).unwrap_err(),
            ExecutionError::InvalidMemorySize(257)
        );
        assert_eq!(Memory::new(256).unwrap().len(), 256);
    }

    #[test]
    fn test_memory_load_all_or_nothing() {
        let mut memory = Memory::new(4).unwrap();
        assert_eq!(
            memory.load(0, &[1, 2, 3, 4, 5]),
            Err(ExecutionError::ProgramTooLarge {
                len: 5,
                capacity: 4
            })
        );
        assert_eq!(memory.as_slice(), &[0, 0, 0, 0]);

        memory.load(1, &[7, 8]).unwrap();
        assert_eq!(memory.as_slice(), &[0, 7, 8, 0]);
    }

    #[test]
    fn test_register_bounds() {
        let mut registers = Registers::default();
        registers.write(3, 9).unwrap();
        assert_eq!(registers.read(3), Ok(9));
        assert_eq!(registers.read(8), Err(ExecutionError::InvalidRegister(8)));
        assert_eq!(
            registers.write(255, 1),
            Err(ExecutionError::InvalidRegister(255))
        );
    }

    #[test]
    fn test_flag_compare() {
        assert_eq!(Flag::default(), Flag::Unset);
        assert_eq!(Flag::compare(3, 3), Flag::Equal);
        assert_eq!(Flag::compare(2, 3), Flag::Less);
        assert_eq!(Flag::compare(200, 3), Flag::Greater);
    }

    #[test]
    fn test_stack_pointer_starts_at_top() {
        let machine = Machine::new(256).unwrap();
        assert_eq!(machine.stack_pointer(), 0xFF);

        let small = Machine::new(32).unwrap();
        assert_eq!(small.stack_pointer(), 31);
    }

    #[test]
    fn test_push_pop() {
        let mut machine = Machine::new(256).unwrap();
        machine.push_stack(10).unwrap();
        machine.push_stack(20).unwrap();
        assert_eq!(machine.stack_pointer(), 0xFD);
        assert_eq!(machine.memory.read(0xFE), Ok(10));
        assert_eq!(machine.memory.read(0xFD), Ok(20));

        assert_eq!(machine.pop_stack(), Ok(20));
        assert_eq!(machine.pop_stack(), Ok(10));
        assert_eq!(machine.stack_pointer(), 0xFF);
        assert_eq!(machine.pop_stack(), Err(ExecutionError::StackUnderflow));
    }

    #[test]
    fn test_stack_overflow() {
        let mut machine = Machine::new(256).unwrap();
        machine.write_register(STACK_POINTER, 0).unwrap();
        assert_eq!(machine.push_stack(1), Err(ExecutionError::StackOverflow));
        assert_eq!(machine.stack_pointer(), 0);
    }

    #[test]
    fn test_stack_pointer_outside_small_memory() {
        let mut machine = Machine::new(16).unwrap();
        machine.write_register(STACK_POINTER, 100).unwrap();
        assert_eq!(
            machine.push_stack(1),
            Err(ExecutionError::InvalidMemoryLocation(99))
        );
        assert_eq!(machine.stack_pointer(), 100);
    }
}
