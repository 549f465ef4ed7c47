use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::{
    alu::{self, AluResult},
    decode, format_instruction,
    machine::{Flag, Machine},
    Bytecode, CpuStats, ExecutionError, ProgramImage, RunMode,
};

/// Where the machine sends program output and engine diagnostics.
pub trait HostIO: std::fmt::Debug {
    /// Called by `PRN` and `MUL`, in program order.
    fn emit(&mut self, value: u8);

    fn diagnostic(&mut self, message: &str);
}

#[derive(Debug, Default)]
pub struct StdHostIO;

impl HostIO for StdHostIO {
    fn emit(&mut self, value: u8) {
        println!("{value}");
    }

    fn diagnostic(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Halt,
    UnknownOpcode { opcode: u8, address: usize },
}

/// What the engine does with the program counter after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

type Handler = fn(&mut Machine, &mut dyn HostIO, &[u8]) -> Result<Flow, ExecutionError>;

static HANDLERS: Lazy<HashMap<Bytecode, Handler>> = Lazy::new(|| {
    let mut map: HashMap<Bytecode, Handler> = HashMap::new();
    map.insert(Bytecode::Hlt, hlt);
    map.insert(Bytecode::Ret, ret);
    map.insert(Bytecode::Push, push);
    map.insert(Bytecode::Pop, pop);
    map.insert(Bytecode::Prn, prn);
    map.insert(Bytecode::Call, call);
    map.insert(Bytecode::Jmp, jmp);
    map.insert(Bytecode::Jeq, jeq);
    map.insert(Bytecode::Jne, jne);
    map.insert(Bytecode::Ldi, ldi);
    map.insert(Bytecode::Add, add);
    map.insert(Bytecode::Mul, mul);
    map.insert(Bytecode::Cmp, cmp);
    map
});

fn hlt(_: &mut Machine, _: &mut dyn HostIO, _: &[u8]) -> Result<Flow, ExecutionError> {
    Ok(Flow::Halt)
}

fn ldi(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    machine.write_register(ops[0], ops[1])?;
    Ok(Flow::Next)
}

fn prn(machine: &mut Machine, io: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    io.emit(machine.read_register(ops[0])?);
    Ok(Flow::Next)
}

fn alu_operation(
    op: Bytecode,
    machine: &mut Machine,
    io: &mut dyn HostIO,
    ops: &[u8],
) -> Result<Flow, ExecutionError> {
    let a = machine.read_register(ops[0])?;
    let b = machine.read_register(ops[1])?;

    match alu::evaluate(op, a, b)? {
        AluResult::Write(value) => machine.write_register(ops[0], value)?,
        AluResult::Emit(value) => io.emit(value),
    }
    Ok(Flow::Next)
}

fn add(machine: &mut Machine, io: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    alu_operation(Bytecode::Add, machine, io, ops)
}

fn mul(machine: &mut Machine, io: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    alu_operation(Bytecode::Mul, machine, io, ops)
}

fn cmp(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    let a = machine.read_register(ops[0])?;
    let b = machine.read_register(ops[1])?;
    machine.flag = Flag::compare(a, b);
    Ok(Flow::Next)
}

fn push(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    let value = machine.read_register(ops[0])?;
    machine.push_stack(value)?;
    Ok(Flow::Next)
}

fn pop(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    // Reject a bad destination before the stack is touched.
    machine.read_register(ops[0])?;
    let value = machine.pop_stack()?;
    machine.write_register(ops[0], value)?;
    Ok(Flow::Next)
}

fn call(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    let target = machine.read_register(ops[0])?;
    let return_address = machine.pc + 2;
    let return_byte = u8::try_from(return_address)
        .map_err(|_| ExecutionError::InvalidMemoryLocation(return_address))?;

    machine.push_stack(return_byte)?;
    Ok(Flow::Jump(target as usize))
}

fn ret(machine: &mut Machine, _: &mut dyn HostIO, _: &[u8]) -> Result<Flow, ExecutionError> {
    let return_address = machine.pop_stack()?;
    Ok(Flow::Jump(return_address as usize))
}

fn jmp(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    Ok(Flow::Jump(machine.read_register(ops[0])? as usize))
}

fn jump_if(machine: &Machine, ops: &[u8], taken: bool) -> Result<Flow, ExecutionError> {
    let target = machine.read_register(ops[0])?;
    Ok(if taken {
        Flow::Jump(target as usize)
    } else {
        Flow::Next
    })
}

fn jeq(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    jump_if(machine, ops, machine.flag == Flag::Equal)
}

fn jne(machine: &mut Machine, _: &mut dyn HostIO, ops: &[u8]) -> Result<Flow, ExecutionError> {
    jump_if(machine, ops, machine.flag != Flag::Equal)
}

#[derive(Debug)]
pub struct Cpu<IO: HostIO> {
    machine: Machine,
    pub host_io: IO,
    halted: Option<HaltReason>,
    verbose: bool,
    trace: bool,
    strict: bool,
}

impl<IO: HostIO> Cpu<IO> {
    pub fn new(memory_size: usize, host_io: IO) -> Result<Self, ExecutionError> {
        Ok(Self {
            machine: Machine::new(memory_size)?,
            host_io,
            halted: None,
            verbose: false,
            trace: false,
            strict: false,
        })
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// In strict mode an unknown opcode is returned as
    /// [`ExecutionError::InvalidOpcode`] instead of halting the machine.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn load_memory(&mut self, address: usize, data: &[u8]) -> Result<(), ExecutionError> {
        self.machine.memory.load(address, data)
    }

    pub fn load_image(&mut self, image: &ProgramImage) -> Result<(), ExecutionError> {
        self.load_memory(0, &image.data)
    }

    pub fn execute(&mut self, run_mode: RunMode) -> Result<CpuStats, ExecutionError> {
        match run_mode {
            RunMode::Run => self.run(None),
            RunMode::RunFor(steps) => self.run(Some(steps)),
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn get_registers(&self) -> &[u8] {
        self.machine.registers.as_slice()
    }

    pub fn get_memory(&self) -> &[u8] {
        self.machine.memory.as_slice()
    }

    pub fn pc(&self) -> usize {
        self.machine.pc
    }

    pub fn flag(&self) -> Flag {
        self.machine.flag
    }

    pub fn stats(&self) -> CpuStats {
        self.machine.stats
    }

    pub fn get_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted
    }

    /// `TRACE: PC | M[PC] M[PC+1] M[PC+2] | R0 .. R7`, all in hex.
    pub fn trace_line(&self) -> String {
        let memory = self.get_memory();
        let pc = self.machine.pc;
        let byte = |offset: usize| memory.get(pc + offset).copied().unwrap_or_default();

        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            pc,
            byte(0),
            byte(1),
            byte(2)
        );
        for value in self.get_registers() {
            line.push_str(&format!(" {value:02X}"));
        }
        line
    }

    pub fn print_state(&self) {
        println!();
        println!("========== VM STATE ===========");
        println!();
        println!("PC: {}", self.machine.pc);
        println!("SP: {}", self.machine.stack_pointer());
        println!("Flag: {:?}", self.machine.flag);
        println!("Halted: {:?}", self.halted);
        println!(
            "Registers: {:#?}",
            self.get_registers()
                .iter()
                .enumerate()
                .collect::<BTreeMap<_, _>>()
        );
        println!(
            "Memory: {:#?}",
            self.get_memory()
                .iter()
                .enumerate()
                .filter(|(_, value)| **value != 0)
                .collect::<BTreeMap<_, _>>()
        );
    }

    fn run(&mut self, limit: Option<usize>) -> Result<CpuStats, ExecutionError> {
        let mut executed = 0;

        while self.halted.is_none() && limit.is_none_or(|limit| executed < limit) {
            if self.trace {
                println!("{}", self.trace_line());
            }
            self.step()?;
            executed += 1;
        }

        Ok(self.machine.stats)
    }

    fn step(&mut self) -> Result<(), ExecutionError> {
        let pc = self.machine.pc;
        let opcode = self.machine.read_memory(pc)?;

        let Some(pattern) = decode(opcode) else {
            if self.strict {
                return Err(ExecutionError::InvalidOpcode(opcode, pc));
            }
            self.host_io.diagnostic(&format!(
                "Unknown instruction {opcode:#010b} at @{pc:#04x}, halting"
            ));
            self.halted = Some(HaltReason::UnknownOpcode {
                opcode,
                address: pc,
            });
            return Ok(());
        };

        let mut buffer = [0u8; 2];
        let operands = &mut buffer[..pattern.operands.len()];
        for (offset, operand) in operands.iter_mut().enumerate() {
            *operand = self.machine.read_memory(pc + 1 + offset)?;
        }

        if self.verbose {
            println!("@{:#04x}: {}", pc, format_instruction(pattern, operands));
        }

        let handler = *HANDLERS
            .get(&pattern.bytecode)
            .ok_or(ExecutionError::InvalidOpcode(opcode, pc))?;

        match handler(&mut self.machine, &mut self.host_io, operands)? {
            Flow::Next => self.machine.pc = pc + pattern.size(),
            Flow::Jump(target) => self.machine.pc = target,
            Flow::Halt => self.halted = Some(HaltReason::Halt),
        }
        self.machine.stats.instructions += 1;

        Ok(())
    }
}
