use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{builder::TypedValueParser, Parser};
use ls8_common::{Cpu, LoadError, ProgramImage, RunMode, StdHostIO, MAX_MEMORY_SIZE};

/// Exit code when the program image cannot be opened.
const IMAGE_NOT_FOUND: u8 = 2;

#[derive(Parser)]
struct Args {
    /// Program image, one 8 digit binary literal per line
    path: PathBuf,
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long)]
    trace: bool,
    #[arg(short, long)]
    show_cpu_state: bool,
    #[arg(short, long, default_value_t = MAX_MEMORY_SIZE,
          value_parser = clap::value_parser!(u16).range(1..=MAX_MEMORY_SIZE as i64).map(usize::from))]
    memory_size: usize,
    /// Fail on unknown opcodes instead of halting
    #[arg(long)]
    strict: bool,
    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<usize>,
    /// Assemble `path` before running it
    #[arg(long)]
    asm: bool,
}

fn load(path: &Path, asm: bool) -> anyhow::Result<ProgramImage> {
    if asm {
        let mut file = File::open(path).map_err(|source| LoadError::ImageNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let mut source = String::new();
        file.read_to_string(&mut source).map_err(LoadError::Io)?;

        let mut assembler = ls8_assembler::Assembler::new();
        Ok(assembler.assemble_program(&source)?)
    } else {
        Ok(ProgramImage::load(path)?)
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let image = load(&args.path, args.asm)?;

    let mut cpu = Cpu::new(args.memory_size, StdHostIO)?;
    cpu.set_verbose(args.verbose);
    cpu.set_trace(args.trace);
    cpu.set_strict(args.strict);
    cpu.load_image(&image)?;

    let run_mode = match args.max_steps {
        Some(steps) => RunMode::RunFor(steps),
        None => RunMode::Run,
    };
    let result = cpu.execute(run_mode);

    if args.verbose {
        println!();
        println!("========== RESULT/STATS ===========");
        println!();
        println!("{:#?}", result);
    }

    if args.show_cpu_state {
        cpu.print_state();
    }

    result?;
    Ok(())
}

fn exit_code(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<LoadError>() {
            Some(LoadError::ImageNotFound { .. }) => IMAGE_NOT_FOUND,
            _ => 1,
        },
    }
}

fn main() -> ExitCode {
    let result = run(Args::parse());
    if let Err(err) = &result {
        eprintln!("Error: {err:#}");
    }
    ExitCode::from(exit_code(&result))
}
