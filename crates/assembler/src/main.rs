use clap::Parser;
use ls8_assembler::{Assembler, Disassembler};
use ls8_common::ProgramImage;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    #[clap(long, short)]
    disassemble: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Args {
        input,
        output,
        disassemble,
    } = Args::parse();

    let code = if disassemble {
        let program = ProgramImage::load(input)?;
        Disassembler::new().disassemble_program(&program.data)?
    } else {
        let program = std::fs::read_to_string(&input)?;
        let mut assembler = Assembler::new();
        assembler.assemble_program(&program)?.to_source()
    };

    std::fs::write(&output, code)
        .map_err(|e| format!("Failed to write output file '{}': {e}", output.display()))?;

    Ok(())
}
