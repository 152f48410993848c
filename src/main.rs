use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser as ClapParser;
use thiserror::Error;

use fractal::{
    checker::Checker,
    codegen::CodeGenerator,
    diag::Diagnostics,
    emit::Emitter,
    legalize,
    lexer::Lexer,
    parser::Parser,
    platform::{Platform, UnknownArchitecture},
};

#[derive(Debug, ClapParser)]
#[clap(version, about = "Compiler for the Fractal language")]
struct Args {
    /// Fractal source file
    input: PathBuf,

    /// Output assembly file (defaults to the input with `.asm`)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Target architecture: x86_64-intel-win or x86_64-intel-mac
    #[clap(short, long, default_value = "x86_64-intel-win")]
    target: String,

    /// Print the token stream
    #[clap(long)]
    dump_tokens: bool,

    /// Print the intermediate instruction list
    #[clap(long)]
    dump_ir: bool,
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("failed to read '{0}': {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to write '{0}': {1}")]
    Write(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Target(#[from] UnknownArchitecture),
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, DriverError> {
    let platform: Platform = args.target.parse()?;
    let source = fs::read_to_string(&args.input)
        .map_err(|err| DriverError::Read(args.input.clone(), err))?;
    let file_name = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());

    let mut diagnostics = Diagnostics::new();

    let tokens = Lexer::new(&source, &mut diagnostics).tokenize();
    if args.dump_tokens {
        let mut line = 0;
        for token in &tokens {
            if token.position.line != line {
                line = token.position.line;
                print!("{}", line);
            } else {
                print!("|");
            }
            println!("\t| {}\t| {}", token.kind, token.lexeme);
        }
    }
    if diagnostics.has_errors() {
        eprint!("{}", diagnostics.render(&file_name, &source));
        return Ok(ExitCode::FAILURE);
    }

    let mut program = Parser::new(&tokens, &mut diagnostics).parse();
    if diagnostics.has_errors() {
        eprint!("{}", diagnostics.render(&file_name, &source));
        return Ok(ExitCode::FAILURE);
    }

    Checker::new(&mut diagnostics).check(&mut program);
    if diagnostics.has_errors() {
        eprint!("{}", diagnostics.render(&file_name, &source));
        return Ok(ExitCode::FAILURE);
    }

    let mut generator = CodeGenerator::new(platform, &mut diagnostics);
    generator.generate(&program);
    let (mut instrs, externals) = generator.finish();
    if args.dump_ir {
        for instr in &instrs {
            println!("{}", instr);
        }
    }
    if diagnostics.has_errors() {
        eprint!("{}", diagnostics.render(&file_name, &source));
        return Ok(ExitCode::FAILURE);
    }

    legalize::legalize(&mut instrs);
    legalize::legalize(&mut instrs);

    let assembly = Emitter::new(platform).emit(&instrs, &externals);

    // warnings never change the exit code
    eprint!("{}", diagnostics.render(&file_name, &source));

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("asm"));
    fs::write(&output, assembly).map_err(|err| DriverError::Write(output.clone(), err))?;

    Ok(ExitCode::SUCCESS)
}
