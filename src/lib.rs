#![forbid(unsafe_code)]

pub mod ast;
pub mod checker;
pub mod codegen;
pub mod diag;
pub mod emit;
pub mod ir;
pub mod legalize;
pub mod lexer;
pub mod parser;
pub mod platform;
pub mod span;
pub mod token;
pub mod types;

pub use diag::Diagnostics;
pub use platform::Platform;

use checker::Checker;
use codegen::CodeGenerator;
use emit::Emitter;
use lexer::Lexer;
use parser::Parser;

/// Result of one compilation: assembly text when no errors were
/// reported, and the diagnostics sink either way.
#[derive(Debug)]
pub struct CompileOutput {
    pub assembly:    Option<String>,
    pub diagnostics: Diagnostics,
}

impl CompileOutput {
    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            assembly: None,
            diagnostics,
        }
    }
}

/// Runs the whole pipeline over one source string. Phases run in order
/// and any reported error stops the pipeline before the next phase.
pub fn compile(source: &str, platform: Platform) -> CompileOutput {
    let mut diagnostics = Diagnostics::new();

    let tokens = Lexer::new(source, &mut diagnostics).tokenize();
    if diagnostics.has_errors() {
        return CompileOutput::failed(diagnostics);
    }

    let mut program = Parser::new(&tokens, &mut diagnostics).parse();
    if diagnostics.has_errors() {
        return CompileOutput::failed(diagnostics);
    }

    Checker::new(&mut diagnostics).check(&mut program);
    if diagnostics.has_errors() {
        return CompileOutput::failed(diagnostics);
    }

    let mut generator = CodeGenerator::new(platform, &mut diagnostics);
    generator.generate(&program);
    let (mut instrs, externals) = generator.finish();
    if diagnostics.has_errors() {
        return CompileOutput::failed(diagnostics);
    }

    legalize::legalize(&mut instrs);
    legalize::legalize(&mut instrs);

    let assembly = Emitter::new(platform).emit(&instrs, &externals);
    CompileOutput {
        assembly: Some(assembly),
        diagnostics,
    }
}
