//! Lexer, parser, validator, optimizer and evaluator for Nandlang, a
//! NAND-only esoteric language.
//!
//! The pipeline mirrors `original_source/src/main.cpp`'s
//! `load -> parse -> run`: [`lex`] turns source text into a token tree,
//! [`parser::parse_program`] resolves it into an AST with every name
//! already bound to a stack slot, [`validator::validate`] checks widths
//! and call graphs, [`optimizer::optimize`] folds constant subexpressions,
//! and [`evaluator::run`] interprets the result.

pub mod ast;
pub mod builtins;
pub mod constlevel;
pub mod debug;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod namestack;
pub mod optimizer;
pub mod parser;
pub mod token;
pub mod validator;

pub use error::{Error, Result};

/// Run the full pipeline over `source` against the process's real stdio.
/// `filename` is used only for diagnostics.
pub fn run_source(source: &str, filename: &str) -> Result<()> {
    let program = compile(source, filename)?;
    evaluator::run(&program)
}

/// Run the full pipeline with captured stdin/stdout, for tests and
/// embedders that don't want to touch the real process streams.
pub fn run_source_with_io(source: &str, filename: &str, stdin: &[u8]) -> Result<Vec<u8>> {
    let program = compile(source, filename)?;
    evaluator::run_with_io(&program, stdin)
}

/// Lex, parse, validate and optimize `source` without running it.
pub fn compile(source: &str, filename: &str) -> Result<ast::Program> {
    let tokens = lexer::lex(source, filename)?;
    let mut program = parser::parse_program(tokens, filename)?;
    validator::validate(&program)?;
    optimizer::optimize(&mut program);
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_bit() {
        let out = run_source_with_io("function main() { putb(1); }", "t", &[]).unwrap();
        assert_eq!(out, b"1");
    }

    #[test]
    fn identity_via_declaration() {
        let src = "function identity(a : b) { b = a; } function main() { var x = identity(1); putb(x); }";
        let out = run_source_with_io(src, "t", &[]).unwrap();
        assert_eq!(out, b"1");
    }

    #[test]
    fn character_expansion_round_trips_through_putc() {
        let src = "function main() { var c[8] = 'A'; putc(c); }";
        let out = run_source_with_io(src, "t", &[]).unwrap();
        assert_eq!(out, b"A");
    }

    #[test]
    fn compile_rejects_invalid_program_before_running() {
        assert!(compile("function main() { undeclared(); }", "t").is_err());
    }
}
