//! Command-line driver for the Nandlang interpreter.
//!
//! Re-opens the source file on error to render the offending line plus a
//! caret pointing at the error column. Argument parsing uses `clap`'s
//! derive API; user-facing failures are reported via `eprintln!` and a
//! non-zero `ExitCode` rather than propagating a `Result` out of `main`.

use std::fs;
use std::io::Read;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use nandlang::error::Error;

const BANNER: &str = r#"!!  !!   !!    !!!    !!   !!  !!!!!    !!         !!!    !!   !!   !!!!!   !!
!!  !!!  !!   !!!!!   !!!  !!  !!  !!   !!        !!!!!   !!!  !!  !!  !!!  !!
!!  !!!! !!  !!   !!  !!!! !!  !!   !!  !!       !!   !!  !!!! !!  !!       !!
!!  !!!!!!!  !!!!!!!  !!!!!!!  !!   !!  !!       !!!!!!!  !!!!!!!  !! !!!!  !!
!!  !! !!!!  !!   !!  !! !!!!  !!   !!  !!       !!   !!  !! !!!!  !!   !!  !!
    !!  !!!  !!   !!  !!  !!!  !!  !!   !!       !!   !!  !!  !!!  !!!!!!!
!!  !!   !!  !!   !!  !!   !!  !!!!!    !!!!!!!  !!   !!  !!   !!   !!! !!  !!
An esoteric programming language based on NAND completeness"#;

/// Run a Nandlang script.
#[derive(Parser, Debug)]
#[command(name = "nandlang", about = "An esoteric programming language based on NAND completeness")]
struct Cli {
    /// Path to the script to run. With no path, prints the banner and usage.
    script: Option<String>,

    /// Report how long parsing, validation and evaluation each took.
    #[arg(short, long)]
    bench: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(path) = cli.script else {
        println!("{BANNER}");
        println!("\nUsage:\nnandlang <path/to/script>");
        return ExitCode::SUCCESS;
    };

    let source = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not open file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let started = Instant::now();
    let program = match nandlang::compile(&source, &path) {
        Ok(p) => p,
        Err(e) => {
            report_error(&e, &path);
            return ExitCode::FAILURE;
        }
    };
    if cli.bench {
        eprintln!("compile: {:?}", started.elapsed());
    }

    let run_started = Instant::now();
    let result = nandlang::evaluator::run(&program);
    if cli.bench {
        eprintln!("run: {:?}", run_started.elapsed());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, &path);
            ExitCode::FAILURE
        }
    }
}

/// Print an error the way `handleError` does: the message, then the
/// offending source line with tabs expanded to four spaces, then a caret
/// line pointing at the error column.
fn report_error(err: &Error, path: &str) {
    println!("{err}");
    let Some(info) = err.debug_info() else {
        return;
    };
    let Ok(mut file) = fs::File::open(path) else {
        return;
    };
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return;
    }
    let Some(line) = contents.lines().nth(info.line.saturating_sub(1)) else {
        return;
    };
    let line = replace_tabs(line, 4);
    let col = info.column.saturating_sub(1).min(line.chars().count());
    let mut caret: String = std::iter::repeat('-').take(col).collect();
    caret.push('^');
    println!("{line}");
    println!("{caret}");
}

fn replace_tabs(s: &str, spaces: usize) -> String {
    s.chars()
        .flat_map(|c| {
            if c == '\t' {
                vec![' '; spaces]
            } else {
                vec![c]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_tabs_expands_each_tab() {
        assert_eq!(replace_tabs("a\tb", 4), "a    b");
    }

    #[test]
    fn replace_tabs_leaves_non_tabs_alone() {
        assert_eq!(replace_tabs("abc", 4), "abc");
    }
}
