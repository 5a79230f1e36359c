//! Static checks run after parsing and before evaluation.
//!
//! Parsing already rejects undeclared names and out-of-bounds constant
//! array indices (see `parser.rs`); this pass catches everything that
//! needs the whole program in view at once: that every called function
//! exists, that argument and assignment widths line up, and that `if`/
//! `while` conditions are exactly one bit wide. Grounded on
//! `original_source/src/compiler.cpp`'s post-parse `verify` pass, which
//! performs the same checks over the same AST shape.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{AssignTarget, Expression, FunctionDecl, Program, Statement};
use crate::builtins;
use crate::error::{Error, Result};

pub struct FunctionTable<'p> {
    functions: HashMap<&'p str, &'p FunctionDecl>,
}

impl<'p> FunctionTable<'p> {
    pub fn build(program: &'p Program) -> Result<Self> {
        let mut functions = HashMap::new();
        for f in &program.functions {
            if functions.insert(&*f.name, f).is_some() {
                return Err(Error::located(f.info.clone(), format!("Function '{}' is declared twice", f.name)));
            }
        }
        Ok(FunctionTable { functions })
    }

    pub fn get(&self, name: &str) -> Option<&'p FunctionDecl> {
        self.functions.get(name).copied()
    }

    fn input_width(&self, name: &str) -> Option<usize> {
        if let Some(f) = self.get(name) {
            Some(f.inputs.iter().map(|p| p.size).sum())
        } else {
            builtins::lookup(name).map(|b| b.inputs)
        }
    }

    fn output_width(&self, name: &str) -> Option<usize> {
        if let Some(f) = self.get(name) {
            Some(f.outputs.iter().map(|p| p.size).sum())
        } else {
            builtins::lookup(name).map(|b| b.outputs)
        }
    }
}

/// Validate every function body in `program`. Requires a zero-argument,
/// zero-return `main` function as the entry point.
pub fn validate(program: &Program) -> Result<()> {
    let table = FunctionTable::build(program)?;

    let main = table
        .get("main")
        .ok_or_else(|| Error::pending("Program has no 'main' function"))?;
    if !main.inputs.is_empty() || !main.outputs.is_empty() {
        return Err(Error::located(main.info.clone(), "'main' must take no inputs and return no outputs".to_string()));
    }

    for f in &program.functions {
        validate_block(&f.body, &table)?;
    }
    Ok(())
}

fn validate_block(body: &[Statement], table: &FunctionTable) -> Result<()> {
    for stmt in body {
        validate_statement(stmt, table)?;
    }
    Ok(())
}

fn validate_statement(stmt: &Statement, table: &FunctionTable) -> Result<()> {
    match stmt {
        Statement::Assign { targets, values, info } | Statement::VarDecl { targets, values, info } if !values.is_empty() => {
            let mut width = 0;
            for value in values {
                expression_check(value, table)?;
                width += expression_width(value, table)?;
            }
            let target_width = target_width(targets);
            if width != target_width {
                return Err(Error::located(
                    info.clone(),
                    format!("Assignment has {target_width} target(s) but value(s) produce {width}"),
                ));
            }
            Ok(())
        }
        Statement::VarDecl { .. } | Statement::Assign { .. } => Ok(()),
        Statement::If { condition, then_block, else_block, info } => {
            require_single_bit(condition, table, info)?;
            validate_block(then_block, table)?;
            if let Some(else_block) = else_block {
                validate_block(else_block, table)?;
            }
            Ok(())
        }
        Statement::While { condition, body, info } => {
            require_single_bit(condition, table, info)?;
            validate_block(body, table)
        }
        Statement::ExprStmt { expr, .. } => expression_check(expr, table),
    }
}

fn target_width(targets: &[AssignTarget]) -> usize {
    targets.iter().map(AssignTarget::width).sum()
}

fn require_single_bit(expr: &Expression, table: &FunctionTable, info: &crate::debug::DebugInfo) -> Result<()> {
    expression_check(expr, table)?;
    let width = expression_width(expr, table)?;
    if width != 1 {
        return Err(Error::located(info.clone(), format!("Condition must be a single bit, got {width}")));
    }
    Ok(())
}

/// Recursively checks every nested `Call`'s name and arity, independent of
/// computing this expression's own output width.
fn expression_check(expr: &Expression, table: &FunctionTable) -> Result<()> {
    match expr {
        Expression::Nand { left, right, .. } => {
            expression_check(left, table)?;
            expression_check(right, table)?;
            let lw = expression_width(left, table)?;
            let rw = expression_width(right, table)?;
            if lw != 1 || rw != 1 {
                return Err(Error::located(
                    expr.info().clone(),
                    format!("Both sides of '!' must be a single bit, got {lw} and {rw}"),
                ));
            }
            Ok(())
        }
        Expression::Call { name, args, info } => {
            for a in args {
                expression_check(a, table)?;
            }
            let expected = table
                .input_width(name)
                .ok_or_else(|| Error::located(info.clone(), format!("Call to undeclared function '{name}'")))?;
            let mut actual = 0;
            for a in args {
                actual += expression_width(a, table)?;
            }
            if actual != expected {
                return Err(Error::located(
                    info.clone(),
                    format!("'{name}' expects {expected} input bit(s), got {actual}"),
                ));
            }
            Ok(())
        }
        Expression::Variable { .. } | Expression::ArrayIndex { .. } | Expression::Literal { .. } | Expression::LiteralArray { .. } => Ok(()),
    }
}

fn expression_width(expr: &Expression, table: &FunctionTable) -> Result<usize> {
    match expr {
        Expression::Call { name, info, .. } => table
            .output_width(name)
            .ok_or_else(|| Error::located(info.clone(), format!("Call to undeclared function '{name}'"))),
        other => Ok(other.static_output_count().unwrap_or(1)),
    }
}

pub fn all_function_names(program: &Program) -> Vec<Rc<str>> {
    program.functions.iter().map(|f| f.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse_program;

    fn check(src: &str) -> Result<()> {
        let program = parse_program(lex(src, "t").unwrap(), "t").unwrap();
        validate(&program)
    }

    #[test]
    fn requires_main() {
        assert!(check("function foo() { }").is_err());
    }

    #[test]
    fn accepts_well_formed_program() {
        assert!(check("function main() { var a = 1 ! 0; putb(a); }").is_ok());
    }

    #[test]
    fn rejects_undeclared_call() {
        assert!(check("function main() { mystery(); }").is_err());
    }

    #[test]
    fn rejects_wrong_argument_width() {
        assert!(check("function main() { putb(1, 0); }").is_err());
    }

    #[test]
    fn rejects_multi_bit_while_condition() {
        assert!(check("function main() { var a[2] = 1,0; while (a) { } }").is_err());
    }

    #[test]
    fn rejects_mismatched_assignment_width() {
        assert!(check("function main() { var a, b = 1; }").is_err());
    }
}
