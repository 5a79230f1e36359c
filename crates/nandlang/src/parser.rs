//! Recursive-descent parser: token tree to [`crate::ast::Program`].
//!
//! Grounded on `original_source/src/compiler.cpp`, which walks the same
//! token tree shape this crate's lexer produces and resolves names against
//! a `NameStack` as it goes, rather than in a separate pass. This port
//! keeps that one-pass design: every `Variable`/`ArrayIndex` expression and
//! every assignment target already carries its resolved stack slot by the
//! time `parse_program` returns.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::{AssignTarget, Expression, FunctionDecl, Param, Program, Statement};
use crate::debug::DebugInfo;
use crate::error::{Error, Result};
use crate::namestack::{NameStack, IGNORE_SLOT};
use crate::token::{Token, TokenKind};

struct Cursor {
    tokens: VecDeque<Token>,
    last_info: DebugInfo,
}

impl Cursor {
    fn new(tokens: Vec<Token>, fallback: DebugInfo) -> Self {
        Cursor {
            tokens: tokens.into(),
            last_info: fallback,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens.front().map(|t| &t.kind).unwrap_or(&TokenKind::None)
    }

    fn peek_info(&self) -> DebugInfo {
        self.tokens
            .front()
            .map(|t| t.info.clone())
            .unwrap_or_else(|| self.last_info.clone())
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens.pop_front().expect("bump on empty cursor");
        self.last_info = tok.info.clone();
        tok
    }

    fn expect(&mut self, want: impl Fn(&TokenKind) -> bool, what: &str) -> Result<Token> {
        if want(self.peek()) {
            Ok(self.bump())
        } else {
            let got = self.peek().describe();
            Err(Error::located(
                self.peek_info(),
                format!("Expected {what}, got {got}"),
            ))
        }
    }
}

/// Parse a complete token tree into a [`Program`].
pub fn parse_program(tokens: Vec<Token>, filename: &str) -> Result<Program> {
    let eof = DebugInfo::start(Rc::from(filename));
    let mut cursor = Cursor::new(tokens, eof);
    let mut parser = Parser {
        names: NameStack::new(),
    };
    let mut functions = Vec::new();
    while !cursor.is_empty() {
        functions.push(parser.parse_function(&mut cursor)?);
    }
    Ok(Program { functions })
}

struct Parser {
    names: NameStack,
}

impl Parser {
    fn parse_function(&mut self, cursor: &mut Cursor) -> Result<FunctionDecl> {
        let info = cursor.peek_info();
        cursor.expect(|k| matches!(k, TokenKind::Function), "'function'")?;
        let name_tok = cursor.expect(|k| matches!(k, TokenKind::Identifier(_)), "function name")?;
        let name: Rc<str> = Rc::from(name_tok.identifier().unwrap());

        let params_tok = cursor.expect(
            |k| matches!(k, TokenKind::Parenthesis(_)),
            "'(' after function name",
        )?;
        let param_info = params_tok.info.clone();
        let mut param_cursor = Cursor::new(params_tok.into_block(), param_info);
        let inputs = self.parse_param_list(&mut param_cursor)?;
        let outputs = if matches!(param_cursor.peek(), TokenKind::IoSep) {
            param_cursor.bump();
            self.parse_param_list(&mut param_cursor)?
        } else {
            Vec::new()
        };
        if !param_cursor.is_empty() {
            return Err(Error::located(
                param_cursor.peek_info(),
                "Unexpected tokens after output list".to_string(),
            ));
        }

        self.names.reset();
        for p in &inputs {
            self.names.declare(&p.name, p.size);
        }
        for p in &outputs {
            self.names.declare(&p.name, p.size);
        }

        let body_tok = cursor.expect(|k| matches!(k, TokenKind::Block(_)), "function body")?;
        let body_info = body_tok.info.clone();
        let mut body_cursor = Cursor::new(body_tok.into_block(), body_info);
        let body = self.parse_statements(&mut body_cursor)?;
        let frame_size = self.names.frame_size();

        Ok(FunctionDecl {
            name,
            inputs,
            outputs,
            body,
            info,
            frame_size,
        })
    }

    fn parse_param_list(&mut self, cursor: &mut Cursor) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        loop {
            match cursor.peek() {
                TokenKind::Identifier(_) => {}
                _ => break,
            }
            let name_tok = cursor.bump();
            let name = name_tok.identifier().unwrap().to_string();
            let size = if matches!(cursor.peek(), TokenKind::Index(_)) {
                cursor.bump().value().unwrap() as usize
            } else {
                1
            };
            params.push(Param { name: Rc::from(name.as_str()), size });
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.bump();
            } else {
                break;
            }
        }
        Ok(params)
    }

    /// Parse statements until the cursor (a block's token list) is empty.
    fn parse_statements(&mut self, cursor: &mut Cursor) -> Result<Vec<Statement>> {
        self.names.push_scope();
        let mut statements = Vec::new();
        while !cursor.is_empty() {
            if matches!(cursor.peek(), TokenKind::For) {
                self.parse_for(cursor, &mut statements)?;
            } else {
                statements.push(self.parse_statement(cursor)?);
            }
        }
        self.names.pop_scope();
        Ok(statements)
    }

    fn parse_statement(&mut self, cursor: &mut Cursor) -> Result<Statement> {
        match cursor.peek() {
            TokenKind::Var => self.parse_var_decl(cursor),
            TokenKind::If => self.parse_if(cursor),
            TokenKind::While => self.parse_while(cursor),
            TokenKind::For => unreachable!("'for' is expanded in parse_statements"),
            _ => self.parse_assign_or_expr_stmt(cursor),
        }
    }

    fn parse_var_decl(&mut self, cursor: &mut Cursor) -> Result<Statement> {
        let info = cursor.peek_info();
        cursor.bump(); // 'var'
        let mut targets = Vec::new();
        loop {
            targets.push(self.parse_decl_target(cursor)?);
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.bump();
            } else {
                break;
            }
        }
        let values = if matches!(cursor.peek(), TokenKind::Assign) {
            cursor.bump();
            self.parse_expression_list(cursor)?
        } else {
            Vec::new()
        };
        cursor.expect(|k| matches!(k, TokenKind::LineSep), "';'")?;
        Ok(Statement::VarDecl { targets, values, info })
    }

    /// A `var` declaration target: a fresh name, optionally sized. Unlike
    /// assignment targets this can never be `_` or an existing array
    /// element - it always allocates a new slot.
    fn parse_decl_target(&mut self, cursor: &mut Cursor) -> Result<AssignTarget> {
        let name_tok = cursor.expect(|k| matches!(k, TokenKind::Identifier(_)), "variable name")?;
        let name = name_tok.identifier().unwrap().to_string();
        let size = if matches!(cursor.peek(), TokenKind::Index(_)) {
            cursor.bump().value().unwrap() as usize
        } else {
            1
        };
        let slot = self.names.declare(&name, size);
        Ok(AssignTarget::Variable { slot, size, name: Rc::from(name.as_str()) })
    }

    fn parse_if(&mut self, cursor: &mut Cursor) -> Result<Statement> {
        let info = cursor.peek_info();
        cursor.bump(); // 'if'
        let cond_tok = cursor.expect(|k| matches!(k, TokenKind::Parenthesis(_)), "'(' after 'if'")?;
        let cond_info = cond_tok.info.clone();
        let mut cond_cursor = Cursor::new(cond_tok.into_block(), cond_info);
        let condition = self.parse_nand_expr(&mut cond_cursor)?;
        if !cond_cursor.is_empty() {
            return Err(Error::located(cond_cursor.peek_info(), "Unexpected tokens in 'if' condition".to_string()));
        }
        let then_tok = cursor.expect(|k| matches!(k, TokenKind::Block(_)), "'if' body")?;
        let then_info = then_tok.info.clone();
        let mut then_cursor = Cursor::new(then_tok.into_block(), then_info);
        let then_block = self.parse_statements(&mut then_cursor)?;

        let else_block = if matches!(cursor.peek(), TokenKind::Else) {
            cursor.bump();
            if matches!(cursor.peek(), TokenKind::If) {
                Some(vec![self.parse_if(cursor)?])
            } else {
                let else_tok = cursor.expect(|k| matches!(k, TokenKind::Block(_)), "'else' body")?;
                let else_info = else_tok.info.clone();
                let mut else_cursor = Cursor::new(else_tok.into_block(), else_info);
                Some(self.parse_statements(&mut else_cursor)?)
            }
        } else {
            None
        };

        Ok(Statement::If { condition, then_block, else_block, info })
    }

    fn parse_while(&mut self, cursor: &mut Cursor) -> Result<Statement> {
        let info = cursor.peek_info();
        cursor.bump(); // 'while'
        let cond_tok = cursor.expect(|k| matches!(k, TokenKind::Parenthesis(_)), "'(' after 'while'")?;
        let cond_info = cond_tok.info.clone();
        let mut cond_cursor = Cursor::new(cond_tok.into_block(), cond_info);
        let condition = self.parse_nand_expr(&mut cond_cursor)?;
        if !cond_cursor.is_empty() {
            return Err(Error::located(cond_cursor.peek_info(), "Unexpected tokens in 'while' condition".to_string()));
        }
        let body_tok = cursor.expect(|k| matches!(k, TokenKind::Block(_)), "'while' body")?;
        let body_info = body_tok.info.clone();
        let mut body_cursor = Cursor::new(body_tok.into_block(), body_info);
        let body = self.parse_statements(&mut body_cursor)?;
        Ok(Statement::While { condition, body, info })
    }

    /// `for i, start, end[, step] { ... }`. `original_source/src/statement.h`
    /// declares a `StatementFor` but no available revision gives it a body;
    /// this grammar desugars directly into a `While`
    /// over a hidden counter so the evaluator never needs to know `for`
    /// exists. `start`/`end`/`step` must each be single-output constant
    /// expressions; `step` defaults to a literal `1`.
    /// Desugars into two statements appended to `out`: a `var` declaration
    /// that seeds the hidden counter with `start`, and a `while` that tests
    /// `counter != end` and increments the counter by flipping its single
    /// bit each iteration (this minimal grammar only supports a one-bit
    /// counter, so `start`/`end`/`step` are each restricted to a single
    /// output). `step` is parsed and validated as a
    /// single-output constant expression but otherwise unused - with a
    /// one-bit counter, any nonzero step just means "flip it", which is
    /// what the loop body already does.
    fn parse_for(&mut self, cursor: &mut Cursor, out: &mut Vec<Statement>) -> Result<()> {
        let info = cursor.peek_info();
        cursor.bump(); // 'for'
        let name_tok = cursor.expect(|k| matches!(k, TokenKind::Identifier(_)), "loop variable name")?;
        let var_name = name_tok.identifier().unwrap().to_string();
        cursor.expect(|k| matches!(k, TokenKind::Comma), "','")?;

        let start = self.parse_nand_expr(cursor)?;
        cursor.expect(|k| matches!(k, TokenKind::Comma), "','")?;
        let end = self.parse_nand_expr(cursor)?;
        if matches!(cursor.peek(), TokenKind::Comma) {
            cursor.bump();
            let _step = self.parse_nand_expr(cursor)?;
        }

        self.names.push_scope();
        let counter_slot = self.names.declare(&var_name, 1);
        let counter_name: Rc<str> = Rc::from(var_name.as_str());

        out.push(Statement::VarDecl {
            targets: vec![AssignTarget::Variable { slot: counter_slot, size: 1, name: counter_name.clone() }],
            values: vec![start],
            info: info.clone(),
        });

        let body_tok = cursor.expect(|k| matches!(k, TokenKind::Block(_)), "'for' body")?;
        let body_info = body_tok.info.clone();
        let mut body_cursor = Cursor::new(body_tok.into_block(), body_info);
        let mut body = self.parse_statements(&mut body_cursor)?;

        let nand = |a: Expression, b: Expression| Expression::Nand { left: Box::new(a), right: Box::new(b), info: info.clone() };
        let counter_ref = || Expression::Variable { slot: counter_slot, size: 1, name: counter_name.clone(), info: info.clone() };
        let not = |e: Expression| nand(e.clone(), e);
        let xor = |a: Expression, b: Expression| {
            let ab = nand(a.clone(), b.clone());
            nand(nand(a, ab.clone()), nand(b, ab))
        };

        body.push(Statement::Assign {
            targets: vec![AssignTarget::Variable { slot: counter_slot, size: 1, name: counter_name.clone() }],
            values: vec![not(counter_ref())],
            info: info.clone(),
        });

        self.names.pop_scope();

        out.push(Statement::While {
            condition: xor(counter_ref(), end),
            body,
            info,
        });
        Ok(())
    }

    fn parse_assign_or_expr_stmt(&mut self, cursor: &mut Cursor) -> Result<Statement> {
        let info = cursor.peek_info();
        let first = self.parse_assignable_or_expr(cursor)?;

        if matches!(cursor.peek(), TokenKind::Comma | TokenKind::Assign) {
            let mut items = vec![first];
            while matches!(cursor.peek(), TokenKind::Comma) {
                cursor.bump();
                items.push(self.parse_assignable_or_expr(cursor)?);
            }
            cursor.expect(|k| matches!(k, TokenKind::Assign), "'='")?;
            let values = self.parse_expression_list(cursor)?;
            cursor.expect(|k| matches!(k, TokenKind::LineSep), "';'")?;
            let targets = items
                .into_iter()
                .map(expr_to_target)
                .collect::<Result<Vec<_>>>()?;
            Ok(Statement::Assign { targets, values, info })
        } else {
            cursor.expect(|k| matches!(k, TokenKind::LineSep), "';'")?;
            Ok(Statement::ExprStmt { expr: first, info })
        }
    }

    /// Parses either a future assignment target or a bare expression
    /// statement - the two are ambiguous until we see whether `=` follows,
    /// so both share this one parse. `_` is accepted here even though it is
    /// not a valid standalone expression; `expr_to_target` is the only
    /// place that interprets it.
    fn parse_assignable_or_expr(&mut self, cursor: &mut Cursor) -> Result<Expression> {
        if let TokenKind::Identifier(name) = cursor.peek() {
            if &**name == "_" {
                let info = cursor.peek_info();
                cursor.bump();
                return Ok(Expression::Variable { slot: IGNORE_SLOT, size: 1, name: Rc::from("_"), info });
            }
        }
        self.parse_nand_expr(cursor)
    }

    /// The right-hand side of `=`: a comma-separated list of expressions,
    /// each contributing its own output width toward the target total. A
    /// character literal's expansion into eight comma-separated `Literal`
    /// tokens falls out of this the same way a hand-written list like
    /// `f(), g()` does - each comma segment is just its own expression.
    fn parse_expression_list(&mut self, cursor: &mut Cursor) -> Result<Vec<Expression>> {
        let mut values = vec![self.parse_nand_expr(cursor)?];
        while matches!(cursor.peek(), TokenKind::Comma) {
            cursor.bump();
            values.push(self.parse_nand_expr(cursor)?);
        }
        Ok(values)
    }

    /// `term ('!' term)*`, left-associative.
    fn parse_nand_expr(&mut self, cursor: &mut Cursor) -> Result<Expression> {
        let mut left = self.parse_primary(cursor)?;
        while matches!(cursor.peek(), TokenKind::Nand) {
            let info = cursor.peek_info();
            cursor.bump();
            let right = self.parse_primary(cursor)?;
            left = Expression::Nand { left: Box::new(left), right: Box::new(right), info };
        }
        Ok(left)
    }

    fn parse_primary(&mut self, cursor: &mut Cursor) -> Result<Expression> {
        let info = cursor.peek_info();
        match cursor.peek().clone() {
            TokenKind::Literal(v) => {
                cursor.bump();
                let bits_required = required_bits(v);
                let bits_max = if matches!(cursor.peek(), TokenKind::Index(_)) {
                    cursor.bump().value().unwrap()
                } else {
                    1
                };
                if bits_required > bits_max {
                    return Err(Error::located(
                        info,
                        format!("Value {v} is too big to fit in {bits_max} bit(s)"),
                    ));
                }
                if bits_max == 1 {
                    Ok(Expression::Literal { value: v != 0, info })
                } else {
                    // Most significant bit first, matching this crate's
                    // character-literal expansion and `bits_to_byte`.
                    let values = (0..bits_max).map(|i| (v >> (bits_max - 1 - i)) & 1 != 0).collect();
                    Ok(Expression::LiteralArray { values, info })
                }
            }
            TokenKind::Parenthesis(_) => {
                let tok = cursor.bump();
                let inner_info = tok.info.clone();
                let mut inner = Cursor::new(tok.into_block(), inner_info);
                let expr = self.parse_nand_expr(&mut inner)?;
                if !inner.is_empty() {
                    return Err(Error::located(inner.peek_info(), "Unexpected tokens in parenthesized expression".to_string()));
                }
                Ok(expr)
            }
            TokenKind::Identifier(name) => {
                cursor.bump();
                if matches!(cursor.peek(), TokenKind::Parenthesis(_)) {
                    let args_tok = cursor.bump();
                    let args_info = args_tok.info.clone();
                    let mut args_cursor = Cursor::new(args_tok.into_block(), args_info);
                    let mut args = Vec::new();
                    while !args_cursor.is_empty() {
                        args.push(self.parse_nand_expr(&mut args_cursor)?);
                        if matches!(args_cursor.peek(), TokenKind::Comma) {
                            args_cursor.bump();
                        } else {
                            break;
                        }
                    }
                    if !args_cursor.is_empty() {
                        return Err(Error::located(args_cursor.peek_info(), "Unexpected tokens in argument list".to_string()));
                    }
                    Ok(Expression::Call { name, args, info })
                } else if matches!(cursor.peek(), TokenKind::Index(_)) {
                    let index = cursor.bump().value().unwrap();
                    let (slot, size) = self
                        .names
                        .lookup(&name)
                        .ok_or_else(|| Error::located(info.clone(), format!("Undeclared variable '{name}'")))?;
                    if index >= size as u64 {
                        return Err(Error::located(
                            info,
                            format!("Index {index} out of bounds for '{name}' of size {size}"),
                        ));
                    }
                    Ok(Expression::ArrayIndex { slot: slot + index as usize, index, name, info: cursor.last_info.clone() })
                } else {
                    let (slot, size) = self
                        .names
                        .lookup(&name)
                        .ok_or_else(|| Error::located(info.clone(), format!("Undeclared variable '{name}'")))?;
                    Ok(Expression::Variable { slot, size, name, info })
                }
            }
            other => Err(Error::located(info, format!("Expected an expression, got {}", other.describe()))),
        }
    }
}

/// Number of bits needed to hold `value` in plain binary (`0` takes one bit).
fn required_bits(value: u64) -> u64 {
    if value == 0 {
        1
    } else {
        64 - value.leading_zeros() as u64
    }
}

/// Convert a parsed expression back into an assignment target. Only plain
/// variable references, array element references, and the `_` sentinel are
/// valid on the left of `=`.
fn expr_to_target(expr: Expression) -> Result<AssignTarget> {
    match expr {
        Expression::Variable { slot, name, .. } if slot == IGNORE_SLOT => {
            let _ = name;
            Ok(AssignTarget::Ignore)
        }
        Expression::Variable { slot, size, name, .. } => Ok(AssignTarget::Variable { slot, size, name }),
        Expression::ArrayIndex { slot, index, name, .. } => Ok(AssignTarget::ArrayIndex { slot, index, name }),
        other => Err(Error::located(
            other.info().clone(),
            "Left-hand side of assignment must be a variable, array element, or '_'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(src: &str) -> Result<Program> {
        parse_program(lex(src, "t")?, "t")
    }

    #[test]
    fn parses_empty_function() {
        let program = parse("function main() { }").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(&*program.functions[0].name, "main");
    }

    #[test]
    fn parses_inputs_and_outputs() {
        let program = parse("function nand(a, b : out) { }").unwrap();
        let f = &program.functions[0];
        assert_eq!(f.inputs.len(), 2);
        assert_eq!(f.outputs.len(), 1);
    }

    #[test]
    fn resolves_variable_slots() {
        let program = parse("function main() { var a = 1; var b = a; }").unwrap();
        let body = &program.functions[0].body;
        assert!(matches!(body[0], Statement::VarDecl { .. }));
        match &body[1] {
            Statement::VarDecl { values, .. } if matches!(values.as_slice(), [Expression::Variable { .. }]) => {
                let Expression::Variable { slot, .. } = &values[0] else { unreachable!() };
                assert_eq!(*slot, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn undeclared_variable_is_an_error() {
        assert!(parse("function main() { var a = b; }").is_err());
    }

    #[test]
    fn array_index_out_of_bounds_is_an_error() {
        assert!(parse("function main() { var a[2]; var b = a[5]; }").is_err());
    }

    #[test]
    fn nand_chain_is_left_associative() {
        let program = parse("function main() { var a = 1 ! 0 ! 1; }").unwrap();
        match &program.functions[0].body[0] {
            Statement::VarDecl { values, .. } if matches!(values.as_slice(), [Expression::Nand { .. }]) => {
                let Expression::Nand { left, .. } = &values[0] else { unreachable!() };
                assert!(matches!(**left, Expression::Nand { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn underscore_discards_a_call_output() {
        let program = parse("function main() { _ = iogood(); }").unwrap();
        match &program.functions[0].body[0] {
            Statement::Assign { targets, .. } => {
                assert!(matches!(targets[0], AssignTarget::Ignore));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn character_literal_expands_to_eight_comma_separated_bits() {
        let program = parse("function main() { var a[8] = 'A'; }").unwrap();
        match &program.functions[0].body[0] {
            Statement::VarDecl { values, .. } => {
                assert_eq!(values.len(), 8);
                assert!(values.iter().all(|v| matches!(v, Expression::Literal { .. })));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn literal_with_index_widens_into_a_literal_array() {
        let program = parse("function main() { var a[4] = 5[4]; }").unwrap();
        match &program.functions[0].body[0] {
            Statement::VarDecl { values, .. } => {
                assert_eq!(values.len(), 1);
                match &values[0] {
                    Expression::LiteralArray { values, .. } => {
                        assert_eq!(values, &[false, true, false, true]);
                    }
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn literal_too_big_for_its_index_is_an_error() {
        assert!(parse("function main() { var a[2] = 5[2]; }").is_err());
    }

    #[test]
    fn assignment_rhs_accepts_multiple_expressions() {
        let program = parse("function id(a : b) { b = a; } function main() { var x, y = id(1), id(0); }").unwrap();
        match &program.functions[1].body[0] {
            Statement::VarDecl { values, .. } => assert_eq!(values.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
