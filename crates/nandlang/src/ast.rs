//! The syntax tree produced by the parser.
//!
//! Grounded on `original_source/src/expression.h` and `statement.h`, but
//! collapsed from open class hierarchies (`Expression` subclassed by
//! `ExpressionNand`, `ExpressionFunction`, ... ) into closed Rust enums.
//! Variable and array references carry their resolved stack slot directly: slot
//! resolution happens once, during parsing, via [`crate::namestack::NameStack`],
//! so nothing downstream ever looks a name up again.

use std::rc::Rc;

use crate::debug::DebugInfo;

#[derive(Debug, Clone)]
pub enum Expression {
    Nand {
        left: Box<Expression>,
        right: Box<Expression>,
        info: DebugInfo,
    },
    /// A call to a named function (internal or external/builtin).
    Call {
        name: Rc<str>,
        args: Vec<Expression>,
        info: DebugInfo,
    },
    /// A variable reference. `size` is 1 for a scalar and the declared
    /// length for a bare array reference (`arr` used where its whole
    /// width is expected, e.g. passed to a function or compared whole).
    Variable {
        slot: usize,
        size: usize,
        name: Rc<str>,
        info: DebugInfo,
    },
    /// `name[index]`. The index is always a compile-time constant - the
    /// lexer only ever produces a bare [`crate::token::TokenKind::Index`]
    /// value inside brackets, never a nested expression, so there is
    /// nothing to evaluate here at run time.
    ArrayIndex {
        slot: usize,
        index: u64,
        name: Rc<str>,
        info: DebugInfo,
    },
    Literal {
        value: bool,
        info: DebugInfo,
    },
    LiteralArray {
        values: Vec<bool>,
        info: DebugInfo,
    },
}

impl Expression {
    pub fn info(&self) -> &DebugInfo {
        match self {
            Expression::Nand { info, .. }
            | Expression::Call { info, .. }
            | Expression::Variable { info, .. }
            | Expression::ArrayIndex { info, .. }
            | Expression::Literal { info, .. }
            | Expression::LiteralArray { info, .. } => info,
        }
    }

    /// Number of boolean values this expression statically produces, for
    /// every kind except a function call - a call's output count depends on
    /// the function being called and is resolved by the validator, which
    /// has access to the function table.
    pub fn static_output_count(&self) -> Option<usize> {
        match self {
            Expression::Nand { .. } | Expression::Literal { .. } => Some(1),
            Expression::Variable { size, .. } => Some(*size),
            Expression::ArrayIndex { .. } => Some(1),
            Expression::LiteralArray { values, .. } => Some(values.len()),
            Expression::Call { .. } => None,
        }
    }
}

/// The slot(s) an assignment or `var` declaration writes to.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// `_`: discard exactly one corresponding output value.
    Ignore,
    /// A bare name, writing `size` consecutive bits starting at `slot`.
    Variable {
        slot: usize,
        size: usize,
        name: Rc<str>,
    },
    /// `name[index]`: writes exactly one bit. `slot` is already offset by
    /// `index`, so the evaluator never needs `index` to address it - it is
    /// kept around only for diagnostics.
    ArrayIndex {
        slot: usize,
        index: u64,
        name: Rc<str>,
    },
}

impl AssignTarget {
    pub fn width(&self) -> usize {
        match self {
            AssignTarget::Ignore | AssignTarget::ArrayIndex { .. } => 1,
            AssignTarget::Variable { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// `a, b[i], _ = expr1, expr2, ...;` - the right-hand side is a
    /// comma-separated list of expressions whose output widths sum to the
    /// total target width, not a single expression.
    Assign {
        targets: Vec<AssignTarget>,
        values: Vec<Expression>,
        info: DebugInfo,
    },
    /// `var a, b[4] = expr1, expr2, ...;` or a bare `var a, b[4];`, in which
    /// case `values` is empty.
    VarDecl {
        targets: Vec<AssignTarget>,
        values: Vec<Expression>,
        info: DebugInfo,
    },
    If {
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
        info: DebugInfo,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        info: DebugInfo,
    },
    /// A call made purely for its side effects, its outputs all discarded.
    ExprStmt {
        expr: Expression,
        info: DebugInfo,
    },
}

impl Statement {
    pub fn info(&self) -> &DebugInfo {
        match self {
            Statement::Assign { info, .. }
            | Statement::VarDecl { info, .. }
            | Statement::If { info, .. }
            | Statement::While { info, .. }
            | Statement::ExprStmt { info, .. } => info,
        }
    }
}

/// A single parameter or return-value slot declaration in a function
/// signature: `name[size]` or bare `name` (size 1).
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    pub size: usize,
}

/// A fully parsed `function` block, before validation.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Rc<str>,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub body: Vec<Statement>,
    pub info: DebugInfo,
    /// Total stack slots used by locals (inputs + outputs + declared vars),
    /// filled in once the whole body has been parsed against a NameStack.
    pub frame_size: usize,
}

/// A whole parsed program: the ordered list of function declarations.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<FunctionDecl>,
}
