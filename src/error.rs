//! Error taxonomy shared by the compiler and VM (spec §7).
//!
//! Every error carries a `kind` plus an ordered chain of [`ContextEntry`]
//! values. As an error unwinds through nested `compile`/`run` calls, each
//! frame pushes its own sub-expression's position onto the chain, so the
//! entry at the front names the innermost failing sub-expression and later
//! entries identify the surrounding expression — matching the teacher's
//! `CompileError` (`backend/bytecode/compiler/error.rs`): a plain derive'd
//! enum with a hand-written `Display`, no `thiserror`.

use std::fmt;

use crate::ast::SourcePos;

/// One link in the context chain attached to an error as it propagates.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub message: String,
    pub pos: Option<SourcePos>,
}

/// Compile-time error kinds (spec §7 taxonomy, compile-time rows).
#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    SyntaxError(String),
    SyntaxErrorExpectation(String),
    UnknownIdentifier { name: String },
    UnknownFunction { name: String, arity: usize },
    IdentifierWithFunctionParentheses { name: String },
    UnknownUnaryOperatorSymbol { symbol: String },
    UnaryOperatorNotDefined { symbol: String, operand_type: String },
    BinaryOperatorNotDefined { symbol: String, lhs_type: String, rhs_type: String },
    IncompatibleTypesInConditional { then_type: String, else_type: String },
    NamedExpressionNotFound { name: String },
    NestedExpressionNotFoundCt { name: String },
    NestedExpressionCallArgumentMismatch { expected: String, got: usize },
    NamedExpressionNotConstant,
    ExceptionInPlugin(String),
    /// A plugin's own error, surfaced unwrapped under
    /// `CompileFlags::PLUGIN_EXCEPTION_FALL_THROUGH` instead of being
    /// folded into `ExceptionInPlugin`.
    PluginExceptionRaw(String),
    /// A panic escaping a plugin hook during compile-time constant
    /// folding (spec §4.6: "non-error exceptions ... caught and re-raised
    /// wrapped with a StdExceptionInfo entry"). Not subject to either
    /// fall-through flag — this is a plugin bug, not a domain error.
    StdExceptionInfo(String),
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError(msg) => write!(f, "syntax error: {msg}"),
            Self::SyntaxErrorExpectation(msg) => write!(f, "syntax error, expected {msg}"),
            Self::UnknownIdentifier { name } => write!(f, "unknown identifier '{name}'"),
            Self::UnknownFunction { name, arity } => {
                write!(f, "unknown function '{name}' with {arity} argument(s)")
            }
            Self::IdentifierWithFunctionParentheses { name } => {
                write!(f, "'{name}()' not allowed: identifiers may not take empty parentheses here")
            }
            Self::UnknownUnaryOperatorSymbol { symbol } => {
                write!(f, "unknown unary operator symbol '{symbol}'")
            }
            Self::UnaryOperatorNotDefined { symbol, operand_type } => {
                write!(f, "unary operator '{symbol}' not defined for {operand_type}")
            }
            Self::BinaryOperatorNotDefined { symbol, lhs_type, rhs_type } => write!(
                f,
                "binary operator '{symbol}' not defined for ({lhs_type}, {rhs_type})"
            ),
            Self::IncompatibleTypesInConditional { then_type, else_type } => write!(
                f,
                "conditional branches have incompatible types: {then_type} vs {else_type}"
            ),
            Self::NamedExpressionNotFound { name } => write!(f, "named expression '{name}' not found"),
            Self::NestedExpressionNotFoundCt { name } => {
                write!(f, "nested expression '{name}' not found at compile time")
            }
            Self::NestedExpressionCallArgumentMismatch { expected, got } => write!(
                f,
                "Expression(...) called with {got} argument(s), expected {expected}"
            ),
            Self::NamedExpressionNotConstant => {
                write!(f, "name argument to Expression(...) is not a compile-time constant")
            }
            Self::ExceptionInPlugin(msg) => write!(f, "exception in plugin: {msg}"),
            Self::PluginExceptionRaw(msg) => write!(f, "{msg}"),
            Self::StdExceptionInfo(msg) => write!(f, "standard library exception: {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub chain: Vec<ContextEntry>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind) -> Self {
        CompileError { kind, chain: Vec::new() }
    }

    /// Push one more context entry, innermost-first.
    #[must_use]
    pub fn context(mut self, message: impl Into<String>, pos: SourcePos) -> Self {
        self.chain.push(ContextEntry { message: message.into(), pos: Some(pos) });
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for entry in &self.chain {
            write!(f, "\n  in {}", entry.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Evaluation-time error kinds (spec §7 taxonomy, evaluation-time rows).
#[derive(Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    NestedExpressionNotFoundEt { name: String },
    NestedExpressionResultTypeError { expected: String, got: String },
    CircularNestedExpressions { cycle: Vec<String> },
    ExceptionInCallback { message: String },
    StdExceptionInfo { message: String },
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NestedExpressionNotFoundEt { name } => {
                write!(f, "nested expression '{name}' not found at evaluation time")
            }
            Self::NestedExpressionResultTypeError { expected, got } => write!(
                f,
                "nested expression result type {got} does not match declared default type {expected}"
            ),
            Self::CircularNestedExpressions { cycle } => {
                write!(f, "circular nested expressions: {}", cycle.join(" -> "))
            }
            Self::ExceptionInCallback { message } => write!(f, "exception in callback: {message}"),
            Self::StdExceptionInfo { message } => write!(f, "standard library exception: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub chain: Vec<ContextEntry>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        EvalError { kind, chain: Vec::new() }
    }

    #[must_use]
    pub fn context(mut self, message: impl Into<String>, pos: SourcePos) -> Self {
        self.chain.push(ContextEntry { message: message.into(), pos: Some(pos) });
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for entry in &self.chain {
            write!(f, "\n  in {}", entry.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

pub type EvalResult<T> = Result<T, EvalError>;
