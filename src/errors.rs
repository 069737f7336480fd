//! Error types for the diffeq-codegen crate.
//!
//! This module defines the error types that can occur while parsing units and
//! expressions, building a system of model equations, and generating code from it.
//! The main error types are:
//!
//! - `UnitError`: Errors while parsing a unit specification
//! - `DimensionMismatchError`: Two physical dimensions that were required to agree did not
//! - `ExpressionError`: Errors during parsing and analysis of a single expression
//! - `EquationError`: High-level errors when parsing and validating a system of equations
//! - `CodegenError`: Errors raised by code generation backends and code objects
//!
//! Each error type implements the standard Error trait and provides detailed error messages.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

use crate::{codegen::LanguageId, equations::EquationKind, units::Dimension};

/// Errors that can occur while parsing a unit specification such as `volt/second`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    /// The unit name is not known to the unit registry
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
    /// The unit text could not be parsed into a product of units
    #[error("Invalid unit specification: {0}")]
    InvalidUnit(String),
}

/// Two physical dimensions that had to be equal were not.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{description} ({dim1} vs {dim2})")]
pub struct DimensionMismatchError {
    pub description: String,
    pub dim1: Dimension,
    pub dim2: Dimension,
}

impl DimensionMismatchError {
    pub fn new(description: impl Into<String>, dim1: Dimension, dim2: Dimension) -> Self {
        Self {
            description: description.into(),
            dim1,
            dim2,
        }
    }
}

/// Errors that can occur when parsing or analyzing a single expression.
///
/// Parsing goes through evalexpr and a conversion into our own expression tree; both
/// stages report through this enum, as do unit and stochastic analyses.
#[derive(Error, Debug)]
pub enum ExpressionError {
    /// Error when parsing the expression string with evalexpr
    #[error("Failed to parse expression: {0}")]
    Parse(#[from] EvalexprError<DefaultNumericTypes>),
    /// Error when encountering an operator that is not supported by our implementation
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when an identifier can neither be found in the model nor in the namespace
    #[error("Unresolved identifier: {0}")]
    UnresolvedIdentifier(String),
    /// Error when the expression is not dimensionally consistent
    #[error("Inconsistent units: {0}")]
    DimensionMismatch(#[from] DimensionMismatchError),
    /// Error when a term containing the noise symbol is not linear in it
    #[error("Expression {0} is not linear in the stochastic symbol")]
    NonLinearStochastic(String),
}

/// High-level errors that can occur when working with a system of model equations.
///
/// This enum represents the ways that parsing and validating equations can fail. It
/// wraps lower-level errors from the unit and expression stages together with the
/// name of the equation they occurred in.
#[derive(Debug, Error)]
pub enum EquationError {
    /// The equation text does not match the grammar
    #[error("Parsing failed at line {line}, column {column}: {message}\n{text}")]
    Syntax {
        line: usize,
        column: usize,
        text: String,
        message: String,
    },
    /// A variable was declared more than once
    #[error("Duplicate definition of variable \"{0}\"")]
    DuplicateName(String),
    /// A declared name was rejected by an identifier check
    #[error("\"{name}\" is not a valid variable name: {reason}")]
    InvalidIdentifier { name: String, reason: String },
    /// The noise symbol appears outside of a differential equation
    #[error("The equation defining {name} contains the symbol xi but is not a differential equation")]
    StochasticOutsideDifferential { name: String },
    /// The noise symbol appears in more than one differential equation
    #[error("The equation defining {name} contains the symbol xi, but it is already used in the equation defining {previous}")]
    StochasticInTwoEquations { name: String, previous: String },
    /// The static equations depend on each other in a cycle
    #[error("Cannot resolve dependencies between static equations, dependencies contain a cycle: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    /// An equation's right-hand side has units that do not match its declaration
    #[error("{kind} defining {name} does not use consistent units: {source}")]
    DimensionMismatch {
        name: String,
        kind: EquationKind,
        source: DimensionMismatchError,
    },
    /// Flags were given for an equation kind that does not accept any
    #[error("Equations of type \"{kind}\" cannot have any flags")]
    FlagsNotAllowed { kind: EquationKind },
    /// A flag is not in the whitelist for the equation kind
    #[error("Equations of type \"{kind}\" cannot have a flag \"{flag}\", only the following flags are allowed: {}", .allowed.join(", "))]
    FlagNotAllowed {
        kind: EquationKind,
        flag: String,
        allowed: Vec<String>,
    },
    /// An equation record is internally inconsistent
    #[error("Invalid equation {name}: {reason}")]
    InvalidEquation { name: String, reason: String },
    /// The unit of an equation could not be parsed
    #[error("Invalid unit for {name}")]
    Unit {
        name: String,
        #[source]
        source: UnitError,
    },
    /// The expression of an equation could not be parsed or analyzed
    #[error("Invalid expression for {name}: {source}")]
    Expression {
        name: String,
        source: ExpressionError,
    },
}

/// Errors raised by code generation backends and compiled code objects.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The backend does not provide the requested operation
    #[error("{operation} is not implemented for the {language} language")]
    NotImplemented {
        language: LanguageId,
        operation: &'static str,
    },
    /// A language name that does not correspond to any backend
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
    /// A line of abstract code is not a valid statement
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),
    /// The backend cannot translate the given operator
    #[error("Unsupported operator for this backend: {0}")]
    UnsupportedOperator(String),
    /// An expression in a statement could not be parsed
    #[error("Failed to translate expression")]
    Expression(#[from] ExpressionError),
    /// The generated code does not follow the shape the backend expects
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
    /// The code object was invoked before being compiled
    #[error("Code object has not been compiled")]
    NotCompiled,
    /// The code object was compiled twice
    #[error("Code object has already been compiled")]
    AlreadyCompiled,
    /// A variable needed at invocation time was not bound
    #[error("Missing binding for {0}")]
    MissingBinding(String),
    /// An index into a bound array is out of range
    #[error("Index {index} out of range for array {array} of length {len}")]
    IndexOutOfRange {
        array: String,
        index: usize,
        len: usize,
    },
    /// Error raised by evalexpr while parsing or evaluating generated code
    #[error("Evaluation failed: {0}")]
    Evalexpr(#[from] EvalexprError<DefaultNumericTypes>),
}
