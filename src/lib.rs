//! Parsing, analysis and code generation for systems of model equations.
//!
//! This crate reads models written in a small equation language, checks and orders
//! them, and turns abstract code derived from them into code for a target backend.
//! Expressions are parsed with the [evalexpr](https://github.com/ISibboI/evalexpr)
//! crate and analysed symbolically.
//!
//! # Features
//!
//! - Parameters, static equations and differential equations with physical units
//! - Dependency ordering of static equations and substitution into differential equations
//! - Linearity and dimensional consistency checks
//! - Pluggable backends: an in-process evalexpr interpreter and C++ source generation
//!
//! # Example
//!
//! ```rust
//! use diffeq_codegen::Equations;
//!
//! let eqs = Equations::new(
//!     "dv/dt = -v / tau + I : volt
//!      I = w * mV / ms : volt / second
//!      w : 1 (constant)
//!      tau : second (constant)",
//! )
//! .unwrap();
//!
//! assert_eq!(eqs.diff_eq_names(), vec!["v"]);
//! assert!(eqs.is_linear().unwrap());
//! ```

pub use equations::Equations;

pub mod prelude {
    pub use crate::backends::vector::Vector;
    pub use crate::codegen::{
        language, Bindings, Code, CodeNamespace, CodeObject, Dtype, Language, LanguageId,
        Specifier, Specifiers, Statement,
    };
    pub use crate::equations::{EquationKind, Equations, EquationsOptions, SingleEquation};
    pub use crate::expr::Expr;
    pub use crate::expression::Expression;
}

/// Types that can be bound as arrays of generated code
pub mod backends {
    pub mod vector;
}
/// Code generation: languages, templates, specifiers and code objects
pub mod codegen;
/// Conversion from parsed expressions to internal AST
pub mod convert;
/// Model equations: parsing, ordering and analysis
pub mod equations;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation and symbolic differentiation
pub mod expr;
/// Expressions of the equation language with unit evaluation
pub mod expression;
/// Physical dimensions and units
pub mod units;
/// String helpers for identifiers and code
pub mod utils;
