//! Backend independent code generation.
//!
//! Abstract code is a list of single-assignment [`Statement`]s together with a
//! [`Specifiers`] table describing where each name comes from. A [`Language`]
//! translates it, embeds it in one of its loop templates and wraps the result in a
//! [`CodeObject`] that can be compiled and run.
//!
//! # Example
//! ```rust
//! use diffeq_codegen::codegen::{
//!     language, parse_statements, Bindings, CodeNamespace, Dtype, LanguageId, Specifier,
//!     Specifiers,
//! };
//!
//! let backend = language(LanguageId::Evalexpr);
//! let statements = parse_statements("v = v + dt * (-v / tau)").unwrap();
//! let specifiers: Specifiers = [
//!     ("v".to_string(), Specifier::array("_array_v", "_neuron_idx", Dtype::Float64)),
//!     ("dt".to_string(), Specifier::Value { dtype: Dtype::Float64 }),
//!     ("tau".to_string(), Specifier::Value { dtype: Dtype::Float64 }),
//! ]
//! .into_iter()
//! .collect();
//!
//! let code = backend.translate_statement_sequence(&statements, &specifiers).unwrap();
//! let code = backend.apply_template(&code, &backend.template_state_update());
//! let mut object = backend.code_object(code, &specifiers).unwrap();
//! object
//!     .compile(CodeNamespace::new().with_scalar("tau", 0.01))
//!     .unwrap();
//!
//! let mut bindings = Bindings::new()
//!     .with_array("_array_v", &vec![1.0, 2.0])
//!     .with_scalar("dt", 0.001)
//!     .with_int("_num_neurons", 2);
//! object.invoke(&mut bindings).unwrap();
//! assert!((bindings.array("_array_v").unwrap()[1] - 1.8).abs() < 1e-12);
//! ```

use std::{fmt, str::FromStr};

use crate::errors::CodegenError;

pub mod code_object;
pub mod language;
pub mod languages;
pub mod specifiers;
pub mod statements;
pub mod templating;

pub use code_object::{
    Binding, Bindings, CodeNamespace, CodeObject, CompileHook, Executor, UnsupportedExecutor,
};
pub use language::{array_read_write, inline_subexpressions, Language};
pub use languages::{cpp::CppLanguage, evalexpr::EvalexprLanguage};
pub use specifiers::{Dtype, NativeFn, NativeFunction, Specifier, Specifiers, UserFunction};
pub use statements::{parse_statements, Statement};
pub use templating::{apply_code_template, apply_template, Code, Template, CODE_SLOT, MAIN_SLOT};

/// The available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageId {
    /// Loops over evalexpr statements, run by an in-process interpreter
    Evalexpr,
    /// C++ source code
    Cpp,
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageId::Evalexpr => write!(f, "evalexpr"),
            LanguageId::Cpp => write!(f, "cpp"),
        }
    }
}

impl FromStr for LanguageId {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evalexpr" => Ok(LanguageId::Evalexpr),
            "cpp" | "c++" => Ok(LanguageId::Cpp),
            _ => Err(CodegenError::UnknownLanguage(s.to_string())),
        }
    }
}

/// Returns the backend for `id`.
pub fn language(id: LanguageId) -> Box<dyn Language> {
    match id {
        LanguageId::Evalexpr => Box::new(EvalexprLanguage),
        LanguageId::Cpp => Box::new(CppLanguage),
    }
}
