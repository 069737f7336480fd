//! Descriptions of the variables and functions used by abstract code.
//!
//! A [`Specifiers`] table tells a backend where each name used in a block of abstract
//! code comes from: a backing array, a scalar value, a local subexpression, a loop
//! index or an externally implemented function.

use std::{collections::BTreeMap, collections::BTreeSet, fmt, sync::Arc};

use log::debug;

use super::{code_object::CodeNamespace, LanguageId};
use crate::{errors::CodegenError, utils::get_identifiers};

/// Element types of generated variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Float64,
    Int32,
    Bool,
}

/// A function implemented in Rust that generated code can call.
pub type NativeFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A function that needs backend specific setup before generated code calling it
/// can run.
pub trait UserFunction: fmt::Debug + Send + Sync {
    /// Called once per code object when it is compiled.
    ///
    /// # Arguments
    /// * `namespace` - The namespace the code object is being compiled with
    /// * `language` - The backend that generated the code
    /// * `var` - The name the function is used under
    fn on_compile(
        &self,
        namespace: &mut CodeNamespace,
        language: LanguageId,
        var: &str,
    ) -> Result<(), CodegenError>;
}

/// A user function backed by a Rust closure, registered in the namespace on compile.
#[derive(Clone)]
pub struct NativeFunction {
    arity: usize,
    fun: NativeFn,
}

impl NativeFunction {
    pub fn new<F>(arity: usize, fun: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            arity,
            fun: Arc::new(fun),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction(arity {})", self.arity)
    }
}

impl UserFunction for NativeFunction {
    fn on_compile(
        &self,
        namespace: &mut CodeNamespace,
        language: LanguageId,
        var: &str,
    ) -> Result<(), CodegenError> {
        debug!("Linking native function {var}/{} for {language}", self.arity);
        namespace.insert_function(var, self.arity, self.fun.clone());
        Ok(())
    }
}

/// Where a name used by abstract code comes from.
#[derive(Debug, Clone)]
pub enum Specifier {
    /// A function that may need compile time linkage
    Function(Arc<dyn UserFunction>),
    /// A scalar taken from the namespace or the bindings
    Value { dtype: Dtype },
    /// An element of the array `array`, selected by the index variable `index`
    ArrayVariable {
        array: String,
        index: String,
        dtype: Dtype,
    },
    /// A value produced by the code
    OutputVariable { dtype: Dtype },
    /// A named subexpression of a model
    Subexpression {
        expr: String,
        identifiers: BTreeSet<String>,
    },
    /// A loop index, `all` if it ranges over every element
    Index { all: bool },
}

impl Specifier {
    pub fn array(array: impl Into<String>, index: impl Into<String>, dtype: Dtype) -> Self {
        Specifier::ArrayVariable {
            array: array.into(),
            index: index.into(),
            dtype,
        }
    }

    pub fn subexpression(expr: &str) -> Self {
        let expr = expr.trim().to_string();
        Specifier::Subexpression {
            identifiers: get_identifiers(&expr),
            expr,
        }
    }

    pub fn function<F: UserFunction + 'static>(function: F) -> Self {
        Specifier::Function(Arc::new(function))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Specifier::ArrayVariable { .. })
    }
}

/// Specifiers keyed by the name used in abstract code.
pub type Specifiers = BTreeMap<String, Specifier>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subexpression() {
        match Specifier::subexpression("  x * y + z ") {
            Specifier::Subexpression { expr, identifiers } => {
                assert_eq!(expr, "x * y + z");
                assert_eq!(identifiers.into_iter().collect::<Vec<_>>(), vec!["x", "y", "z"]);
            }
            other => panic!("unexpected specifier {other:?}"),
        }
    }

    #[test]
    fn test_native_function_on_compile() {
        let function = NativeFunction::new(2, |args| args[0] * args[1]);
        let mut namespace = CodeNamespace::default();
        function
            .on_compile(&mut namespace, LanguageId::Evalexpr, "mul")
            .unwrap();
        let (arity, fun) = namespace.function("mul").unwrap();
        assert_eq!(arity, 2);
        assert_eq!(fun(&[3.0, 4.0]), 12.0);
    }
}
