//! Executable code objects.
//!
//! A [`CodeObject`] goes through three phases. It is created by a backend from the
//! generated code and the compile hooks of the functions the code uses. It is then
//! compiled once with a [`CodeNamespace`], which runs every hook and lets the backend
//! prepare the code. Finally it is invoked any number of times with [`Bindings`] that
//! supply and receive the values of the variables the code works on.

use std::{collections::BTreeMap, fmt};

use log::debug;
use rayon::prelude::*;

use super::{specifiers::NativeFn, templating::Code, LanguageId};
use crate::{backends::vector::Vector, errors::CodegenError, expression::Namespace};

/// Values and functions available to generated code at run time.
#[derive(Clone, Default)]
pub struct CodeNamespace {
    scalars: BTreeMap<String, f64>,
    functions: BTreeMap<String, (usize, NativeFn)>,
}

impl CodeNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a namespace holding the SI values of `namespace`, e.g. the
    /// result of resolving a system of equations.
    pub fn from_namespace(namespace: &Namespace) -> Self {
        Self {
            scalars: namespace
                .iter()
                .map(|(name, quantity)| (name.clone(), quantity.value))
                .collect(),
            functions: BTreeMap::new(),
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert_scalar(name, value);
        self
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.scalars.insert(name.into(), value);
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scalars.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn insert_function(&mut self, name: impl Into<String>, arity: usize, fun: NativeFn) {
        self.functions.insert(name.into(), (arity, fun));
    }

    /// Returns the arity and implementation of a registered function.
    pub fn function(&self, name: &str) -> Option<(usize, &NativeFn)> {
        self.functions.get(name).map(|(arity, fun)| (*arity, fun))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, usize, &NativeFn)> {
        self.functions
            .iter()
            .map(|(name, (arity, fun))| (name.as_str(), *arity, fun))
    }
}

impl fmt::Debug for CodeNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeNamespace")
            .field("scalars", &self.scalars)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A setup step run against the namespace when a code object is compiled.
pub type CompileHook = Box<dyn Fn(&mut CodeNamespace) -> Result<(), CodegenError> + Send + Sync>;

/// The value bound to a variable when invoking a code object.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Scalar(f64),
    Int(i64),
    Array(Vec<f64>),
    IndexArray(Vec<usize>),
}

/// Variable bindings for one invocation of a code object. Arrays written by the
/// code are updated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Binding) {
        self.values.insert(name.into(), value);
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, Binding::Scalar(value));
        self
    }

    pub fn with_int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.set(name, Binding::Int(value));
        self
    }

    /// Binds a copy of `values` as an array.
    pub fn with_array<V: Vector>(mut self, name: impl Into<String>, values: &V) -> Self {
        self.set(name, Binding::Array(values.as_slice().to_vec()));
        self
    }

    pub fn with_index_array(mut self, name: impl Into<String>, indices: Vec<usize>) -> Self {
        self.set(name, Binding::IndexArray(indices));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The value of a scalar or integer binding.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            Binding::Scalar(value) => Some(*value),
            Binding::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// The value of an integer binding, or of a scalar binding holding a whole number.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            Binding::Int(value) => Some(*value),
            Binding::Scalar(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&[f64]> {
        match self.values.get(name)? {
            Binding::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, name: &str) -> Option<&mut [f64]> {
        match self.values.get_mut(name)? {
            Binding::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn index_array(&self, name: &str) -> Option<&[usize]> {
        match self.values.get(name)? {
            Binding::IndexArray(indices) => Some(indices),
            _ => None,
        }
    }

    /// Copies an array binding into a new vector of type `V`. Returns `None` if
    /// there is no such array or `V` cannot hold its length.
    pub fn array_as<V: Vector>(&self, name: &str) -> Option<V> {
        V::from_slice(self.array(name)?)
    }
}

/// Runs the code of a code object. Implemented by every backend.
pub trait Executor: Send + Sync {
    /// Prepares the code for execution, called once when the code object is compiled.
    fn prepare(&mut self, _code: &Code, _namespace: &CodeNamespace) -> Result<(), CodegenError> {
        Ok(())
    }

    /// Runs the prepared code against `bindings`.
    fn execute(
        &self,
        namespace: &CodeNamespace,
        bindings: &mut Bindings,
    ) -> Result<(), CodegenError>;
}

/// Executor of backends whose code cannot be run in process.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedExecutor {
    pub language: LanguageId,
}

impl Executor for UnsupportedExecutor {
    fn execute(
        &self,
        _namespace: &CodeNamespace,
        _bindings: &mut Bindings,
    ) -> Result<(), CodegenError> {
        Err(CodegenError::NotImplemented {
            language: self.language,
            operation: "code execution",
        })
    }
}

/// Generated code together with what is needed to run it.
pub struct CodeObject {
    language: LanguageId,
    code: Code,
    compile_methods: Vec<CompileHook>,
    namespace: Option<CodeNamespace>,
    executor: Box<dyn Executor>,
}

impl CodeObject {
    pub fn new(
        language: LanguageId,
        code: Code,
        compile_methods: Vec<CompileHook>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self {
            language,
            code,
            compile_methods,
            namespace: None,
            executor,
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn language(&self) -> LanguageId {
        self.language
    }

    /// The namespace the code object was compiled with.
    pub fn namespace(&self) -> Option<&CodeNamespace> {
        self.namespace.as_ref()
    }

    pub fn is_compiled(&self) -> bool {
        self.namespace.is_some()
    }

    /// Compiles the code object with `namespace`.
    ///
    /// Every compile hook is run against the namespace in order, then the backend
    /// prepares the code. A code object can only be compiled once.
    pub fn compile(&mut self, mut namespace: CodeNamespace) -> Result<(), CodegenError> {
        if self.namespace.is_some() {
            return Err(CodegenError::AlreadyCompiled);
        }
        for hook in &self.compile_methods {
            hook(&mut namespace)?;
        }
        self.executor.prepare(&self.code, &namespace)?;
        debug!(
            "Compiled {} code object with {} hooks",
            self.language,
            self.compile_methods.len()
        );
        self.namespace = Some(namespace);
        Ok(())
    }

    /// Runs the compiled code against `bindings`.
    pub fn invoke(&self, bindings: &mut Bindings) -> Result<(), CodegenError> {
        let namespace = self.namespace.as_ref().ok_or(CodegenError::NotCompiled)?;
        self.executor.execute(namespace, bindings)
    }

    /// Runs the compiled code against several independent groups of bindings in
    /// parallel. Stops at the first error.
    pub fn invoke_parallel(&self, groups: &mut [Bindings]) -> Result<(), CodegenError> {
        let namespace = self.namespace.as_ref().ok_or(CodegenError::NotCompiled)?;
        groups
            .par_iter_mut()
            .try_for_each(|bindings| self.executor.execute(namespace, bindings))
    }
}

impl fmt::Debug for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeObject")
            .field("language", &self.language)
            .field("code", &self.code)
            .field("compile_methods", &self.compile_methods.len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::units::lookup_unit;

    /// Doubles the array `x` and adds the namespace scalar `offset`.
    struct DoubleExecutor;

    impl Executor for DoubleExecutor {
        fn execute(
            &self,
            namespace: &CodeNamespace,
            bindings: &mut Bindings,
        ) -> Result<(), CodegenError> {
            let offset = namespace.scalar("offset").unwrap_or(0.0);
            let values = bindings
                .array_mut("x")
                .ok_or_else(|| CodegenError::MissingBinding("x".to_string()))?;
            values.iter_mut().for_each(|v| *v = 2.0 * *v + offset);
            Ok(())
        }
    }

    fn code_object(hooks: Vec<CompileHook>) -> CodeObject {
        CodeObject::new(
            LanguageId::Evalexpr,
            Code::from("x = 2 * x + offset"),
            hooks,
            Box::new(DoubleExecutor),
        )
    }

    #[test]
    fn test_lifecycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let hook: CompileHook = Box::new(move |namespace| {
            counter.fetch_add(1, Ordering::SeqCst);
            namespace.insert_scalar("offset", 1.0);
            Ok(())
        });
        let mut object = code_object(vec![hook]);

        let mut bindings = Bindings::new().with_array("x", &vec![1.0, 2.0]);
        assert!(matches!(
            object.invoke(&mut bindings),
            Err(CodegenError::NotCompiled)
        ));

        object.compile(CodeNamespace::new()).unwrap();
        assert!(object.is_compiled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(object.namespace().unwrap().scalar("offset"), Some(1.0));

        object.invoke(&mut bindings).unwrap();
        object.invoke(&mut bindings).unwrap();
        assert_eq!(bindings.array("x").unwrap(), &[7.0, 11.0]);

        assert!(matches!(
            object.compile(CodeNamespace::new()),
            Err(CodegenError::AlreadyCompiled)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_hook() {
        let hook: CompileHook = Box::new(|_| Err(CodegenError::MissingBinding("f".to_string())));
        let mut object = code_object(vec![hook]);
        assert!(object.compile(CodeNamespace::new()).is_err());
        assert!(!object.is_compiled());
    }

    #[test]
    fn test_invoke_parallel() {
        let mut object = code_object(Vec::new());
        object.compile(CodeNamespace::new()).unwrap();
        let mut groups: Vec<Bindings> = (0..16)
            .map(|i| Bindings::new().with_array("x", &vec![i as f64; 3]))
            .collect();
        object.invoke_parallel(&mut groups).unwrap();
        for (i, bindings) in groups.iter().enumerate() {
            assert_eq!(bindings.array("x").unwrap(), &[2.0 * i as f64; 3]);
        }

        groups.push(Bindings::new());
        assert!(matches!(
            object.invoke_parallel(&mut groups),
            Err(CodegenError::MissingBinding(_))
        ));
    }

    #[test]
    fn test_unsupported_executor() {
        let mut object = CodeObject::new(
            LanguageId::Cpp,
            Code::from(""),
            Vec::new(),
            Box::new(UnsupportedExecutor {
                language: LanguageId::Cpp,
            }),
        );
        object.compile(CodeNamespace::new()).unwrap();
        assert!(matches!(
            object.invoke(&mut Bindings::new()),
            Err(CodegenError::NotImplemented { language: LanguageId::Cpp, .. })
        ));
    }

    #[test]
    fn test_namespace_from_quantities() {
        let namespace: Namespace = [("tau".to_string(), 10.0 * lookup_unit("ms").unwrap())]
            .into_iter()
            .collect();
        let namespace = CodeNamespace::from_namespace(&namespace);
        assert!((namespace.scalar("tau").unwrap() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_bindings() {
        let bindings = Bindings::new()
            .with_scalar("dt", 0.1)
            .with_int("n", 3)
            .with_array("v", &[1.0, 2.0, 3.0])
            .with_index_array("spikes", vec![0, 2]);
        assert_eq!(bindings.scalar("dt"), Some(0.1));
        assert_eq!(bindings.scalar("n"), Some(3.0));
        assert_eq!(bindings.int("n"), Some(3));
        assert_eq!(bindings.int("dt"), None);
        assert_eq!(bindings.index_array("spikes"), Some(&[0, 2][..]));
        assert_eq!(bindings.array("spikes"), None);
        let v: Vec<f64> = bindings.array_as("v").unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
        let fixed: [f64; 3] = bindings.array_as("v").unwrap();
        assert_eq!(fixed, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_array_as_length_mismatch() {
        let bindings = Bindings::new().with_array("v", &vec![1.0, 2.0]);
        assert_eq!(bindings.array_as::<[f64; 3]>("v"), None);
        assert_eq!(bindings.array_as::<[f64; 2]>("v"), Some([1.0, 2.0]));
        assert_eq!(bindings.array_as::<Vec<f64>>("w"), None);
    }
}
