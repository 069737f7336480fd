//! A backend generating evalexpr statements inside python-like loop headers.
//!
//! Generated code looks like
//!
//! ```text
//! for _neuron_idx in range(_num_neurons):
//!     v = v + (dt * ((-v) / tau));
//!     w = w * 0.5
//! ```
//!
//! and is run in process: the loop header is interpreted, the body is parsed once
//! into an evalexpr operator tree and evaluated for every index with the array
//! variables it reads loaded from the bindings and the ones it writes stored back.

use std::{collections::BTreeSet, sync::Arc};

use ::evalexpr::{
    build_operator_tree, Context, ContextWithMutableFunctions, ContextWithMutableVariables,
    DefaultNumericTypes, EvalexprError, Function, HashMapContext, Node, Value,
};
use log::debug;

use super::{render, Syntax};
use crate::{
    codegen::{
        code_object::{Binding, Bindings, CodeNamespace, CodeObject, Executor},
        language::{array_read_write, inline_subexpressions, Language},
        specifiers::{NativeFn, Specifier, Specifiers},
        statements::Statement,
        templating::{Code, Template, CODE_SLOT},
        LanguageId,
    },
    errors::CodegenError,
    utils::deindent,
};

/// Functions available to every generated expression.
const BUILTINS: [(&str, fn(f64) -> f64); 7] = [
    ("exp", f64::exp),
    ("ln", f64::ln),
    ("log", f64::ln),
    ("sqrt", f64::sqrt),
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("abs", f64::abs),
];

struct EvalexprSyntax;

impl Syntax for EvalexprSyntax {
    fn power(&self, base: &str, exponent: &str) -> String {
        format!("({base} ^ {exponent})")
    }
}

/// The evalexpr backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalexprLanguage;

impl Language for EvalexprLanguage {
    fn language_id(&self) -> LanguageId {
        LanguageId::Evalexpr
    }

    fn translate_expression(&self, expr: &str) -> Result<String, CodegenError> {
        render(&EvalexprSyntax, expr)
    }

    fn translate_statement(&self, statement: &Statement) -> Result<String, CodegenError> {
        Ok(format!(
            "{} {} {}",
            statement.var,
            statement.op,
            self.translate_expression(&statement.expr)?
        ))
    }

    fn translate_statement_sequence(
        &self,
        statements: &[Statement],
        specifiers: &Specifiers,
    ) -> Result<Code, CodegenError> {
        let lines = inline_subexpressions(statements, specifiers)?
            .iter()
            .map(|statement| self.translate_statement(statement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Code::Single(lines.join(";\n")))
    }

    fn template_iterate_all(&self, index: &str, size: &str) -> Template {
        Code::Single(format!("for {index} in range({size}):\n    {CODE_SLOT}"))
    }

    fn template_iterate_index_array(&self, index: &str, array: &str, size: &str) -> Template {
        Code::Single(format!("for {index} in {array}[:{size}]:\n    {CODE_SLOT}"))
    }

    fn code_object(&self, code: Code, specifiers: &Specifiers) -> Result<CodeObject, CodegenError> {
        Ok(CodeObject::new(
            self.language_id(),
            code,
            self.compile_methods(specifiers),
            Box::new(EvalexprExecutor::new(specifiers.clone())),
        ))
    }
}

/// How the loop header of a code block iterates.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Iteration {
    /// No loop header, the body runs once
    Once,
    Range {
        index: String,
        size: String,
    },
    IndexArray {
        index: String,
        array: String,
        size: String,
    },
}

fn parse_header(line: &str) -> Option<Iteration> {
    let rest = line.strip_prefix("for ")?.strip_suffix(':')?;
    let (index, source) = rest.split_once(" in ")?;
    let index = index.trim().to_string();
    let source = source.trim();
    if let Some(size) = source
        .strip_prefix("range(")
        .and_then(|s| s.strip_suffix(')'))
    {
        return Some(Iteration::Range {
            index,
            size: size.trim().to_string(),
        });
    }
    let (array, size) = source.strip_suffix(']')?.split_once("[:")?;
    Some(Iteration::IndexArray {
        index,
        array: array.trim().to_string(),
        size: size.trim().to_string(),
    })
}

/// Splits generated code into its loop header and the deindented loop body.
fn split_loop(text: &str) -> Result<(Iteration, String), CodegenError> {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());
    let Some(first) = lines.next() else {
        return Ok((Iteration::Once, String::new()));
    };
    let first = first.trim();
    if !first.starts_with("for ") {
        return Ok((Iteration::Once, text.to_string()));
    }
    let iteration =
        parse_header(first).ok_or_else(|| CodegenError::InvalidTemplate(first.to_string()))?;
    Ok((iteration, deindent(&lines.collect::<Vec<_>>().join("\n"))))
}

/// An array variable and where to find its element.
#[derive(Debug, Clone)]
struct ArrayAccess {
    var: String,
    array: String,
    index: String,
}

impl ArrayAccess {
    fn position(
        &self,
        bindings: &Bindings,
        current: Option<(&str, usize)>,
    ) -> Result<usize, CodegenError> {
        match current {
            Some((index, position)) if index == self.index => Ok(position),
            _ => bindings
                .int(&self.index)
                .and_then(|position| usize::try_from(position).ok())
                .ok_or_else(|| CodegenError::MissingBinding(self.index.clone())),
        }
    }

    fn load(
        &self,
        bindings: &Bindings,
        current: Option<(&str, usize)>,
    ) -> Result<f64, CodegenError> {
        let position = self.position(bindings, current)?;
        let values = bindings
            .array(&self.array)
            .ok_or_else(|| CodegenError::MissingBinding(self.array.clone()))?;
        values
            .get(position)
            .copied()
            .ok_or_else(|| CodegenError::IndexOutOfRange {
                array: self.array.clone(),
                index: position,
                len: values.len(),
            })
    }

    fn store(
        &self,
        bindings: &mut Bindings,
        current: Option<(&str, usize)>,
        value: f64,
    ) -> Result<(), CodegenError> {
        let position = self.position(bindings, current)?;
        let values = bindings
            .array_mut(&self.array)
            .ok_or_else(|| CodegenError::MissingBinding(self.array.clone()))?;
        let len = values.len();
        let slot = values
            .get_mut(position)
            .ok_or_else(|| CodegenError::IndexOutOfRange {
                array: self.array.clone(),
                index: position,
                len,
            })?;
        *slot = value;
        Ok(())
    }
}

/// Generated code prepared for execution.
struct Program {
    iteration: Iteration,
    tree: Node,
    read: Vec<ArrayAccess>,
    write: Vec<ArrayAccess>,
}

impl Program {
    fn run(
        &self,
        context: &mut HashMapContext<DefaultNumericTypes>,
        bindings: &mut Bindings,
        current: Option<(&str, usize)>,
    ) -> Result<(), CodegenError> {
        if let Some((index, position)) = current {
            context.set_value(index.to_string(), Value::Float(position as f64))?;
        }
        for access in &self.read {
            let value = access.load(bindings, current)?;
            context.set_value(access.var.clone(), Value::Float(value))?;
        }
        self.tree.eval_with_context_mut(context)?;
        for access in &self.write {
            let value = context
                .get_value(&access.var)
                .ok_or_else(|| CodegenError::MissingBinding(access.var.clone()))?
                .as_number()?;
            access.store(bindings, current, value)?;
        }
        Ok(())
    }
}

/// Runs code generated by [`EvalexprLanguage`].
pub struct EvalexprExecutor {
    specifiers: Specifiers,
    program: Option<Program>,
}

impl EvalexprExecutor {
    pub fn new(specifiers: Specifiers) -> Self {
        Self {
            specifiers,
            program: None,
        }
    }

    fn accesses(&self, vars: BTreeSet<String>) -> Vec<ArrayAccess> {
        vars.into_iter()
            .filter_map(|var| match self.specifiers.get(&var) {
                Some(Specifier::ArrayVariable { array, index, .. }) => Some(ArrayAccess {
                    var,
                    array: array.clone(),
                    index: index.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// A loop index declared with an [`Specifier::Index`] must match the loop header:
    /// `all` for `range` loops, not `all` for loops over an index array.
    fn check_index(&self, iteration: &Iteration) -> Result<(), CodegenError> {
        let (index, iterates_all) = match iteration {
            Iteration::Once => return Ok(()),
            Iteration::Range { index, .. } => (index, true),
            Iteration::IndexArray { index, .. } => (index, false),
        };
        match self.specifiers.get(index) {
            Some(Specifier::Index { all }) if *all != iterates_all => {
                Err(CodegenError::InvalidTemplate(format!(
                    "loop over {index} does not match its index specifier (all = {all})"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn native_function(arity: usize, fun: NativeFn) -> Function<DefaultNumericTypes> {
    Function::new(move |argument: &Value<DefaultNumericTypes>| {
        let args = match argument {
            Value::Tuple(values) => values
                .iter()
                .map(Value::as_number)
                .collect::<Result<Vec<_>, _>>()?,
            value => vec![value.as_number()?],
        };
        if args.len() != arity {
            return Err(EvalexprError::CustomMessage(format!(
                "expected {arity} arguments, got {}",
                args.len()
            )));
        }
        Ok(Value::Float(fun(&args)))
    })
}

/// A context with the builtin and namespace functions, the namespace scalars and
/// the scalar bindings. Bindings take precedence over the namespace.
fn base_context(
    namespace: &CodeNamespace,
    bindings: &Bindings,
) -> Result<HashMapContext<DefaultNumericTypes>, CodegenError> {
    let mut context = HashMapContext::<DefaultNumericTypes>::new();
    for (name, f) in BUILTINS {
        let fun: NativeFn = Arc::new(move |args: &[f64]| f(args[0]));
        context.set_function(name.to_string(), native_function(1, fun))?;
    }
    for (name, arity, fun) in namespace.functions() {
        context.set_function(name.to_string(), native_function(arity, fun.clone()))?;
    }
    for (name, value) in namespace.scalars() {
        context.set_value(name.to_string(), Value::Float(value))?;
    }
    for (name, binding) in bindings.iter() {
        let value = match binding {
            Binding::Scalar(value) => *value,
            Binding::Int(value) => *value as f64,
            _ => continue,
        };
        context.set_value(name.to_string(), Value::Float(value))?;
    }
    Ok(context)
}

fn loop_size(
    size: &str,
    namespace: &CodeNamespace,
    bindings: &Bindings,
) -> Result<usize, CodegenError> {
    bindings
        .int(size)
        .or_else(|| namespace.scalar(size).filter(|v| v.fract() == 0.0).map(|v| v as i64))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| CodegenError::MissingBinding(size.to_string()))
}

impl Executor for EvalexprExecutor {
    fn prepare(&mut self, code: &Code, _namespace: &CodeNamespace) -> Result<(), CodegenError> {
        let text = code.as_single().ok_or_else(|| {
            CodegenError::InvalidTemplate("expected a single block of code".to_string())
        })?;
        let (iteration, body) = split_loop(text)?;
        self.check_index(&iteration)?;
        let statements = body
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Statement::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let (read, write) = array_read_write(&statements, &self.specifiers);
        debug!(
            "Prepared {} statements, reading {:?} and writing {:?}",
            statements.len(),
            read,
            write
        );
        self.program = Some(Program {
            iteration,
            tree: build_operator_tree::<DefaultNumericTypes>(&body)?,
            read: self.accesses(read),
            write: self.accesses(write),
        });
        Ok(())
    }

    fn execute(
        &self,
        namespace: &CodeNamespace,
        bindings: &mut Bindings,
    ) -> Result<(), CodegenError> {
        let program = self.program.as_ref().ok_or(CodegenError::NotCompiled)?;
        let mut context = base_context(namespace, bindings)?;
        match &program.iteration {
            Iteration::Once => program.run(&mut context, bindings, None),
            Iteration::Range { index, size } => {
                for position in 0..loop_size(size, namespace, bindings)? {
                    program.run(&mut context, bindings, Some((index.as_str(), position)))?;
                }
                Ok(())
            }
            Iteration::IndexArray { index, array, size } => {
                let indices = bindings
                    .index_array(array)
                    .ok_or_else(|| CodegenError::MissingBinding(array.clone()))?
                    .to_vec();
                let n = loop_size(size, namespace, bindings)?;
                if n > indices.len() {
                    return Err(CodegenError::IndexOutOfRange {
                        array: array.clone(),
                        index: n,
                        len: indices.len(),
                    });
                }
                for &position in &indices[..n] {
                    program.run(&mut context, bindings, Some((index.as_str(), position)))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{
        code_object::CodeNamespace,
        parse_statements,
        specifiers::{Dtype, NativeFunction},
    };

    fn specifiers(arrays: &[&str], values: &[&str]) -> Specifiers {
        arrays
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Specifier::array(format!("_array_{name}"), "_neuron_idx", Dtype::Float64),
                )
            })
            .chain(values.iter().map(|name| {
                (
                    name.to_string(),
                    Specifier::Value {
                        dtype: Dtype::Float64,
                    },
                )
            }))
            .collect()
    }

    fn build(
        abstract_code: &str,
        template: Template,
        specifiers: &Specifiers,
        namespace: CodeNamespace,
    ) -> CodeObject {
        let language = EvalexprLanguage;
        let statements = parse_statements(abstract_code).unwrap();
        let code = language
            .translate_statement_sequence(&statements, specifiers)
            .unwrap();
        let code = language.apply_template(&code, &template);
        let mut object = language.code_object(code, specifiers).unwrap();
        object.compile(namespace).unwrap();
        object
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_translate() {
        let language = EvalexprLanguage;
        let statements = [
            Statement::new("v", "=", "v + dt * (-v / tau)"),
            Statement::new("w", "*=", "x**2"),
        ];
        assert_eq!(
            language.translate_statement(&statements[0]).unwrap(),
            "v = v + (dt * ((-v) / tau))"
        );
        assert_eq!(
            language
                .translate_statement_sequence(&statements, &Specifiers::new())
                .unwrap(),
            Code::from("v = v + (dt * ((-v) / tau));\nw *= x ^ 2.0")
        );
    }

    #[test]
    fn test_templates() {
        let language = EvalexprLanguage;
        assert_eq!(
            language.template_state_update(),
            Code::from("for _neuron_idx in range(_num_neurons):\n    %CODE%")
        );
        assert_eq!(
            language.template_reset(),
            Code::from("for _neuron_idx in _spikes[:_num_spikes]:\n    %CODE%")
        );
        assert!(language.template_threshold().is_err());
        assert!(language.template_synapses().is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("for i in range(n):"),
            Some(Iteration::Range {
                index: "i".to_string(),
                size: "n".to_string()
            })
        );
        assert_eq!(
            parse_header("for i in spikes[:count]:"),
            Some(Iteration::IndexArray {
                index: "i".to_string(),
                array: "spikes".to_string(),
                size: "count".to_string()
            })
        );
        assert_eq!(parse_header("for i in something:"), None);
        assert_eq!(parse_header("while true:"), None);
    }

    #[test]
    fn test_state_update() {
        let specifiers = specifiers(&["v"], &["dt", "tau"]);
        let object = build(
            "v = v + dt * (-v / tau)",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new().with_scalar("tau", 0.01),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![1.0, 2.0, 0.0])
            .with_scalar("dt", 0.001)
            .with_int("_num_neurons", 2);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_v").unwrap(), &[0.9, 1.8, 0.0]);
    }

    #[test]
    fn test_temporaries_and_builtins() {
        let specifiers = specifiers(&["v"], &["dt", "tau"]);
        let object = build(
            "_v = v * exp(-dt / tau)
             v = _v",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new().with_scalar("tau", 0.01).with_scalar("dt", 0.01),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![1.0, 2.0])
            .with_int("_num_neurons", 2);
        object.invoke(&mut bindings).unwrap();
        let decay = (-1.0f64).exp();
        assert_close(bindings.array("_array_v").unwrap(), &[decay, 2.0 * decay]);
    }

    #[test]
    fn test_reset() {
        let specifiers = specifiers(&["v"], &["v_reset"]);
        let object = build(
            "v = v_reset",
            EvalexprLanguage.template_reset(),
            &specifiers,
            CodeNamespace::new().with_scalar("v_reset", -0.5),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![1.0, 2.0, 3.0])
            .with_index_array("_spikes", vec![0, 2, 1])
            .with_int("_num_spikes", 2);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_v").unwrap(), &[-0.5, 2.0, -0.5]);

        bindings.set("_num_spikes", Binding::Int(4));
        assert!(matches!(
            object.invoke(&mut bindings),
            Err(CodegenError::IndexOutOfRange { index: 4, len: 3, .. })
        ));
    }

    #[test]
    fn test_native_function() {
        let mut specifiers = specifiers(&["v"], &[]);
        specifiers.insert(
            "clip".to_string(),
            Specifier::function(NativeFunction::new(2, |args| args[0].min(args[1]))),
        );
        let object = build(
            "v = clip(v * 2, 1)",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new(),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![0.2, 0.7])
            .with_int("_num_neurons", 2);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_v").unwrap(), &[0.4, 1.0]);
    }

    #[test]
    fn test_without_loop() {
        let specifiers: Specifiers = [
            (
                "x".to_string(),
                Specifier::array("_array_x", "_i", Dtype::Float64),
            ),
            ("y".to_string(), Specifier::Value { dtype: Dtype::Float64 }),
        ]
        .into_iter()
        .collect();
        let language = EvalexprLanguage;
        let mut object = language
            .code_object(Code::from("x += y"), &specifiers)
            .unwrap();
        object.compile(CodeNamespace::new()).unwrap();
        let mut bindings = Bindings::new()
            .with_array("_array_x", &vec![1.0, 1.0])
            .with_scalar("y", 2.5)
            .with_int("_i", 1);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_x").unwrap(), &[1.0, 3.5]);
    }

    #[test]
    fn test_missing_bindings() {
        let specifiers = specifiers(&["v"], &["dt", "tau"]);
        let object = build(
            "v = v + dt * (-v / tau)",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new().with_scalar("tau", 0.01),
        );

        let mut bindings = Bindings::new().with_array("_array_v", &vec![1.0]);
        assert!(matches!(
            object.invoke(&mut bindings),
            Err(CodegenError::MissingBinding(name)) if name == "_num_neurons"
        ));

        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![1.0])
            .with_scalar("dt", 0.1)
            .with_int("_num_neurons", 2);
        assert!(matches!(
            object.invoke(&mut bindings),
            Err(CodegenError::IndexOutOfRange { index: 1, len: 1, .. })
        ));

        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![1.0])
            .with_int("_num_neurons", 1);
        assert!(matches!(
            object.invoke(&mut bindings),
            Err(CodegenError::Evalexpr(_))
        ));
    }

    #[test]
    fn test_invalid_header() {
        let mut object = EvalexprLanguage
            .code_object(Code::from("for i in everything:\n    x = 1"), &Specifiers::new())
            .unwrap();
        assert!(matches!(
            object.compile(CodeNamespace::new()),
            Err(CodegenError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_index_specifier() {
        let mut specifiers = specifiers(&["v"], &["v_reset"]);
        specifiers.insert("_neuron_idx".to_string(), Specifier::Index { all: false });
        let object = build(
            "v = v_reset + _neuron_idx",
            EvalexprLanguage.template_reset(),
            &specifiers,
            CodeNamespace::new().with_scalar("v_reset", -1.0),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![0.0; 3])
            .with_index_array("_spikes", vec![2])
            .with_int("_num_spikes", 1);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_v").unwrap(), &[0.0, 0.0, 1.0]);

        let language = EvalexprLanguage;
        let code = language.apply_template(
            &Code::from("v = v_reset"),
            &language.template_state_update(),
        );
        let mut object = language.code_object(code, &specifiers).unwrap();
        assert!(matches!(
            object.compile(CodeNamespace::new()),
            Err(CodegenError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_subexpression() {
        let mut specifiers = specifiers(&["v", "g"], &["dt"]);
        specifiers.insert("I".to_string(), Specifier::subexpression("g * (1 - v)"));
        let object = build(
            "v += dt * I",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new().with_scalar("dt", 0.5),
        );
        let mut bindings = Bindings::new()
            .with_array("_array_v", &vec![0.0, 0.5])
            .with_array("_array_g", &vec![1.0, 2.0])
            .with_int("_num_neurons", 2);
        object.invoke(&mut bindings).unwrap();
        assert_close(bindings.array("_array_v").unwrap(), &[0.5, 1.0]);
    }

    #[test]
    fn test_invoke_parallel() {
        let specifiers = specifiers(&["v"], &["tau"]);
        let object = build(
            "v = v - v / tau",
            EvalexprLanguage.template_state_update(),
            &specifiers,
            CodeNamespace::new().with_scalar("tau", 2.0),
        );
        let mut groups: Vec<Bindings> = (1..=8)
            .map(|n| {
                Bindings::new()
                    .with_array("_array_v", &vec![n as f64; n])
                    .with_int("_num_neurons", n as i64)
            })
            .collect();
        object.invoke_parallel(&mut groups).unwrap();
        for (i, bindings) in groups.iter().enumerate() {
            let n = i + 1;
            assert_close(bindings.array("_array_v").unwrap(), &vec![n as f64 / 2.0; n]);
        }
    }
}
