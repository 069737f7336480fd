//! The interface every code generation backend implements.

use std::collections::{BTreeSet, HashMap};

use super::{
    code_object::{CodeObject, CompileHook},
    specifiers::{Specifier, Specifiers},
    statements::Statement,
    templating::{self, Code, Template},
    LanguageId,
};
use crate::{
    errors::CodegenError,
    utils::{get_identifiers, word_substitute},
};

/// A target language for generated code.
///
/// Backends translate abstract code, made of single-assignment [`Statement`]s, into
/// their own syntax, provide loop templates to embed the translated code in, and
/// build [`CodeObject`]s that run it.
pub trait Language: Send + Sync {
    fn language_id(&self) -> LanguageId;

    /// Translates an expression of abstract code.
    fn translate_expression(&self, expr: &str) -> Result<String, CodegenError>;

    /// Translates a single statement.
    fn translate_statement(&self, statement: &Statement) -> Result<String, CodegenError>;

    /// Translates a sequence of statements, declaring local variables where the
    /// language needs it.
    ///
    /// # Returns
    /// A single fragment for the `%CODE%` placeholder, or fragments keyed by the
    /// placeholders of this language's templates
    fn translate_statement_sequence(
        &self,
        statements: &[Statement],
        specifiers: &Specifiers,
    ) -> Result<Code, CodegenError>;

    /// A template in which `index` ranges over `0..size`.
    fn template_iterate_all(&self, index: &str, size: &str) -> Template;

    /// A template in which `index` ranges over the first `size` values of `array`.
    fn template_iterate_index_array(&self, index: &str, array: &str, size: &str) -> Template;

    /// Builds a code object running `code`, with one compile hook per function
    /// in `specifiers`.
    fn code_object(&self, code: Code, specifiers: &Specifiers) -> Result<CodeObject, CodegenError>;

    /// State updates run for every neuron.
    fn template_state_update(&self) -> Template {
        self.template_iterate_all("_neuron_idx", "_num_neurons")
    }

    /// Resets run for every neuron that spiked.
    fn template_reset(&self) -> Template {
        self.template_iterate_index_array("_neuron_idx", "_spikes", "_num_spikes")
    }

    fn template_threshold(&self) -> Result<Template, CodegenError> {
        Err(CodegenError::NotImplemented {
            language: self.language_id(),
            operation: "threshold template",
        })
    }

    fn template_synapses(&self) -> Result<Template, CodegenError> {
        Err(CodegenError::NotImplemented {
            language: self.language_id(),
            operation: "synapses template",
        })
    }

    /// See [`templating::apply_template`].
    fn apply_template(&self, code: &Code, template: &Template) -> Template {
        templating::apply_template(code, template)
    }

    /// See [`array_read_write`].
    fn array_read_write(
        &self,
        statements: &[Statement],
        specifiers: &Specifiers,
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        array_read_write(statements, specifiers)
    }

    /// One compile hook per function specifier, running the function's
    /// `on_compile` for this language.
    fn compile_methods(&self, specifiers: &Specifiers) -> Vec<CompileHook> {
        let language = self.language_id();
        specifiers
            .iter()
            .filter_map(|(var, spec)| match spec {
                Specifier::Function(function) => {
                    let function = function.clone();
                    let var = var.clone();
                    let hook: CompileHook =
                        Box::new(move |namespace| function.on_compile(namespace, language, &var));
                    Some(hook)
                }
                _ => None,
            })
            .collect()
    }
}

/// The array variables read and written by `statements`.
///
/// A variable is read if it occurs on a right-hand side, in a subexpression used
/// there, or is the target of an in-place statement. It is written if it is the
/// target of any statement. Only names with an [`Specifier::ArrayVariable`]
/// specifier are reported.
///
/// # Example
/// ```rust
/// use diffeq_codegen::codegen::{array_read_write, Dtype, Specifier, Specifiers, Statement};
///
/// let specifiers: Specifiers = [
///     ("x".to_string(), Specifier::array("_array_x", "_idx", Dtype::Float64)),
///     ("y".to_string(), Specifier::array("_array_y", "_idx", Dtype::Float64)),
/// ]
/// .into_iter()
/// .collect();
/// let (read, write) = array_read_write(&[Statement::new("x", "+=", "y")], &specifiers);
/// assert_eq!(read.into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
/// assert_eq!(write.into_iter().collect::<Vec<_>>(), vec!["x"]);
/// ```
pub fn array_read_write(
    statements: &[Statement],
    specifiers: &Specifiers,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut read = BTreeSet::new();
    let mut write = BTreeSet::new();
    for stmt in statements {
        read.extend(stmt.identifiers());
        if stmt.inplace {
            read.insert(stmt.var.clone());
        }
        write.insert(stmt.var.clone());
    }
    let mut pending: Vec<String> = read.iter().cloned().collect();
    let mut seen = BTreeSet::new();
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(Specifier::Subexpression { identifiers, .. }) = specifiers.get(&name) {
            read.extend(identifiers.iter().cloned());
            pending.extend(identifiers.iter().cloned());
        }
    }
    let is_array = |var: &String| specifiers.get(var).is_some_and(Specifier::is_array);
    read.retain(is_array);
    write.retain(is_array);
    (read, write)
}

/// Replaces names with a [`Specifier::Subexpression`] on the right-hand sides of
/// `statements` by their parenthesized expressions. Subexpressions may use other
/// subexpressions but must not refer to themselves.
pub fn inline_subexpressions(
    statements: &[Statement],
    specifiers: &Specifiers,
) -> Result<Vec<Statement>, CodegenError> {
    let substitutions: HashMap<String, String> = specifiers
        .iter()
        .filter_map(|(name, spec)| match spec {
            Specifier::Subexpression { expr, .. } => Some((name.clone(), format!("({expr})"))),
            _ => None,
        })
        .collect();

    statements
        .iter()
        .map(|stmt| {
            let mut expr = stmt.expr.clone();
            for _ in 0..=substitutions.len() {
                if !get_identifiers(&expr)
                    .iter()
                    .any(|id| substitutions.contains_key(id))
                {
                    return Ok(Statement {
                        expr,
                        ..stmt.clone()
                    });
                }
                expr = word_substitute(&expr, &substitutions);
            }
            Err(CodegenError::InvalidStatement(format!(
                "{stmt} (recursive subexpression)"
            )))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::code_object::{CodeNamespace, UnsupportedExecutor};
    use crate::codegen::specifiers::{Dtype, NativeFunction};

    struct Minimal;

    impl Language for Minimal {
        fn language_id(&self) -> LanguageId {
            LanguageId::Cpp
        }

        fn translate_expression(&self, expr: &str) -> Result<String, CodegenError> {
            Ok(expr.to_string())
        }

        fn translate_statement(&self, statement: &Statement) -> Result<String, CodegenError> {
            Ok(statement.to_string())
        }

        fn translate_statement_sequence(
            &self,
            statements: &[Statement],
            _specifiers: &Specifiers,
        ) -> Result<Code, CodegenError> {
            let lines: Result<Vec<_>, _> = statements
                .iter()
                .map(|s| self.translate_statement(s))
                .collect();
            Ok(Code::Single(lines?.join("\n")))
        }

        fn template_iterate_all(&self, index: &str, size: &str) -> Template {
            Code::Single(format!("each {index} < {size}:\n    %CODE%"))
        }

        fn template_iterate_index_array(&self, index: &str, array: &str, size: &str) -> Template {
            Code::Single(format!("each {index} in {array}[:{size}]:\n    %CODE%"))
        }

        fn code_object(
            &self,
            code: Code,
            specifiers: &Specifiers,
        ) -> Result<CodeObject, CodegenError> {
            Ok(CodeObject::new(
                self.language_id(),
                code,
                self.compile_methods(specifiers),
                Box::new(UnsupportedExecutor {
                    language: self.language_id(),
                }),
            ))
        }
    }

    fn array_specifiers(names: &[&str]) -> Specifiers {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Specifier::array(format!("_array_{name}"), "_neuron_idx", Dtype::Float64),
                )
            })
            .collect()
    }

    #[test]
    fn test_derived_templates() {
        let language = Minimal;
        assert_eq!(
            language.template_state_update(),
            Code::from("each _neuron_idx < _num_neurons:\n    %CODE%")
        );
        assert_eq!(
            language.template_reset(),
            Code::from("each _neuron_idx in _spikes[:_num_spikes]:\n    %CODE%")
        );
        assert!(matches!(
            language.template_threshold(),
            Err(CodegenError::NotImplemented { operation: "threshold template", .. })
        ));
        assert!(matches!(
            language.template_synapses(),
            Err(CodegenError::NotImplemented { operation: "synapses template", .. })
        ));
    }

    #[test]
    fn test_apply_state_update_template() {
        let language = Minimal;
        let statements = [Statement::new("v", "=", "v * 0.5"), Statement::new("w", "+=", "v")];
        let code = language
            .translate_statement_sequence(&statements, &Specifiers::new())
            .unwrap();
        let result = language.apply_template(&code, &language.template_state_update());
        assert_eq!(
            result,
            Code::from("each _neuron_idx < _num_neurons:\n    v = v * 0.5\n    w += v")
        );
    }

    #[test]
    fn test_array_read_write() {
        let specifiers = array_specifiers(&["x", "y"]);
        let inplace = Statement::new("x", "=", "x + y").mark_inplace();
        let (read, write) = array_read_write(&[inplace], &specifiers);
        assert_eq!(read.into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(write.into_iter().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_array_read_write_ignores_locals() {
        let mut specifiers = array_specifiers(&["v"]);
        specifiers.insert("tau".to_string(), Specifier::Value { dtype: Dtype::Float64 });
        let statements = [
            Statement::new("_v", "=", "v * exp(-dt / tau)"),
            Statement::new("v", "=", "_v"),
        ];
        let (read, write) = Minimal.array_read_write(&statements, &specifiers);
        assert_eq!(read.into_iter().collect::<Vec<_>>(), vec!["v"]);
        assert_eq!(write.into_iter().collect::<Vec<_>>(), vec!["v"]);
    }

    #[test]
    fn test_array_read_write_through_subexpression() {
        let mut specifiers = array_specifiers(&["v", "g", "w"]);
        specifiers.insert("I".to_string(), Specifier::subexpression("g * (E - v)"));
        specifiers.insert("J".to_string(), Specifier::subexpression("I + w"));
        let (read, write) = array_read_write(&[Statement::new("v", "+=", "dt * J")], &specifiers);
        assert_eq!(read.into_iter().collect::<Vec<_>>(), vec!["g", "v", "w"]);
        assert_eq!(write.into_iter().collect::<Vec<_>>(), vec!["v"]);
    }

    #[test]
    fn test_inline_subexpressions() {
        let mut specifiers = array_specifiers(&["v"]);
        specifiers.insert("I".to_string(), Specifier::subexpression("g * (E - v)"));
        specifiers.insert("J".to_string(), Specifier::subexpression("2 * I"));
        let statements = [Statement::new("v", "+=", "dt * J"), Statement::new("w", "=", "I")];
        let inlined = inline_subexpressions(&statements, &specifiers).unwrap();
        assert_eq!(inlined[0].expr, "dt * (2 * (g * (E - v)))");
        assert!(inlined[0].inplace);
        assert_eq!(inlined[1].expr, "(g * (E - v))");

        specifiers.insert("K".to_string(), Specifier::subexpression("K + 1"));
        let recursive = [Statement::new("v", "=", "K")];
        assert!(matches!(
            inline_subexpressions(&recursive, &specifiers),
            Err(CodegenError::InvalidStatement(_))
        ));
    }

    #[test]
    fn test_compile_methods() {
        let mut specifiers = array_specifiers(&["v"]);
        specifiers.insert(
            "clip".to_string(),
            Specifier::function(NativeFunction::new(1, |args| args[0].min(1.0))),
        );
        specifiers.insert(
            "square".to_string(),
            Specifier::function(NativeFunction::new(1, |args| args[0] * args[0])),
        );
        let hooks = Minimal.compile_methods(&specifiers);
        assert_eq!(hooks.len(), 2);

        let mut object = Minimal.code_object(Code::from(""), &specifiers).unwrap();
        object.compile(CodeNamespace::new()).unwrap();
        let names: Vec<_> = object
            .namespace()
            .unwrap()
            .functions()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names, vec!["clip", "square"]);
    }
}
