//! A backend generating C++ source code.
//!
//! Array variables are loaded into locals at the top of the loop body, the statements
//! work on the locals and the written ones are stored back at the end. Running the
//! generated code is left to an external compiler, so its code objects cannot be
//! invoked.

use std::collections::BTreeSet;

use super::{render, Syntax};
use crate::{
    codegen::{
        code_object::{CodeObject, UnsupportedExecutor},
        language::{inline_subexpressions, Language},
        specifiers::{Dtype, Specifier, Specifiers},
        statements::Statement,
        templating::{Code, Template, CODE_SLOT},
        LanguageId,
    },
    errors::CodegenError,
};

/// The C type of a variable.
pub fn c_data_type(dtype: Dtype) -> &'static str {
    match dtype {
        Dtype::Float64 => "double",
        Dtype::Int32 => "int32_t",
        Dtype::Bool => "bool",
    }
}

struct CppSyntax;

impl Syntax for CppSyntax {
    fn power(&self, base: &str, exponent: &str) -> String {
        format!("pow({base}, {exponent})")
    }

    fn call(&self, name: &str, args: &[String]) -> String {
        let name = match name {
            "ln" => "log",
            "abs" => "fabs",
            name => name,
        };
        format!("{name}({})", args.join(", "))
    }
}

/// The C++ backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CppLanguage;

impl Language for CppLanguage {
    fn language_id(&self) -> LanguageId {
        LanguageId::Cpp
    }

    fn translate_expression(&self, expr: &str) -> Result<String, CodegenError> {
        render(&CppSyntax, expr)
    }

    fn translate_statement(&self, statement: &Statement) -> Result<String, CodegenError> {
        Ok(format!(
            "{} {} {};",
            statement.var,
            statement.op,
            self.translate_expression(&statement.expr)?
        ))
    }

    /// Loads the array variables that are read, declares the ones only written and
    /// the temporaries assigned by the statements, runs the statements and stores
    /// the written array variables.
    fn translate_statement_sequence(
        &self,
        statements: &[Statement],
        specifiers: &Specifiers,
    ) -> Result<Code, CodegenError> {
        let statements = inline_subexpressions(statements, specifiers)?;
        let (read, write) = self.array_read_write(&statements, specifiers);
        let mut lines = Vec::new();

        for var in &read {
            if let Some(Specifier::ArrayVariable { array, index, dtype }) = specifiers.get(var) {
                lines.push(format!("{} {var} = {array}[{index}];", c_data_type(*dtype)));
            }
        }
        for var in write.difference(&read) {
            if let Some(Specifier::ArrayVariable { dtype, .. }) = specifiers.get(var) {
                lines.push(format!("{} {var};", c_data_type(*dtype)));
            }
        }

        let mut declared: BTreeSet<&str> = BTreeSet::new();
        for statement in &statements {
            let line = self.translate_statement(statement)?;
            let var = statement.var.as_str();
            let local_type = match specifiers.get(var) {
                None => Some(Dtype::Float64),
                Some(Specifier::OutputVariable { dtype }) => Some(*dtype),
                Some(_) => None,
            };
            match local_type {
                Some(dtype) if statement.op == "=" && declared.insert(var) => {
                    lines.push(format!("{} {line}", c_data_type(dtype)));
                }
                _ => lines.push(line),
            }
        }

        for var in &write {
            if let Some(Specifier::ArrayVariable { array, index, .. }) = specifiers.get(var) {
                lines.push(format!("{array}[{index}] = {var};"));
            }
        }
        Ok(Code::Single(lines.join("\n")))
    }

    fn template_iterate_all(&self, index: &str, size: &str) -> Template {
        Code::Single(format!(
            "for (int {index} = 0; {index} < {size}; {index}++)\n{{\n    {CODE_SLOT}\n}}"
        ))
    }

    fn template_iterate_index_array(&self, index: &str, array: &str, size: &str) -> Template {
        Code::Single(format!(
            "for (int _idx{array} = 0; _idx{array} < {size}; _idx{array}++)\n\
             {{\n    \
             const int {index} = {array}[_idx{array}];\n    \
             {CODE_SLOT}\n\
             }}"
        ))
    }

    /// Collects the indices of the neurons whose `_cond` evaluates to true into
    /// `_spikes`.
    fn template_threshold(&self) -> Result<Template, CodegenError> {
        Ok(Code::Single(format!(
            "_num_spikes = 0;\n\
             for (int _neuron_idx = 0; _neuron_idx < _num_neurons; _neuron_idx++)\n\
             {{\n    \
             {CODE_SLOT}\n    \
             if (_cond)\n    \
             {{\n        \
             _spikes[_num_spikes++] = _neuron_idx;\n    \
             }}\n\
             }}"
        )))
    }

    fn code_object(&self, code: Code, specifiers: &Specifiers) -> Result<CodeObject, CodegenError> {
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
