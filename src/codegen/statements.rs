//! Single-assignment statements of abstract code.

use std::{collections::BTreeSet, fmt};

use crate::{
    equations::check_identifier_syntax,
    errors::CodegenError,
    utils::get_identifiers,
};

const AUGMENTED_OPERATORS: [&str; 4] = ["+=", "-=", "*=", "/="];

/// An assignment `var op expr` of abstract code, e.g. `v = v + dt * (-v / tau)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub var: String,
    pub op: String,
    pub expr: String,
    /// Whether the statement reads the variable it writes. Augmented assignments
    /// are always in-place.
    pub inplace: bool,
}

impl Statement {
    pub fn new(var: impl Into<String>, op: impl Into<String>, expr: impl Into<String>) -> Self {
        let op = op.into();
        Self {
            var: var.into(),
            inplace: op != "=",
            op,
            expr: expr.into().trim().to_string(),
        }
    }

    /// Marks the statement as reading its own variable.
    pub fn mark_inplace(mut self) -> Self {
        self.inplace = true;
        self
    }

    /// Parses a line like `v += dt * a;`. A trailing semicolon is ignored.
    pub fn parse(line: &str) -> Result<Self, CodegenError> {
        let invalid = || CodegenError::InvalidStatement(line.to_string());
        let text = line.trim().trim_end_matches(';').trim_end();
        let eq = text.find('=').ok_or_else(invalid)?;
        if text[eq + 1..].starts_with('=') {
            return Err(invalid());
        }

        let (lhs, op) = match AUGMENTED_OPERATORS
            .iter()
            .find(|op| text[..eq + 1].ends_with(*op))
        {
            Some(op) => (&text[..eq - 1], *op),
            None => (&text[..eq], "="),
        };
        let var = lhs.trim();
        let expr = text[eq + 1..].trim();
        if check_identifier_syntax(var).is_err() || expr.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(var, op, expr))
    }

    /// The identifiers of the right-hand side, including function names.
    pub fn identifiers(&self) -> BTreeSet<String> {
        get_identifiers(&self.expr)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.var, self.op, self.expr)
    }
}

/// Parses abstract code with one statement per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn parse_statements(code: &str) -> Result<Vec<Statement>, CodegenError> {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Statement::parse)
        .collect()
}
