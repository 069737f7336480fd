//! Validation of declared variable names.
//!
//! Every name declared in an equations string is passed through a list of checks.
//! The default list rejects names that are not identifiers, reserved keywords, names
//! starting with an underscore and the special variables `t`, `dt` and `xi`. Further
//! checks can be registered on an [`IdentifierChecks`] value, which is then handed
//! to the equations constructor explicitly.

use std::{fmt, sync::Arc};

use crate::{errors::EquationError, expression::SPECIAL_VARS};

/// A single identifier check. Returns an error describing why a name is rejected.
pub type IdentifierCheck = Arc<dyn Fn(&str) -> Result<(), EquationError> + Send + Sync>;

/// Reserved words of Rust and the boolean literals of the expression language.
const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try", "gen", "union",
];

fn invalid(name: &str, reason: impl Into<String>) -> EquationError {
    EquationError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Checks that the name is a valid identifier: a letter or underscore followed by
/// letters, digits and underscores.
pub fn check_identifier_syntax(name: &str) -> Result<(), EquationError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid(name, "not a valid identifier"))
    }
}

/// Checks that the name is not a reserved keyword.
pub fn check_identifier_keyword(name: &str) -> Result<(), EquationError> {
    if KEYWORDS.contains(&name) {
        Err(invalid(name, "this name is a reserved keyword"))
    } else {
        Ok(())
    }
}

/// Checks that the name does not start with an underscore, such names are reserved
/// for internal variables of generated code.
pub fn check_identifier_underscore(name: &str) -> Result<(), EquationError> {
    if name.starts_with('_') {
        Err(invalid(name, "names starting with an underscore are reserved"))
    } else {
        Ok(())
    }
}

/// Checks that the name is not one of the special variables `t`, `dt` and `xi`.
pub fn check_identifier_reserved(name: &str) -> Result<(), EquationError> {
    if SPECIAL_VARS.contains(&name) {
        Err(invalid(name, "this name has a special meaning"))
    } else {
        Ok(())
    }
}

/// An ordered list of identifier checks.
///
/// # Example
/// ```rust
/// use diffeq_codegen::equations::IdentifierChecks;
/// use diffeq_codegen::errors::EquationError;
///
/// let mut checks = IdentifierChecks::default();
/// checks.register(|name| {
///     if name.len() > 8 {
///         Err(EquationError::InvalidIdentifier {
///             name: name.to_string(),
///             reason: "too long".to_string(),
///         })
///     } else {
///         Ok(())
///     }
/// });
/// assert!(checks.check("v").is_ok());
/// assert!(checks.check("membrane_potential").is_err());
/// assert!(checks.check("_v").is_err());
/// ```
#[derive(Clone)]
pub struct IdentifierChecks {
    checks: Vec<IdentifierCheck>,
}

impl IdentifierChecks {
    /// A list without any checks.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Appends a check to the list.
    pub fn register<F>(&mut self, check: F)
    where
        F: Fn(&str) -> Result<(), EquationError> + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
    }

    /// Builder-style variant of [`IdentifierChecks::register`].
    pub fn with<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), EquationError> + Send + Sync + 'static,
    {
        self.register(check);
        self
    }

    /// Runs all checks in registration order, stopping at the first failure.
    pub fn check(&self, name: &str) -> Result<(), EquationError> {
        self.checks.iter().try_for_each(|check| check(name))
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for IdentifierChecks {
    fn default() -> Self {
        Self::empty()
            .with(check_identifier_syntax)
            .with(check_identifier_keyword)
            .with(check_identifier_underscore)
            .with(check_identifier_reserved)
    }
}

impl fmt::Debug for IdentifierChecks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierChecks({} checks)", self.checks.len())
    }
}
