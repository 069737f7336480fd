//! Code fragments, templates and the substitution of one into the other.

use std::{collections::BTreeMap, fmt};

use crate::utils::{deindent, indent_continuation};

/// The placeholder a single code fragment is inserted at.
pub const CODE_SLOT: &str = "%CODE%";
/// The slot name a single-string template is stored under.
pub const MAIN_SLOT: &str = "%MAIN%";

/// Generated code, either a single fragment or fragments keyed by slot name.
///
/// The same shape is used for templates: a single string, or several named
/// sections that each may contain placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    Single(String),
    Slots(BTreeMap<String, String>),
}

/// Templates share the representation of code.
pub type Template = Code;

impl Code {
    /// The fragments keyed by slot. A single fragment is keyed by `default_slot`.
    fn into_slots(self, default_slot: &str) -> BTreeMap<String, String> {
        match self {
            Code::Single(text) => BTreeMap::from([(default_slot.to_string(), text)]),
            Code::Slots(slots) => slots,
        }
    }

    /// Returns the text of a single fragment.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Code::Single(text) => Some(text),
            Code::Slots(_) => None,
        }
    }

    /// Returns the fragment stored under `slot`.
    pub fn slot(&self, slot: &str) -> Option<&str> {
        match self {
            Code::Single(_) => None,
            Code::Slots(slots) => slots.get(slot).map(String::as_str),
        }
    }
}

impl From<&str> for Code {
    fn from(text: &str) -> Self {
        Code::Single(text.to_string())
    }
}

impl From<String> for Code {
    fn from(text: String) -> Self {
        Code::Single(text)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Single(text) => write!(f, "{text}"),
            Code::Slots(slots) => {
                for (i, (slot, text)) in slots.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    writeln!(f, "[{slot}]")?;
                    write!(f, "{text}")?;
                }
                Ok(())
            }
        }
    }
}

/// Inserts `code` at every occurrence of `placeholder` in `template`.
///
/// Continuation lines of a multi-line fragment get the indentation of the
/// template line the placeholder sits on.
pub fn apply_code_template(code: &str, template: &str, placeholder: &str) -> String {
    template
        .split('\n')
        .map(|line| {
            if !line.contains(placeholder) {
                return line.to_string();
            }
            let indent_len = line.len() - line.trim_start().len();
            let indented = indent_continuation(code, &line[..indent_len]);
            line.replace(placeholder, &indented)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Applies `code` to `template`.
///
/// Each template section is deindented, then every code fragment is inserted at its
/// placeholder. Placeholders without a fragment are left as they are. The result has
/// the shape of the template.
///
/// # Example
/// ```rust
/// use diffeq_codegen::codegen::{apply_template, Code};
///
/// let result = apply_template(&Code::from("body"), &Code::from("begin %CODE% end"));
/// assert_eq!(result, Code::from("begin body end"));
/// ```
pub fn apply_template(code: &Code, template: &Template) -> Template {
    let fragments = code.clone().into_slots(CODE_SLOT);
    let fill = |section: &str| {
        fragments
            .iter()
            .fold(deindent(section), |text, (placeholder, fragment)| {
                apply_code_template(fragment, &text, placeholder)
            })
    };
    match template {
        Code::Single(text) => Code::Single(fill(text)),
        Code::Slots(sections) => Code::Slots(
            sections
                .iter()
                .map(|(name, text)| (name.clone(), fill(text)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(pairs: &[(&str, &str)]) -> Code {
        Code::Slots(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_single_template() {
        let result = apply_template(&Code::from("body"), &Code::from("begin %CODE% end"));
        assert_eq!(result, Code::from("begin body end"));
    }

    #[test]
    fn test_multiline_code_is_reindented() {
        let template = Code::from(
            "
            for i in range(n):
                %CODE%
            done",
        );
        let result = apply_template(&Code::from("a = 1\nb = 2"), &template);
        assert_eq!(
            result.as_single().unwrap(),
            "\nfor i in range(n):\n    a = 1\n    b = 2\ndone"
        );
    }

    #[test]
    fn test_slot_template() {
        let template = slots(&[
            ("main", "loop { %LOOP% }"),
            ("support", "%SUPPORT%"),
            ("header", "#include <math.h>"),
        ]);
        let code = slots(&[("%LOOP%", "x += 1;"), ("%OTHER%", "unused")]);
        let result = apply_template(&code, &template);
        assert_eq!(result.slot("main"), Some("loop { x += 1; }"));
        assert_eq!(result.slot("support"), Some("%SUPPORT%"));
        assert_eq!(result.slot("header"), Some("#include <math.h>"));
    }

    #[test]
    fn test_slot_code_into_single_template() {
        let code = slots(&[("%A%", "alpha"), ("%B%", "beta")]);
        let result = apply_template(&code, &Code::from("%A% then %B% then %CODE%"));
        assert_eq!(result, Code::from("alpha then beta then %CODE%"));
    }

    #[test]
    fn test_placeholder_occurs_twice() {
        assert_eq!(
            apply_code_template("x", "%CODE% and %CODE%", CODE_SLOT),
            "x and x"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Code::from("a = 1").to_string(), "a = 1");
        assert_eq!(
            slots(&[("b", "2"), ("a", "1")]).to_string(),
            "[a]\n1\n[b]\n2"
        );
    }
}
