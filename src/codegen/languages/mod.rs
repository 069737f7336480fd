//! The code generation backends.
//!
//! Both backends render abstract code expressions by walking the evalexpr operator
//! tree of the expression and emitting their own syntax for each node.

pub mod cpp;
pub mod evalexpr;

use ::evalexpr::{build_operator_tree, DefaultNumericTypes, Node, Operator, Value};

use crate::errors::CodegenError;

/// The parts of expression syntax that differ between backends.
pub(crate) trait Syntax {
    /// Renders `base` raised to `exponent`.
    fn power(&self, base: &str, exponent: &str) -> String;

    /// Renders a call of the function `name`.
    fn call(&self, name: &str, args: &[String]) -> String {
        format!("{name}({})", args.join(", "))
    }
}

/// Renders a floating point literal that is never mistaken for an integer.
pub(crate) fn float_literal(value: f64) -> String {
    let text = value.to_string();
    let text = if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    };
    if value < 0.0 {
        format!("({text})")
    } else {
        text
    }
}

/// Parses an abstract code expression and renders it with `syntax`.
/// Python-style powers (`x**2`) are accepted.
pub(crate) fn render<S: Syntax>(syntax: &S, expr: &str) -> Result<String, CodegenError> {
    let node = build_operator_tree::<DefaultNumericTypes>(&expr.replace("**", "^"))?;
    let text = render_node(syntax, &node)?;
    Ok(strip_parentheses(&text).to_string())
}

fn render_node<S: Syntax>(syntax: &S, node: &Node) -> Result<String, CodegenError> {
    if let Operator::FunctionIdentifier { identifier } = node.operator() {
        let args = function_arguments(node)
            .into_iter()
            .map(|arg| {
                let text = render_node(syntax, arg)?;
                Ok(strip_parentheses(&text).to_string())
            })
            .collect::<Result<Vec<_>, CodegenError>>()?;
        return Ok(syntax.call(identifier, &args));
    }

    let operands = node
        .children()
        .iter()
        .map(|child| render_node(syntax, child))
        .collect::<Result<Vec<_>, _>>()?;
    let binary = |op: &str| match operands.as_slice() {
        [left, right] => Ok(format!("({left} {op} {right})")),
        _ => Err(unsupported(node)),
    };
    let unary = |op: &str| match operands.as_slice() {
        [operand] => Ok(format!("({op}{operand})")),
        _ => Err(unsupported(node)),
    };

    match node.operator() {
        Operator::RootNode => match operands.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(unsupported(node)),
        },
        Operator::Add => Ok(format!("({})", operands.join(" + "))),
        Operator::Mul => Ok(format!("({})", operands.join(" * "))),
        Operator::Sub => binary("-"),
        Operator::Div => binary("/"),
        Operator::Lt => binary("<"),
        Operator::Gt => binary(">"),
        Operator::Leq => binary("<="),
        Operator::Geq => binary(">="),
        Operator::Eq => binary("=="),
        Operator::Neq => binary("!="),
        Operator::And => binary("&&"),
        Operator::Or => binary("||"),
        Operator::Neg => unary("-"),
        Operator::Not => unary("!"),
        Operator::Exp => match operands.as_slice() {
            [base, exponent] => Ok(syntax.power(base, exponent)),
            _ => Err(unsupported(node)),
        },
        Operator::Const { value } => match value {
            Value::Float(value) => Ok(float_literal(*value)),
            Value::Int(value) => Ok(float_literal(*value as f64)),
            Value::Boolean(value) => Ok(value.to_string()),
            _ => Err(unsupported(node)),
        },
        Operator::VariableIdentifierRead { identifier } => Ok(identifier.to_string()),
        _ => Err(unsupported(node)),
    }
}

/// The argument nodes of a function call. Several arguments arrive as a single
/// tuple operand, possibly wrapped in the node of the enclosing parentheses.
fn function_arguments(node: &Node) -> Vec<&Node> {
    let mut argument = match node.children() {
        [argument] => argument,
        children => return children.iter().collect(),
    };
    while let (Operator::RootNode, [inner]) = (argument.operator(), argument.children()) {
        argument = inner;
    }
    match argument.operator() {
        Operator::RootNode if argument.children().is_empty() => Vec::new(),
        Operator::Const {
            value: Value::Empty,
        } => Vec::new(),
        Operator::Tuple => argument.children().iter().collect(),
        _ => vec![argument],
    }
}

/// Removes one pair of parentheses enclosing the whole text.
fn strip_parentheses(text: &str) -> &str {
    let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        return text;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return text;
        }
    }
    inner
}

fn unsupported(node: &Node) -> CodegenError {
    CodegenError::UnsupportedOperator(format!("{:?}", node.operator()))
}
