//! Conversion module for transforming evalexpr AST nodes into our internal expression representation.
//!
//! This module handles converting the AST nodes from the evalexpr crate into our own
//! expression types that support symbolic differentiation and dimensional analysis. It maps
//! variables, operators, and function calls into our internal representation.
//!
//! The main entry point is the `build_ast` function which recursively traverses the
//! evalexpr AST and builds up our expression tree.

use evalexpr::{Node, Operator, Value};

use crate::{errors::ExpressionError, expr::Expr};

/// Converts an evalexpr AST node into our internal expression representation.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
///
/// # Returns
/// * `Result<Expr, ExpressionError>` - The converted expression or an error if conversion fails
///
/// # Examples of supported operations:
/// * Basic arithmetic: +, -, *, /
/// * Variables: x, y, etc.
/// * Constants: integer and floating point numbers
/// * Functions: abs(), exp(), ln(), log(), sqrt(), sin(), cos()
/// * Exponentiation: x^n where n is any expression
pub fn build_ast(node: &Node) -> Result<Expr, ExpressionError> {
    let children = node.children();
    match node.operator() {
        Operator::Add => fold_children(children, Expr::Add),
        Operator::Mul => fold_children(children, Expr::Mul),
        Operator::Div => Ok(Expr::Div(
            Box::new(build_ast(child(node, 0)?)?),
            Box::new(build_ast(child(node, 1)?)?),
        )),
        Operator::Sub => Ok(Expr::Sub(
            Box::new(build_ast(child(node, 0)?)?),
            Box::new(build_ast(child(node, 1)?)?),
        )),
        Operator::Const { value } => match value {
            Value::Float(f) => Ok(Expr::Const(*f)),
            Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ExpressionError::UnsupportedOperator(format!(
                "Expected numeric constant: {value:?}"
            ))),
        },
        Operator::VariableIdentifierRead { identifier } => Ok(Expr::Var(identifier.to_string())),
        Operator::Neg => Ok(Expr::Neg(Box::new(build_ast(child(node, 0)?)?))),
        Operator::FunctionIdentifier { identifier } => {
            let argument = Box::new(build_ast(child(node, 0)?)?);
            match identifier.as_str() {
                "abs" => Ok(Expr::Abs(argument)),
                "ln" | "log" => Ok(Expr::Ln(argument)),
                "sqrt" => Ok(Expr::Sqrt(argument)),
                "exp" => Ok(Expr::Exp(argument)),
                "sin" => Ok(Expr::Sin(argument)),
                "cos" => Ok(Expr::Cos(argument)),
                _ => Err(ExpressionError::UnsupportedFunction(identifier.to_string())),
            }
        }
        Operator::RootNode => {
            if children.len() == 1 {
                build_ast(&children[0])
            } else {
                Err(ExpressionError::UnsupportedOperator(format!(
                    "Expected single expression, found {} parts",
                    children.len()
                )))
            }
        }
        // Exponentiation - constant exponents become Pow/PowFloat, anything else PowExpr
        Operator::Exp => {
            let base = Box::new(build_ast(child(node, 0)?)?);
            let exponent = build_ast(child(node, 1)?)?;
            match exponent.try_evaluate_constant() {
                Some(value) if value.fract() == 0.0 && value.abs() < i32::MAX as f64 => {
                    Ok(Expr::Pow(base, value as i64))
                }
                Some(value) => Ok(Expr::PowFloat(base, value)),
                None => Ok(Expr::PowExpr(base, Box::new(exponent))),
            }
        }
        operator => Err(ExpressionError::UnsupportedOperator(format!("{operator:?}"))),
    }
}

fn child(node: &Node, index: usize) -> Result<&Node, ExpressionError> {
    node.children().get(index).ok_or_else(|| {
        ExpressionError::UnsupportedOperator(format!(
            "Missing operand {index} for {:?}",
            node.operator()
        ))
    })
}

fn fold_children(
    children: &[Node],
    combine: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Result<Expr, ExpressionError> {
    let (first, rest) = children.split_first().ok_or_else(|| {
        ExpressionError::UnsupportedOperator("Operator without operands".to_string())
    })?;
    rest.iter().try_fold(build_ast(first)?, |acc, child| {
        Ok(combine(Box::new(acc), Box::new(build_ast(child)?)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalexpr::build_operator_tree;
    use evalexpr::DefaultNumericTypes;

    fn parse(text: &str) -> Result<Expr, ExpressionError> {
        build_ast(&build_operator_tree::<DefaultNumericTypes>(text).unwrap())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            parse("a + b * 2").unwrap(),
            Expr::Add(
                Expr::var("a"),
                Box::new(Expr::Mul(Expr::var("b"), Box::new(Expr::Const(2.0))))
            )
        );
        assert_eq!(
            parse("-v / tau").unwrap(),
            Expr::Div(Box::new(Expr::Neg(Expr::var("v"))), Expr::var("tau"))
        );
    }

    #[test]
    fn test_powers() {
        assert_eq!(parse("x^2").unwrap(), Expr::Pow(Expr::var("x"), 2));
        assert_eq!(parse("x^0.5").unwrap(), Expr::PowFloat(Expr::var("x"), 0.5));
        assert_eq!(
            parse("x^y").unwrap(),
            Expr::PowExpr(Expr::var("x"), Expr::var("y"))
        );
    }

    #[test]
    fn test_functions() {
        assert_eq!(parse("sin(x)").unwrap(), Expr::Sin(Expr::var("x")));
        assert_eq!(parse("log(x)").unwrap(), Expr::Ln(Expr::var("x")));
        assert!(matches!(
            parse("tanh(x)"),
            Err(ExpressionError::UnsupportedFunction(name)) if name == "tanh"
        ));
    }

    #[test]
    fn test_unsupported_operator() {
        assert!(matches!(
            parse("a == b"),
            Err(ExpressionError::UnsupportedOperator(_))
        ));
    }
}
