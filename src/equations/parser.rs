//! Parsing of equation strings into single equations.

use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use pest::{error::LineColLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use super::{EquationKind, SingleEquation};
use crate::{
    errors::EquationError,
    expression::{Expression, Namespace},
};

#[derive(Parser)]
#[grammar = "equations/grammar.pest"] // relative to src
struct EquationsParser;

fn syntax_error(err: pest::error::Error<Rule>) -> EquationError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    EquationError::Syntax {
        line,
        column,
        text: err.line().to_string(),
        message: err.variant.message().to_string(),
    }
}

/// Parses a string defining equations.
///
/// Each declaration becomes one [`SingleEquation`]; expressions are parsed with the
/// given namespace attached. Identifier checks are not applied here.
///
/// # Arguments
/// * `text` - The equations, one declaration per line
/// * `namespace` - Explicitly provided external values referenced by the expressions
///
/// # Returns
/// The equations in declaration order, or an error if the text does not follow the
/// grammar, a name is declared twice, or a unit or expression cannot be parsed
pub fn parse_string_equations(
    text: &str,
    namespace: &Arc<Namespace>,
) -> Result<Vec<SingleEquation>, EquationError> {
    let pairs = EquationsParser::parse(Rule::equations, text).map_err(syntax_error)?;

    let mut equations: Vec<SingleEquation> = Vec::new();
    for pair in pairs.flat_map(|root| root.into_inner()) {
        let kind = match pair.as_rule() {
            Rule::diff_eq => EquationKind::Differential,
            Rule::static_eq => EquationKind::Static,
            Rule::parameter => EquationKind::Parameter,
            _ => continue,
        };
        let equation = parse_single_equation(kind, pair, namespace)?;
        if equations.iter().any(|eq| eq.name() == equation.name()) {
            return Err(EquationError::DuplicateName(equation.name().to_string()));
        }
        equations.push(equation);
    }
    debug!("Parsed {} equations", equations.len());
    Ok(equations)
}

fn parse_single_equation(
    kind: EquationKind,
    pair: Pair<'_, Rule>,
    namespace: &Arc<Namespace>,
) -> Result<SingleEquation, EquationError> {
    let mut name = "";
    let mut code = None;
    let mut unit = "";
    let mut flags = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = inner.as_str(),
            Rule::expression => code = Some(expression_text(inner)),
            Rule::unit => unit = inner.as_str(),
            Rule::flags => {
                flags = inner
                    .into_inner()
                    .map(|flag| flag.as_str().to_string())
                    .collect()
            }
            _ => {}
        }
    }

    let expr = code
        .map(|code| {
            Expression::with_namespace(&code, namespace.clone()).map_err(|source| {
                EquationError::Expression {
                    name: name.to_string(),
                    source,
                }
            })
        })
        .transpose()?;
    SingleEquation::new(kind, name, unit, expr, flags)
}

/// Joins the lines of a multi-line expression, collapsing runs of whitespace.
fn expression_text(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .flat_map(|chunk| chunk.as_str().split_whitespace())
        .join(" ")
}
