//! Free-form expressions appearing on the right-hand side of model equations.
//!
//! An [`Expression`] keeps the code exactly as written next to its parsed expression
//! tree. The text is what gets substituted and rendered back, the tree is what the
//! analyses (identifiers, units, linearity, noise separation) work on.
//!
//! Expressions are parsed with evalexpr. Python-style powers (`x**2`) are accepted and
//! normalized to evalexpr's `^` operator.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use evalexpr::{build_operator_tree, DefaultNumericTypes};
use log::warn;

use crate::{
    convert::build_ast,
    errors::{DimensionMismatchError, ExpressionError},
    expr::Expr,
    units::{lookup_unit, Dimension, Quantity},
};

/// External values referenced by expressions, by name.
pub type Namespace = BTreeMap<String, Quantity>;

/// The symbol standing for white noise in stochastic differential equations.
pub const STOCHASTIC_SYMBOL: &str = "xi";

/// Names with a fixed meaning in every model: time, the time step and the noise symbol.
pub const SPECIAL_VARS: [&str; 3] = ["t", "dt", STOCHASTIC_SYMBOL];

/// Dimensions of the special variables. The noise symbol has units of `second**-0.5`.
pub fn special_units() -> [(&'static str, Dimension); 3] {
    [
        ("t", Dimension::time()),
        ("dt", Dimension::time()),
        (STOCHASTIC_SYMBOL, Dimension::time().powf(-0.5)),
    ]
}

/// A parsed expression together with its source text and the namespace it was defined in.
#[derive(Clone)]
pub struct Expression {
    code: String,
    ast: Expr,
    identifiers: BTreeSet<String>,
    namespace: Arc<Namespace>,
}

impl Expression {
    /// Parses an expression with an empty explicit namespace.
    ///
    /// # Example
    /// ```rust
    /// use diffeq_codegen::expression::Expression;
    ///
    /// let expr = Expression::new("-v / tau + sin(2 * pi * t * f)").unwrap();
    /// assert!(expr.identifiers().contains("tau"));
    /// assert!(!expr.identifiers().contains("sin"));
    /// assert!(expr.check_linearity("v"));
    /// ```
    pub fn new(code: &str) -> Result<Self, ExpressionError> {
        Self::with_namespace(code, Arc::new(Namespace::new()))
    }

    /// Parses an expression whose external identifiers are looked up in `namespace`
    /// before falling back to the unit registry.
    pub fn with_namespace(code: &str, namespace: Arc<Namespace>) -> Result<Self, ExpressionError> {
        let code = code.trim().to_string();
        let node = build_operator_tree::<DefaultNumericTypes>(&code.replace("**", "^"))?;
        let ast = build_ast(&node)?;
        let identifiers = ast.variables();
        Ok(Self {
            code,
            ast,
            identifiers,
            namespace,
        })
    }

    fn from_ast(ast: Expr, namespace: Arc<Namespace>) -> Self {
        Self {
            code: ast.to_string(),
            identifiers: ast.variables(),
            ast,
            namespace,
        }
    }

    /// The expression text as written.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The names of all variables the expression refers to. Function names are not included.
    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Creates a new expression from `code`, keeping this expression's namespace.
    pub fn replace_code(&self, code: &str) -> Result<Self, ExpressionError> {
        Self::with_namespace(code, self.namespace.clone())
    }

    /// Resolves the external identifiers of the expression.
    ///
    /// Identifiers listed in `internal` (the model's own variables) and the special
    /// variables are skipped. Every other identifier is looked up first in the explicit
    /// namespace and then among the known units and constants.
    ///
    /// # Arguments
    /// * `internal` - The names defined by the model itself
    ///
    /// # Returns
    /// A namespace with the value of every external identifier, or an error naming the
    /// first identifier that could not be resolved
    pub fn resolve<S: AsRef<str>>(&self, internal: &[S]) -> Result<Namespace, ExpressionError> {
        let mut resolved = Namespace::new();
        for identifier in &self.identifiers {
            let is_internal = internal.iter().any(|name| name.as_ref() == identifier)
                || SPECIAL_VARS.contains(&identifier.as_str());
            if is_internal {
                if self.namespace.contains_key(identifier) {
                    warn!(
                        "{identifier} is defined by the model and in the namespace, \
                         the model definition takes precedence"
                    );
                }
                continue;
            }
            let value = self
                .namespace
                .get(identifier)
                .copied()
                .or_else(|| lookup_unit(identifier))
                .ok_or_else(|| ExpressionError::UnresolvedIdentifier(identifier.clone()))?;
            resolved.insert(identifier.clone(), value);
        }
        Ok(resolved)
    }

    /// Infers the dimension of the expression.
    ///
    /// `units` gives the dimensions of the model variables; all other identifiers are
    /// resolved through the namespace and the unit registry.
    pub fn dimensions(&self, units: &HashMap<String, Dimension>) -> Result<Dimension, ExpressionError> {
        let lookup = |name: &str| {
            units
                .get(name)
                .copied()
                .or_else(|| self.namespace.get(name).map(|q| q.dim))
                .or_else(|| lookup_unit(name).map(|q| q.dim))
        };
        self.ast.dimensions(&lookup)
    }

    /// Checks that the expression has the dimension `expected`.
    pub fn check_units(
        &self,
        expected: &Dimension,
        units: &HashMap<String, Dimension>,
    ) -> Result<(), ExpressionError> {
        let dim = self.dimensions(units)?;
        if dim != *expected {
            return Err(DimensionMismatchError::new(
                format!("Expression {} does not have the expected units", self.code),
                dim,
                *expected,
            )
            .into());
        }
        Ok(())
    }

    /// Whether the expression is affine in `var`. Expressions that do not mention
    /// `var` at all are trivially linear in it.
    pub fn check_linearity(&self, var: &str) -> bool {
        !self.identifiers.contains(var) || self.ast.is_linear_in(var)
    }

    /// Splits the expression into its deterministic and stochastic parts.
    ///
    /// The expression is read as a sum of signed terms. Terms that mention the noise
    /// symbol form the stochastic part and have to be linear in it; all other terms
    /// form the deterministic part.
    ///
    /// # Returns
    /// The deterministic part and, if the noise symbol occurs at all, the stochastic part
    pub fn split_stochastic(&self) -> Result<(Expression, Option<Expression>), ExpressionError> {
        if !self.identifiers.contains(STOCHASTIC_SYMBOL) {
            return Ok((self.clone(), None));
        }

        let mut terms = Vec::new();
        collect_terms(&self.ast, false, &mut terms);

        let (stochastic, deterministic): (Vec<_>, Vec<_>) = terms
            .into_iter()
            .partition(|(_, term)| term.depends_on(STOCHASTIC_SYMBOL));

        for (_, term) in &stochastic {
            if !term.is_linear_in(STOCHASTIC_SYMBOL) {
                return Err(ExpressionError::NonLinearStochastic(term.to_string()));
            }
        }

        Ok((
            Self::from_ast(sum_terms(deterministic), self.namespace.clone()),
            Some(Self::from_ast(sum_terms(stochastic), self.namespace.clone())),
        ))
    }
}

/// Flattens nested sums and differences into `(negated, term)` pairs.
fn collect_terms(expr: &Expr, negated: bool, terms: &mut Vec<(bool, Expr)>) {
    match expr {
        Expr::Add(left, right) => {
            collect_terms(left, negated, terms);
            collect_terms(right, negated, terms);
        }
        Expr::Sub(left, right) => {
            collect_terms(left, negated, terms);
            collect_terms(right, !negated, terms);
        }
        Expr::Neg(inner) => collect_terms(inner, !negated, terms),
        term => terms.push((negated, term.clone())),
    }
}

fn sum_terms(terms: Vec<(bool, Expr)>) -> Expr {
    let mut iter = terms.into_iter();
    let Some((negated, first)) = iter.next() else {
        return Expr::Const(0.0);
    };
    let first = if negated { -first } else { first };
    iter.fold(first, |acc, (negated, term)| {
        if negated {
            acc - term
        } else {
            acc + term
        }
    })
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("code", &self.code)
            .field("identifiers", &self.identifiers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms() -> Quantity {
        lookup_unit("ms").unwrap()
    }

    #[test]
    fn test_identifiers() {
        let expr = Expression::new("-v / tau + sin(2 * pi * t * f)").unwrap();
        let ids: Vec<_> = expr.identifiers().iter().cloned().collect();
        assert_eq!(ids, vec!["f", "pi", "t", "tau", "v"]);
        assert_eq!(expr.code(), "-v / tau + sin(2 * pi * t * f)");
    }

    #[test]
    fn test_python_power_syntax() {
        let expr = Expression::new("sigma * xi / tau**0.5").unwrap();
        assert_eq!(
            *expr.ast(),
            Expr::Div(
                Box::new(Expr::Mul(Expr::var("sigma"), Expr::var("xi"))),
                Box::new(Expr::PowFloat(Expr::var("tau"), 0.5))
            )
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Expression::new("v + * 2"),
            Err(ExpressionError::Parse(_))
        ));
    }

    #[test]
    fn test_check_linearity() {
        let expr = Expression::new("-v / tau + sin(2 * pi * t * f)").unwrap();
        assert!(expr.check_linearity("v"));
        assert!(expr.check_linearity("x"));
        assert!(!expr.check_linearity("tau"));
        assert!(!expr.check_linearity("t"));

        let quadratic = Expression::new("-v * v / tau").unwrap();
        assert!(!quadratic.check_linearity("v"));
    }

    #[test]
    fn test_resolve() {
        let namespace: Namespace = [("tau".to_string(), 5.0 * ms())].into_iter().collect();
        let expr =
            Expression::with_namespace("(-v + I) / tau + t * 0", Arc::new(namespace)).unwrap();

        let resolved = expr.resolve(&["v", "I"]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!((resolved["tau"].value - 5e-3).abs() < 1e-15);

        assert!(matches!(
            expr.resolve(&["v"]),
            Err(ExpressionError::UnresolvedIdentifier(name)) if name == "I"
        ));

        // unit names resolve without an explicit namespace
        let ohmic = Expression::new("v / ohm").unwrap();
        let resolved = ohmic.resolve(&["v"]).unwrap();
        assert_eq!(resolved["ohm"].dim, lookup_unit("ohm").unwrap().dim);
    }

    #[test]
    fn test_check_units() {
        let namespace: Namespace = [("tau".to_string(), 5.0 * ms())].into_iter().collect();
        let expr = Expression::with_namespace("-v / tau", Arc::new(namespace)).unwrap();
        let volt = lookup_unit("volt").unwrap().dim;
        let units: HashMap<String, Dimension> = [("v".to_string(), volt)].into_iter().collect();

        assert!(expr.check_units(&(volt / Dimension::time()), &units).is_ok());
        assert!(matches!(
            expr.check_units(&volt, &units),
            Err(ExpressionError::DimensionMismatch(err)) if err.dim2 == volt
        ));
    }

    #[test]
    fn test_split_stochastic() {
        let expr = Expression::new("(-v + I) / tau + sigma * xi / tau**0.5").unwrap();
        let (deterministic, stochastic) = expr.split_stochastic().unwrap();
        assert!(!deterministic.identifiers().contains("xi"));
        assert!(deterministic.identifiers().contains("I"));
        let stochastic = stochastic.unwrap();
        assert!(stochastic.identifiers().contains("xi"));
        assert!(stochastic.identifiers().contains("sigma"));
        assert!(!stochastic.identifiers().contains("I"));

        let (same, none) = Expression::new("-v / tau").unwrap().split_stochastic().unwrap();
        assert_eq!(same.code(), "-v / tau");
        assert!(none.is_none());

        assert!(matches!(
            Expression::new("-v / tau + 1 / xi").unwrap().split_stochastic(),
            Err(ExpressionError::NonLinearStochastic(_))
        ));
    }

    #[test]
    fn test_replace_code_keeps_namespace() {
        let namespace: Namespace = [("tau".to_string(), ms())].into_iter().collect();
        let expr = Expression::with_namespace("-v / tau", Arc::new(namespace)).unwrap();
        let replaced = expr.replace_code("-(w + 1) / tau").unwrap();
        assert_eq!(replaced.code(), "-(w + 1) / tau");
        assert!(replaced.namespace().contains_key("tau"));
    }
}
