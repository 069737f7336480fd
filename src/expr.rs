//! Expression module for representing mathematical expressions symbolically.
//!
//! This module defines the expression tree used to analyze the right-hand sides of
//! model equations. The main type is:
//!
//! - `Expr`: An enum representing different kinds of mathematical expressions
//!
//! The expression tree is built recursively using `Box<Expr>` for nested expressions and can be:
//! - Symbolically differentiated to compute derivatives
//! - Simplified using algebraic rules
//! - Modified by inserting replacement expressions
//! - Walked to infer the physical dimension of the result
//!
//! Supported operations include:
//! - Basic arithmetic (+, -, *, /)
//! - Variables and constants
//! - Absolute value
//! - Integer, floating point and symbolic exponentiation
//! - Transcendental functions (exp, ln, sqrt, sin, cos)
//!
//! # Expression Tree Structure
//! The expression tree is built recursively with each node being one of:
//! - Leaf nodes: Constants and Variables
//! - Unary operations: Abs, Neg, Exp, Ln, Sqrt, Sin, Cos
//! - Binary operations: Add, Sub, Mul, Div
//! - Power nodes: Pow (integer exponent), PowFloat, PowExpr
//!
//! # Symbolic Differentiation
//! The derivative method implements symbolic differentiation by recursively applying
//! calculus rules like:
//! - Product rule
//! - Quotient rule
//! - Chain rule
//! - Power rule
//! - Special function derivatives (exp, ln, sqrt, sin, cos)
//!
//! Linearity checks are built on top of it: an expression is linear in `x` when the
//! simplified derivative with respect to `x` no longer mentions `x`.
//!
//! # Expression Simplification
//! The simplify method performs algebraic simplifications including:
//! - Constant folding (e.g. 2 + 3 → 5)
//! - Identity rules (e.g. x + 0 → x, x * 1 → x)
//! - Exponent rules (e.g. x^0 → 1, x^1 → x)
//! - Special function simplifications
//!
//! # Dimensional Analysis
//! The dimensions method propagates physical dimensions through the tree. Sums need
//! operands of equal dimension, transcendental functions need dimensionless arguments.

use std::{collections::BTreeSet, ops};

use crate::{
    errors::{DimensionMismatchError, ExpressionError},
    units::Dimension,
};

/// An expression tree node representing mathematical operations.
///
/// This enum represents different types of mathematical expressions that can be:
/// - Symbolically differentiated to compute derivatives
/// - Simplified using algebraic rules
/// - Modified by inserting replacement expressions
///
/// The expression tree is built recursively using Box<Expr> for nested expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A reference to a named variable
    Var(String),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation of an expression by a floating point constant
    PowFloat(Box<Expr>, f64),
    /// Exponentiation of an expression by another expression
    PowExpr(Box<Expr>, Box<Expr>),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
}

impl Expr {
    /// Creates a variable node.
    pub fn var(name: impl Into<String>) -> Box<Expr> {
        Box::new(Expr::Var(name.into()))
    }

    /// Computes the symbolic derivative with respect to the variable `var`.
    ///
    /// The usual rules apply (sum, product, quotient and chain rule). Every other
    /// identifier is treated as a constant. The result is not simplified, call
    /// [`Expr::simplify`] on it.
    pub fn derivative(&self, var: &str) -> Expr {
        let d = |expr: &Expr| expr.derivative(var);
        match self {
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Var(name) if name == var => Expr::Const(1.0),
            Expr::Var(_) => Expr::Const(0.0),
            Expr::Add(f, g) => d(f) + d(g),
            Expr::Sub(f, g) => d(f) - d(g),
            Expr::Mul(f, g) => d(f) * (**g).clone() + (**f).clone() * d(g),
            Expr::Div(f, g) => {
                (d(f) * (**g).clone() - (**f).clone() * d(g)) / Expr::Pow(g.clone(), 2)
            }
            Expr::Abs(f) => (**f).clone() / self.clone() * d(f),
            Expr::Pow(f, n) => Expr::Const(*n as f64) * Expr::Pow(f.clone(), n - 1) * d(f),
            Expr::PowFloat(f, p) => Expr::Const(*p) * Expr::PowFloat(f.clone(), p - 1.0) * d(f),
            // f^g * (g' ln(f) + g f' / f)
            Expr::PowExpr(f, g) => {
                self.clone() * (d(g) * Expr::Ln(f.clone()) + (**g).clone() * d(f) / (**f).clone())
            }
            Expr::Exp(f) => self.clone() * d(f),
            Expr::Ln(f) => d(f) / (**f).clone(),
            Expr::Sqrt(f) => d(f) / (Expr::Const(2.0) * self.clone()),
            Expr::Sin(f) => Expr::Cos(f.clone()) * d(f),
            Expr::Cos(f) => -Expr::Sin(f.clone()) * d(f),
            Expr::Neg(f) => -d(f),
        }
    }

    /// Simplifies the expression bottom-up.
    ///
    /// Subtrees without variables are folded into constants. Neutral and absorbing
    /// elements are removed (`x + 0`, `x * 1`, `x * 0`, `0 / x`), equal operands
    /// cancel (`x - x`, `x / x`) and a few identities of the elementary functions
    /// are applied (`exp(ln(x))`, `sqrt(x^2)`, `abs(-x)`).
    pub fn simplify(&self) -> Expr {
        let node = self.map_children(Expr::simplify);
        if !matches!(node, Expr::Const(_) | Expr::Var(_)) {
            if let Some(value) = node.try_evaluate_constant() {
                return Expr::Const(value);
            }
        }

        match node {
            Expr::Add(f, g) => match (*f, *g) {
                (Expr::Const(z), e) | (e, Expr::Const(z)) if z == 0.0 => e,
                (e, Expr::Neg(g)) => (e - *g).simplify(),
                (Expr::Mul(c1, x1), Expr::Mul(c2, x2)) if x1 == x2 => {
                    ((*c1 + *c2).simplify() * *x1).simplify()
                }
                (f, g) => f + g,
            },
            Expr::Sub(f, g) => match (*f, *g) {
                (e, Expr::Const(z)) if z == 0.0 => e,
                (Expr::Const(z), e) if z == 0.0 => (-e).simplify(),
                (f, g) if f == g => Expr::Const(0.0),
                (e, Expr::Neg(g)) => e + *g,
                (f, g) => f - g,
            },
            Expr::Mul(f, g) => match (*f, *g) {
                (Expr::Const(z), _) | (_, Expr::Const(z)) if z == 0.0 => Expr::Const(0.0),
                (Expr::Const(one), e) | (e, Expr::Const(one)) if one == 1.0 => e,
                (Expr::Const(m), e) | (e, Expr::Const(m)) if m == -1.0 => (-e).simplify(),
                (f, g) if f == g => Expr::Pow(Box::new(f), 2),
                (Expr::Const(a), Expr::Mul(b, e)) if matches!(*b, Expr::Const(_)) => {
                    ((Expr::Const(a) * *b).simplify() * *e).simplify()
                }
                (f, g) => f * g,
            },
            Expr::Div(f, g) => match (*f, *g) {
                (Expr::Const(z), _) if z == 0.0 => Expr::Const(0.0),
                (e, Expr::Const(one)) if one == 1.0 => e,
                (f, g) if f == g => Expr::Const(1.0),
                (f, g) => f / g,
            },
            Expr::Neg(f) => match *f {
                Expr::Neg(e) => *e,
                e => -e,
            },
            Expr::Pow(_, 0) => Expr::Const(1.0),
            Expr::Pow(base, 1) => *base,
            Expr::Pow(base, n) => match *base {
                Expr::Pow(inner, m) => match m.checked_mul(n) {
                    Some(mn) => Expr::Pow(inner, mn),
                    None => Expr::PowFloat(inner, m as f64 * n as f64),
                },
                base => Expr::Pow(Box::new(base), n),
            },
            Expr::PowFloat(base, p) if p.fract() == 0.0 && p.abs() < i32::MAX as f64 => {
                Expr::Pow(base, p as i64).simplify()
            }
            Expr::PowExpr(base, exponent) => match *exponent {
                Expr::Const(p) => Expr::PowFloat(base, p).simplify(),
                exponent => Expr::PowExpr(base, Box::new(exponent)),
            },
            Expr::Abs(f) => match *f {
                Expr::Abs(e) | Expr::Neg(e) => Expr::Abs(e),
                e => Expr::Abs(Box::new(e)),
            },
            Expr::Exp(f) => match *f {
                Expr::Ln(e) => *e,
                e => Expr::Exp(Box::new(e)),
            },
            Expr::Ln(f) => match *f {
                Expr::Exp(e) => *e,
                e => Expr::Ln(Box::new(e)),
            },
            Expr::Sqrt(f) => match *f {
                Expr::Pow(e, 2) => Expr::Abs(e),
                e => Expr::Sqrt(Box::new(e)),
            },
            node => node,
        }
    }

    /// Rebuilds the node with `f` applied to each direct child.
    fn map_children(&self, f: impl Fn(&Expr) -> Expr) -> Expr {
        let g = |expr: &Expr| Box::new(f(expr));
        match self {
            Expr::Const(_) | Expr::Var(_) => self.clone(),
            Expr::Add(a, b) => Expr::Add(g(a), g(b)),
            Expr::Sub(a, b) => Expr::Sub(g(a), g(b)),
            Expr::Mul(a, b) => Expr::Mul(g(a), g(b)),
            Expr::Div(a, b) => Expr::Div(g(a), g(b)),
            Expr::PowExpr(a, b) => Expr::PowExpr(g(a), g(b)),
            Expr::Pow(a, n) => Expr::Pow(g(a), *n),
            Expr::PowFloat(a, p) => Expr::PowFloat(g(a), *p),
            Expr::Abs(a) => Expr::Abs(g(a)),
            Expr::Exp(a) => Expr::Exp(g(a)),
            Expr::Ln(a) => Expr::Ln(g(a)),
            Expr::Sqrt(a) => Expr::Sqrt(g(a)),
            Expr::Sin(a) => Expr::Sin(g(a)),
            Expr::Cos(a) => Expr::Cos(g(a)),
            Expr::Neg(a) => Expr::Neg(g(a)),
        }
    }

    /// Returns the names of all variables referenced in the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => {
                names.insert(name.clone());
            }
            Expr::Add(left, right)
            | Expr::Mul(left, right)
            | Expr::Sub(left, right)
            | Expr::Div(left, right)
            | Expr::PowExpr(left, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Abs(expr)
            | Expr::Pow(expr, _)
            | Expr::PowFloat(expr, _)
            | Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::Sqrt(expr)
            | Expr::Sin(expr)
            | Expr::Cos(expr)
            | Expr::Neg(expr) => expr.collect_variables(names),
        }
    }

    /// Whether the variable `name` occurs anywhere in the expression.
    pub fn depends_on(&self, name: &str) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(var) => var == name,
            Expr::Add(left, right)
            | Expr::Mul(left, right)
            | Expr::Sub(left, right)
            | Expr::Div(left, right)
            | Expr::PowExpr(left, right) => left.depends_on(name) || right.depends_on(name),
            Expr::Abs(expr)
            | Expr::Pow(expr, _)
            | Expr::PowFloat(expr, _)
            | Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::Sqrt(expr)
            | Expr::Sin(expr)
            | Expr::Cos(expr)
            | Expr::Neg(expr) => expr.depends_on(name),
        }
    }

    /// Whether the expression is affine in `name`, i.e. of the form `a*name + b` with
    /// `a` and `b` independent of `name`.
    pub fn is_linear_in(&self, name: &str) -> bool {
        !self.derivative(name).simplify().depends_on(name)
    }

    /// Tries to evaluate expression as constant (aggressive constant folding)
    pub fn try_evaluate_constant(&self) -> Option<f64> {
        match self {
            Expr::Const(val) => Some(*val),
            Expr::Var(_) => None,
            Expr::Add(left, right) => {
                Some(left.try_evaluate_constant()? + right.try_evaluate_constant()?)
            }
            Expr::Sub(left, right) => {
                Some(left.try_evaluate_constant()? - right.try_evaluate_constant()?)
            }
            Expr::Mul(left, right) => {
                Some(left.try_evaluate_constant()? * right.try_evaluate_constant()?)
            }
            Expr::Div(left, right) => {
                let r = right.try_evaluate_constant()?;
                if r.abs() < 1e-10 {
                    return None;
                }
                Some(left.try_evaluate_constant()? / r)
            }
            Expr::Abs(expr) => Some(expr.try_evaluate_constant()?.abs()),
            Expr::Neg(expr) => Some(-expr.try_evaluate_constant()?),
            Expr::Pow(base, exp) => {
                let val = base.try_evaluate_constant()?;
                Some(match i32::try_from(*exp) {
                    Ok(exp) => val.powi(exp),
                    Err(_) => val.powf(*exp as f64),
                })
            }
            Expr::PowFloat(base, exp) => Some(base.try_evaluate_constant()?.powf(*exp)),
            Expr::PowExpr(base, exponent) => Some(
                base.try_evaluate_constant()?
                    .powf(exponent.try_evaluate_constant()?),
            ),
            Expr::Exp(expr) => Some(expr.try_evaluate_constant()?.exp()),
            Expr::Ln(expr) => {
                let val = expr.try_evaluate_constant()?;
                if val <= 0.0 {
                    return None;
                }
                Some(val.ln())
            }
            Expr::Sqrt(expr) => {
                let val = expr.try_evaluate_constant()?;
                if val < 0.0 {
                    return None;
                }
                Some(val.sqrt())
            }
            Expr::Sin(expr) => Some(expr.try_evaluate_constant()?.sin()),
            Expr::Cos(expr) => Some(expr.try_evaluate_constant()?.cos()),
        }
    }

    /// Infers the physical dimension of the expression.
    ///
    /// # Arguments
    /// * `lookup` - Resolves a variable name to its dimension, `None` if unknown
    ///
    /// # Returns
    /// The dimension of the result, or an error if a variable cannot be resolved or
    /// two operands have incompatible dimensions
    pub fn dimensions<F>(&self, lookup: &F) -> Result<Dimension, ExpressionError>
    where
        F: Fn(&str) -> Option<Dimension>,
    {
        match self {
            Expr::Const(_) => Ok(Dimension::DIMENSIONLESS),
            Expr::Var(name) => {
                lookup(name).ok_or_else(|| ExpressionError::UnresolvedIdentifier(name.clone()))
            }
            Expr::Add(left, right) | Expr::Sub(left, right) => {
                let l = left.dimensions(lookup)?;
                let r = right.dimensions(lookup)?;
                if l != r {
                    let operation = if matches!(self, Expr::Add(..)) {
                        "Addition"
                    } else {
                        "Subtraction"
                    };
                    return Err(DimensionMismatchError::new(
                        format!("{operation} of {left} and {right}"),
                        l,
                        r,
                    )
                    .into());
                }
                Ok(l)
            }
            Expr::Mul(left, right) => Ok(left.dimensions(lookup)? * right.dimensions(lookup)?),
            Expr::Div(left, right) => Ok(left.dimensions(lookup)? / right.dimensions(lookup)?),
            Expr::Abs(expr) | Expr::Neg(expr) => expr.dimensions(lookup),
            Expr::Pow(base, exp) => Ok(base.dimensions(lookup)?.powi(*exp)),
            Expr::PowFloat(base, exp) => Ok(base.dimensions(lookup)?.powf(*exp)),
            Expr::PowExpr(base, exponent) => {
                let e = exponent.dimensions(lookup)?;
                if !e.is_dimensionless() {
                    return Err(DimensionMismatchError::new(
                        format!("Exponent {exponent}"),
                        e,
                        Dimension::DIMENSIONLESS,
                    )
                    .into());
                }
                let b = base.dimensions(lookup)?;
                match exponent.try_evaluate_constant() {
                    Some(value) => Ok(b.powf(value)),
                    None if b.is_dimensionless() => Ok(b),
                    None => Err(DimensionMismatchError::new(
                        format!("Base {base} raised to non-constant power"),
                        b,
                        Dimension::DIMENSIONLESS,
                    )
                    .into()),
                }
            }
            Expr::Sqrt(expr) => Ok(expr.dimensions(lookup)?.powf(0.5)),
            Expr::Exp(expr) | Expr::Ln(expr) | Expr::Sin(expr) | Expr::Cos(expr) => {
                let d = expr.dimensions(lookup)?;
                if !d.is_dimensionless() {
                    return Err(DimensionMismatchError::new(
                        format!("Argument of {}", self.function_name()),
                        d,
                        Dimension::DIMENSIONLESS,
                    )
                    .into());
                }
                Ok(Dimension::DIMENSIONLESS)
            }
        }
    }

    fn function_name(&self) -> &'static str {
        match self {
            Expr::Exp(_) => "exp",
            Expr::Ln(_) => "ln",
            Expr::Sin(_) => "sin",
            Expr::Cos(_) => "cos",
            Expr::Sqrt(_) => "sqrt",
            Expr::Abs(_) => "abs",
            _ => "expression",
        }
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

binary_operator!(Add, add, Add);
binary_operator!(Sub, sub, Sub);
binary_operator!(Mul, mul, Mul);
binary_operator!(Div, div, Div);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// Implements string formatting for expressions.
///
/// The output is valid input for the expression parser again:
/// - Constants are formatted as numbers, negative ones in parentheses
/// - Variables are formatted as their names
/// - Binary operations (+,-,*,/) are wrapped in parentheses
/// - Functions (abs, exp, ln, sqrt, sin, cos) use function call notation
/// - Exponents use ^
/// - Negation uses - prefix
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) if *val < 0.0 => write!(f, "({val})"),
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Abs(expr) => write!(f, "abs({expr})"),
            Expr::Pow(base, exp) if *exp < 0 => write!(f, "({base}^({exp}))"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowFloat(base, exp) if *exp < 0.0 => write!(f, "({base}^({exp}))"),
            Expr::PowFloat(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowExpr(base, exponent) => write!(f, "({base}^{exponent})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Sin(expr) => write!(f, "sin({expr})"),
            Expr::Cos(expr) => write!(f, "cos({expr})"),
            Expr::Neg(expr) => write!(f, "-({expr})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Expr::var(name)
    }

    #[test]
    fn test_simplify() {
        let x = || Expr::Var("x".to_string());
        let c = Expr::Const;

        assert_eq!((c(2.0) + c(3.0)).simplify(), c(5.0));
        assert_eq!((x() + c(0.0)).simplify(), x());
        assert_eq!((x() * c(1.0)).simplify(), x());
        assert_eq!((x() * c(0.0)).simplify(), c(0.0));
        assert_eq!((x() / x()).simplify(), c(1.0));
        assert_eq!((x() - x()).simplify(), c(0.0));
        assert_eq!((c(0.0) - x()).simplify(), -x());
        assert_eq!((x() * x()).simplify(), Expr::Pow(var("x"), 2));
        assert_eq!(Expr::Pow(var("x"), 0).simplify(), c(1.0));
        assert_eq!(Expr::Pow(var("x"), 1).simplify(), x());
        assert_eq!(Expr::Abs(Box::new(Expr::Abs(var("x")))).simplify(), Expr::Abs(var("x")));
        assert_eq!(Expr::Exp(Box::new(Expr::Ln(var("x")))).simplify(), x());
        assert_eq!(
            Expr::Sqrt(Box::new(Expr::Pow(var("x"), 2))).simplify(),
            Expr::Abs(var("x"))
        );
        // 2 * x + 3 * x -> 5 * x
        assert_eq!(
            (c(2.0) * x() + c(3.0) * x()).simplify(),
            c(5.0) * x()
        );
        // division by zero is left alone
        assert_eq!((c(1.0) / c(0.0)).simplify(), c(1.0) / c(0.0));
    }

    #[test]
    fn test_simplify_large_powers() {
        let big = 2_000_000_000;
        let nested = Expr::Pow(
            Box::new(Expr::Pow(Box::new(Expr::Pow(var("x"), big)), big)),
            big,
        );
        let simplified = nested.simplify();
        assert!(matches!(simplified, Expr::PowFloat(_, p) if p == 8e27));
        assert_eq!(simplified.simplify(), simplified);
        assert!(!nested.is_linear_in("x"));

        let constant = Expr::Pow(Box::new(Expr::Const(1.0)), 4_000_000_000_000_000_000);
        assert_eq!(constant.try_evaluate_constant(), Some(1.0));
    }

    #[test]
    fn test_derivative() {
        assert_eq!(Expr::Const(5.0).derivative("x"), Expr::Const(0.0));
        assert_eq!(var("x").derivative("x"), Expr::Const(1.0));
        assert_eq!(var("y").derivative("x"), Expr::Const(0.0));

        let product = Expr::Mul(var("x"), var("y"));
        assert_eq!(
            product.derivative("x"),
            Expr::Const(1.0) * *var("y") + *var("x") * Expr::Const(0.0)
        );
        assert_eq!(product.derivative("x").simplify(), *var("y"));

        // d/dv (-v / tau) = -1 / tau after simplification
        let decay = Expr::Div(Box::new(Expr::Neg(var("v"))), var("tau"));
        let slope = decay.derivative("v").simplify();
        assert!(!slope.depends_on("v"));
        assert!(slope.depends_on("tau"));

        // d/dx exp(2x) = exp(2x) * 2
        let growth = Expr::Exp(Box::new(Expr::Const(2.0) * *var("x")));
        assert_eq!(
            growth.derivative("x").simplify(),
            growth.clone() * Expr::Const(2.0)
        );
    }

    #[test]
    fn test_linearity() {
        // -v / tau
        let decay = Expr::Div(Box::new(Expr::Neg(var("v"))), var("tau"));
        assert!(decay.is_linear_in("v"));
        assert!(!decay.is_linear_in("tau"));
        assert!(decay.is_linear_in("w"));

        // -v * v / tau
        let quadratic = Expr::Div(
            Box::new(Expr::Mul(Box::new(Expr::Neg(var("v"))), var("v"))),
            var("tau"),
        );
        assert!(!quadratic.is_linear_in("v"));

        // sin(v) is not affine
        assert!(!Expr::Sin(var("v")).is_linear_in("v"));
    }

    #[test]
    fn test_variables() {
        let expr = Expr::Add(
            Box::new(Expr::Mul(var("a"), Box::new(Expr::Exp(var("b"))))),
            var("a"),
        );
        let names: Vec<_> = expr.variables().into_iter().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert!(expr.depends_on("b"));
        assert!(!expr.depends_on("c"));
    }

    #[test]
    fn test_dimensions() {
        let volt = Dimension::new([2.0, 1.0, -3.0, -1.0, 0.0, 0.0, 0.0]);
        let lookup = |name: &str| match name {
            "v" => Some(volt),
            "tau" => Some(Dimension::time()),
            _ => None,
        };

        let rate = Expr::Div(var("v"), var("tau"));
        assert_eq!(rate.dimensions(&lookup).unwrap(), volt / Dimension::time());

        let bad_sum = Expr::Add(var("v"), var("tau"));
        assert!(matches!(
            bad_sum.dimensions(&lookup),
            Err(ExpressionError::DimensionMismatch(_))
        ));

        let bad_exp = Expr::Exp(var("tau"));
        assert!(bad_exp.dimensions(&lookup).is_err());

        let unknown = Expr::Mul(var("v"), var("w"));
        assert!(matches!(
            unknown.dimensions(&lookup),
            Err(ExpressionError::UnresolvedIdentifier(name)) if name == "w"
        ));

        let root = Expr::Sqrt(Box::new(Expr::Pow(var("tau"), 2)));
        assert_eq!(root.dimensions(&lookup).unwrap(), Dimension::time());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Expr::Const(5.0)), "5");
        assert_eq!(format!("{}", Expr::Const(-2.5)), "(-2.5)");
        assert_eq!(format!("{}", *var("x")), "x");

        let sum = Expr::Add(var("x"), var("y"));
        assert_eq!(format!("{sum}"), "(x + y)");

        let abs = Expr::Abs(var("x"));
        assert_eq!(format!("{abs}"), "abs(x)");

        let complex = Expr::Div(
            Box::new(Expr::Add(Box::new(Expr::Pow(var("x"), 2)), var("y"))),
            var("z"),
        );
        assert_eq!(format!("{complex}"), "(((x^2) + y) / z)");
    }
}
