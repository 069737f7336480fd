//! Systems of model equations.
//!
//! A model is described by a string of declarations, one per line:
//!
//! ```text
//! dv/dt = (-v + I) / tau : volt   # differential equation
//! I = g * (E - v) : volt          # static equation
//! g : 1 (constant)                # parameter
//! ```
//!
//! [`Equations`] parses such a string, validates the declared names, checks that the
//! noise symbol `xi` is used at most once and only in a differential equation, sorts
//! the static equations so that each one is evaluated after the static equations it
//! depends on, and checks every equation for dimensional consistency. After
//! construction the system is immutable and offers ordered views, substituted
//! expressions and linearity analyses for downstream integration and code generation.

mod identifiers;
mod parser;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use colored::Colorize;
use itertools::Itertools;
use log::debug;

pub use identifiers::{
    check_identifier_keyword, check_identifier_reserved, check_identifier_syntax,
    check_identifier_underscore, IdentifierCheck, IdentifierChecks,
};
pub use parser::parse_string_equations;

use crate::{
    errors::{EquationError, ExpressionError},
    expression::{special_units, Expression, Namespace, SPECIAL_VARS, STOCHASTIC_SYMBOL},
    units::{parse_unit, Dimension, Quantity},
    utils::word_substitute,
};

/// The three kinds of declarations a model can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EquationKind {
    /// A value without an expression, `name : unit`
    Parameter,
    /// A variable defined by an expression, `name = expr : unit`
    Static,
    /// A state variable defined by its time derivative, `dname/dt = expr : unit`
    Differential,
}

impl fmt::Display for EquationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquationKind::Parameter => write!(f, "parameter"),
            EquationKind::Static => write!(f, "static equation"),
            EquationKind::Differential => write!(f, "differential equation"),
        }
    }
}

/// A single declaration of a model: a parameter, a static or a differential equation.
#[derive(Debug, Clone)]
pub struct SingleEquation {
    kind: EquationKind,
    name: String,
    unit: String,
    dimension: Dimension,
    expr: Option<Expression>,
    flags: Vec<String>,
}

impl SingleEquation {
    /// Creates a new equation.
    ///
    /// # Arguments
    /// * `kind` - The kind of declaration
    /// * `name` - The declared variable
    /// * `unit` - The unit specification, e.g. `volt/second`
    /// * `expr` - The defining expression, required for static and differential equations
    ///   and forbidden for parameters
    /// * `flags` - Flags in declaration order
    ///
    /// # Returns
    /// The equation, or an error if the unit is invalid or the presence of the expression
    /// does not match the kind
    pub fn new(
        kind: EquationKind,
        name: impl Into<String>,
        unit: &str,
        expr: Option<Expression>,
        flags: Vec<String>,
    ) -> Result<Self, EquationError> {
        let name = name.into();
        match (kind, &expr) {
            (EquationKind::Parameter, Some(_)) => {
                return Err(EquationError::InvalidEquation {
                    name,
                    reason: "a parameter cannot have an expression".to_string(),
                })
            }
            (EquationKind::Static | EquationKind::Differential, None) => {
                return Err(EquationError::InvalidEquation {
                    name,
                    reason: format!("a {kind} needs an expression"),
                })
            }
            _ => {}
        }
        let unit = unit.trim().to_string();
        let dimension = parse_unit(&unit)
            .map_err(|source| EquationError::Unit {
                name: name.clone(),
                source,
            })?
            .dim;
        Ok(Self {
            kind,
            name,
            unit,
            dimension,
            expr,
            flags,
        })
    }

    /// Creates a parameter without flags.
    pub fn parameter(name: impl Into<String>, unit: &str) -> Result<Self, EquationError> {
        Self::new(EquationKind::Parameter, name, unit, None, Vec::new())
    }

    /// Creates a static equation without flags.
    pub fn static_equation(
        name: impl Into<String>,
        expr: Expression,
        unit: &str,
    ) -> Result<Self, EquationError> {
        Self::new(EquationKind::Static, name, unit, Some(expr), Vec::new())
    }

    /// Creates a differential equation without flags.
    pub fn differential(
        name: impl Into<String>,
        expr: Expression,
        unit: &str,
    ) -> Result<Self, EquationError> {
        Self::new(EquationKind::Differential, name, unit, Some(expr), Vec::new())
    }

    /// Returns the equation with `flags` appended.
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> EquationKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unit specification as written.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn expr(&self) -> Option<&Expression> {
        self.expr.as_ref()
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// The identifiers used in the expression; empty for parameters.
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.expr
            .as_ref()
            .map(|expr| expr.identifiers().clone())
            .unwrap_or_default()
    }

    /// Returns a copy of this equation with the expression replaced by `code`.
    pub fn replace_code(&self, code: &str) -> Result<Self, EquationError> {
        let expr = match &self.expr {
            Some(expr) => expr.replace_code(code),
            None => Expression::new(code),
        }
        .map_err(|source| self.expression_error(source))?;
        Self::new(
            self.kind,
            self.name.clone(),
            &self.unit,
            Some(expr),
            self.flags.clone(),
        )
    }

    fn expression_error(&self, source: ExpressionError) -> EquationError {
        EquationError::Expression {
            name: self.name.clone(),
            source,
        }
    }
}

/// Renders the equation in the syntax it is parsed from.
impl fmt::Display for SingleEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.expr) {
            (EquationKind::Differential, Some(expr)) => {
                write!(f, "d{}/dt = {} : {}", self.name, expr, self.unit)?
            }
            (_, Some(expr)) => write!(f, "{} = {} : {}", self.name, expr, self.unit)?,
            (_, None) => write!(f, "{} : {}", self.name, self.unit)?,
        }
        if !self.flags.is_empty() {
            write!(f, " ({})", self.flags.join(", "))?;
        }
        Ok(())
    }
}

/// Options for parsing equations.
#[derive(Debug, Clone, Default)]
pub struct EquationsOptions {
    /// External values referenced by the expressions. They take precedence over
    /// unit names and constants.
    pub namespace: Namespace,
    /// The checks every declared name has to pass
    pub identifier_checks: IdentifierChecks,
}

impl EquationsOptions {
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_quantity(mut self, name: impl Into<String>, value: Quantity) -> Self {
        self.namespace.insert(name.into(), value);
        self
    }

    pub fn with_identifier_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), EquationError> + Send + Sync + 'static,
    {
        self.identifier_checks.register(check);
        self
    }
}

/// A validated system of equations.
///
/// # Example
/// ```rust
/// use diffeq_codegen::equations::{Equations, EquationsOptions};
/// use diffeq_codegen::units::lookup_unit;
///
/// let tau = 10.0 * lookup_unit("ms").unwrap();
/// let options = EquationsOptions::default().with_quantity("tau", tau);
/// let eqs = Equations::parse(
///     "dv/dt = (-v + I) / tau : volt
///      I = R * i_ext : volt
///      R : ohm (constant)
///      i_ext : amp (constant)",
///     &options,
/// )
/// .unwrap();
///
/// assert_eq!(eqs.names(), vec!["I", "v", "R", "i_ext"]);
/// assert!(eqs.is_linear().unwrap());
/// ```
#[derive(Clone)]
pub struct Equations {
    equations: Vec<SingleEquation>,
    index: HashMap<String, usize>,
    update_order: HashMap<String, usize>,
}

impl Equations {
    /// Parses an equations string with the default identifier checks and an empty namespace.
    pub fn new(text: &str) -> Result<Self, EquationError> {
        Self::parse(text, &EquationsOptions::default())
    }

    /// Parses an equations string.
    ///
    /// # Arguments
    /// * `text` - The equations, one declaration per line
    /// * `options` - Namespace and identifier checks to use
    ///
    /// # Returns
    /// The validated system, or the first error found while parsing, validating names,
    /// checking the noise symbol, sorting static equations or checking units
    pub fn parse(text: &str, options: &EquationsOptions) -> Result<Self, EquationError> {
        let namespace = Arc::new(options.namespace.clone());
        let equations = parse_string_equations(text, &namespace)?;
        for eq in &equations {
            options.identifier_checks.check(eq.name())?;
        }
        Self::build(equations)
    }

    /// Builds a system from already constructed equations. Names are not checked
    /// against any identifier checks.
    pub fn from_equations(equations: Vec<SingleEquation>) -> Result<Self, EquationError> {
        Self::build(equations)
    }

    fn build(equations: Vec<SingleEquation>) -> Result<Self, EquationError> {
        let mut index = HashMap::new();
        for (i, eq) in equations.iter().enumerate() {
            if index.insert(eq.name.clone(), i).is_some() {
                return Err(EquationError::DuplicateName(eq.name.clone()));
            }
        }

        let mut system = Self {
            equations,
            index,
            update_order: HashMap::new(),
        };
        system.check_stochastic()?;
        system.update_order = system.sort_static_equations()?;
        system.check_units()?;
        debug!("Built system of {} equations", system.equations.len());
        Ok(system)
    }

    fn check_stochastic(&self) -> Result<(), EquationError> {
        let mut previous: Option<&str> = None;
        for eq in &self.equations {
            if !eq.identifiers().contains(STOCHASTIC_SYMBOL) {
                continue;
            }
            if eq.kind != EquationKind::Differential {
                return Err(EquationError::StochasticOutsideDifferential {
                    name: eq.name.clone(),
                });
            }
            if let Some(previous) = previous {
                return Err(EquationError::StochasticInTwoEquations {
                    name: eq.name.clone(),
                    previous: previous.to_string(),
                });
            }
            previous = Some(&eq.name);
        }
        Ok(())
    }

    /// Orders the static equations so that every one comes after the static equations
    /// it refers to. Ties are broken by declaration order.
    fn sort_static_equations(&self) -> Result<HashMap<String, usize>, EquationError> {
        let mut remaining: BTreeMap<usize, BTreeSet<usize>> = self
            .equations
            .iter()
            .enumerate()
            .filter(|(_, eq)| eq.kind == EquationKind::Static)
            .map(|(i, eq)| {
                let dependencies = eq
                    .identifiers()
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .filter(|&j| self.equations[j].kind == EquationKind::Static)
                    .collect();
                (i, dependencies)
            })
            .collect();

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .filter(|(_, dependencies)| dependencies.is_empty())
            .map(|(&i, _)| i)
            .collect();
        remaining.retain(|i, _| !ready.contains(i));

        let mut sorted = Vec::new();
        while let Some(i) = ready.pop_first() {
            sorted.push(i);
            for (&j, dependencies) in remaining.iter_mut() {
                if dependencies.remove(&i) && dependencies.is_empty() {
                    ready.insert(j);
                }
            }
            remaining.retain(|j, _| !ready.contains(j));
        }

        if !remaining.is_empty() {
            return Err(EquationError::DependencyCycle(
                remaining
                    .keys()
                    .map(|&i| self.equations[i].name.clone())
                    .collect(),
            ));
        }

        let k = sorted.len();
        let mut update_order: HashMap<String, usize> = sorted
            .iter()
            .enumerate()
            .map(|(position, &i)| (self.equations[i].name.clone(), position))
            .collect();
        for eq in &self.equations {
            match eq.kind {
                EquationKind::Differential => update_order.insert(eq.name.clone(), k),
                EquationKind::Parameter => update_order.insert(eq.name.clone(), k + 1),
                EquationKind::Static => None,
            };
        }
        debug!(
            "Static equation update order: [{}]",
            sorted.iter().map(|&i| &self.equations[i].name).join(", ")
        );
        Ok(update_order)
    }

    /// The position of the equation in the update order. Static equations come first
    /// (in dependency order), then all differential equations, then all parameters.
    pub fn update_order(&self, name: &str) -> Option<usize> {
        self.update_order.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&SingleEquation> {
        self.index.get(name).map(|&i| &self.equations[i])
    }

    /// Iterates over the equations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SingleEquation> {
        self.equations.iter()
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// The equations sorted by update order, ties broken by declaration order.
    pub fn equations_ordered(&self) -> Vec<&SingleEquation> {
        self.equations
            .iter()
            .sorted_by_key(|eq| self.update_order(&eq.name).unwrap_or(usize::MAX))
            .collect()
    }

    fn ordered_names(&self, kinds: &[EquationKind]) -> Vec<String> {
        self.equations_ordered()
            .into_iter()
            .filter(|eq| kinds.contains(&eq.kind))
            .map(|eq| eq.name.clone())
            .collect()
    }

    /// All declared names in update order.
    pub fn names(&self) -> Vec<String> {
        self.ordered_names(&[
            EquationKind::Static,
            EquationKind::Differential,
            EquationKind::Parameter,
        ])
    }

    pub fn diff_eq_names(&self) -> Vec<String> {
        self.ordered_names(&[EquationKind::Differential])
    }

    pub fn static_eq_names(&self) -> Vec<String> {
        self.ordered_names(&[EquationKind::Static])
    }

    /// Names of static and differential equations in update order.
    pub fn eq_names(&self) -> Vec<String> {
        self.ordered_names(&[EquationKind::Static, EquationKind::Differential])
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.ordered_names(&[EquationKind::Parameter])
    }

    fn ordered_expressions(&self, kinds: &[EquationKind]) -> Vec<(String, Expression)> {
        self.equations_ordered()
            .into_iter()
            .filter(|eq| kinds.contains(&eq.kind))
            .filter_map(|eq| eq.expr.clone().map(|expr| (eq.name.clone(), expr)))
            .collect()
    }

    /// The expressions of the differential equations in update order.
    pub fn diff_eq_expressions(&self) -> Vec<(String, Expression)> {
        self.ordered_expressions(&[EquationKind::Differential])
    }

    /// The expressions of static and differential equations in update order.
    pub fn eq_expressions(&self) -> Vec<(String, Expression)> {
        self.ordered_expressions(&[EquationKind::Static, EquationKind::Differential])
    }

    /// The dimensions of all model variables, including `t`, `dt` and `xi`.
    pub fn units(&self) -> HashMap<String, Dimension> {
        self.equations
            .iter()
            .map(|eq| (eq.name.clone(), eq.dimension))
            .chain(
                special_units()
                    .into_iter()
                    .map(|(name, dim)| (name.to_string(), dim)),
            )
            .collect()
    }

    /// All variable names, including `t`, `dt` and `xi`.
    pub fn variables(&self) -> BTreeSet<String> {
        self.equations
            .iter()
            .map(|eq| eq.name.clone())
            .chain(SPECIAL_VARS.iter().map(|name| name.to_string()))
            .collect()
    }

    /// The expressions of the differential equations with all static equations
    /// substituted in.
    ///
    /// Static equations are visited in update order and each one's code, with earlier
    /// substitutions applied, replaces its name wherever it occurs later. The external
    /// identifiers of every resulting expression have to be resolvable.
    pub fn substituted_expressions(&self) -> Result<Vec<(String, Expression)>, EquationError> {
        let names = self.names();
        let mut substitutions: HashMap<String, String> = HashMap::new();
        let mut result = Vec::new();
        for eq in self.equations_ordered() {
            let Some(expr) = &eq.expr else {
                continue;
            };
            let code = word_substitute(expr.code(), &substitutions);
            match eq.kind {
                EquationKind::Static => {
                    debug!("Substituting {} by ({code})", eq.name);
                    substitutions.insert(eq.name.clone(), format!("({code})"));
                }
                EquationKind::Differential => {
                    let substituted = expr
                        .replace_code(&code)
                        .map_err(|source| eq.expression_error(source))?;
                    substituted
                        .resolve(&names)
                        .map_err(|source| eq.expression_error(source))?;
                    result.push((eq.name.clone(), substituted));
                }
                EquationKind::Parameter => {}
            }
        }
        Ok(result)
    }

    /// Whether every differential equation is linear in its own variable and does not
    /// depend on time. Parameters without the `constant` flag are allowed here, only
    /// [`Equations::is_linear`] rejects them.
    pub fn is_conditionally_linear(&self) -> Result<bool, EquationError> {
        for (name, expr) in self.substituted_expressions()? {
            if expr.identifiers().contains("t") || !expr.check_linearity(&name) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether the system is linear: no differential equation depends on time or on a
    /// parameter without the `constant` flag, and each one is linear in every state
    /// variable.
    pub fn is_linear(&self) -> Result<bool, EquationError> {
        let diff_eq_names = self.diff_eq_names();
        let non_constant: Vec<&str> = self
            .equations
            .iter()
            .filter(|eq| eq.kind == EquationKind::Parameter && !eq.has_flag("constant"))
            .map(|eq| eq.name())
            .collect();
        for (_, expr) in self.substituted_expressions()? {
            let identifiers = expr.identifiers();
            if identifiers.contains("t")
                || non_constant.iter().any(|name| identifiers.contains(*name))
            {
                return Ok(false);
            }
            if !diff_eq_names.iter().all(|var| expr.check_linearity(var)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checks the units of all equations.
    ///
    /// The right-hand side of a differential equation has to have the dimension of the
    /// variable divided by time, that of a static equation the dimension of the variable.
    pub fn check_units(&self) -> Result<(), EquationError> {
        let units = self.units();
        let second = Dimension::time();
        for eq in &self.equations {
            let Some(expr) = &eq.expr else {
                continue;
            };
            let expected = match eq.kind {
                EquationKind::Differential => eq.dimension / second,
                _ => eq.dimension,
            };
            expr.check_units(&expected, &units).map_err(|err| match err {
                ExpressionError::DimensionMismatch(source) => EquationError::DimensionMismatch {
                    name: eq.name.clone(),
                    kind: eq.kind,
                    source,
                },
                other => eq.expression_error(other),
            })?;
        }
        Ok(())
    }

    /// Checks the flags of all equations against a whitelist per equation kind.
    /// Not listing a kind is the same as allowing no flags for it.
    pub fn check_flags(
        &self,
        allowed_flags: &HashMap<EquationKind, Vec<String>>,
    ) -> Result<(), EquationError> {
        for eq in &self.equations {
            for flag in &eq.flags {
                let allowed = match allowed_flags.get(&eq.kind) {
                    Some(allowed) if !allowed.is_empty() => allowed,
                    _ => return Err(EquationError::FlagsNotAllowed { kind: eq.kind }),
                };
                if !allowed.contains(flag) {
                    return Err(EquationError::FlagNotAllowed {
                        kind: eq.kind,
                        flag: flag.clone(),
                        allowed: allowed.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs `checks` against every declared name.
    pub fn check_identifiers(&self, checks: &IdentifierChecks) -> Result<(), EquationError> {
        self.equations.iter().try_for_each(|eq| checks.check(&eq.name))
    }

    /// Resolves the external identifiers of all expressions.
    ///
    /// # Panics
    /// If two expressions resolve the same name to different values, which can only
    /// happen when equations from different namespaces were combined.
    pub fn resolve(&self) -> Result<Namespace, EquationError> {
        let variables: Vec<String> = self.variables().into_iter().collect();
        let mut namespace = Namespace::new();
        for eq in &self.equations {
            let Some(expr) = &eq.expr else {
                continue;
            };
            let resolved = expr
                .resolve(&variables)
                .map_err(|source| eq.expression_error(source))?;
            for (name, value) in resolved {
                if let Some(existing) = namespace.get(&name) {
                    assert_eq!(
                        *existing, value,
                        "identifier {name} resolved to different values"
                    );
                }
                namespace.insert(name, value);
            }
        }
        Ok(namespace)
    }
}

/// Renders the equations in update order, one per line.
impl fmt::Display for Equations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.equations_ordered().iter().join("\n"))
    }
}

impl fmt::Debug for Equations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", "Equations".cyan())?;
        for eq in self.equations_ordered() {
            writeln!(
                f,
                "    {} {} {}",
                format!("[{}]", self.update_order(&eq.name).unwrap_or(usize::MAX)).bold(),
                eq.kind.to_string().green(),
                eq
            )?;
        }
        write!(f, "}}")
    }
}
