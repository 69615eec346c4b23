//! Expressions and predicates carried by query graphs.
//!
//! The planner never evaluates expressions. It only needs to know which
//! variables an expression depends on, whether it is a label or index-usable
//! comparison, and how to render it for explain output and error messages.

use std::collections::BTreeSet;
use std::fmt;

/// Identifier bound by a pattern, an argument, or a projection.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(pub String);

impl Var {
    /// Creates a variable from any string-like name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the variable name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Var {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Var> for Var {
    fn from(value: &Var) -> Self {
        value.clone()
    }
}

/// Literal values. No floats: expressions must stay `Ord`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Literal {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer value.
    Int(i64),
    /// String value.
    String(String),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// Binary comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Expression tree.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Expression {
    /// Reference to a bound variable.
    Variable(Var),
    /// Property lookup on a variable.
    Property {
        /// Entity variable.
        var: Var,
        /// Property key.
        key: String,
    },
    /// Literal value.
    Literal(Literal),
    /// Query parameter (`$name`).
    Parameter(String),
    /// Label test (`n:A:B`).
    HasLabels {
        /// Node variable.
        var: Var,
        /// Required labels.
        labels: Vec<String>,
    },
    /// Binary comparison.
    Comparison {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<Expression>,
        /// Right operand.
        rhs: Box<Expression>,
    },
    /// Conjunction.
    And(Vec<Expression>),
    /// Disjunction.
    Or(Vec<Expression>),
    /// Negation.
    Not(Box<Expression>),
    /// `expr IS NOT NULL`.
    IsNotNull(Box<Expression>),
    /// Opaque function call.
    FunctionCall {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Variable reference.
    pub fn var(name: impl Into<Var>) -> Self {
        Expression::Variable(name.into())
    }

    /// Property lookup `var.key`.
    pub fn prop(var: impl Into<Var>, key: impl Into<String>) -> Self {
        Expression::Property {
            var: var.into(),
            key: key.into(),
        }
    }

    /// Literal value.
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expression::Literal(value.into())
    }

    /// Parameter reference.
    pub fn param(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    /// Label test for a single label.
    pub fn has_label(var: impl Into<Var>, label: impl Into<String>) -> Self {
        Expression::HasLabels {
            var: var.into(),
            labels: vec![label.into()],
        }
    }

    /// Comparison `lhs op rhs`.
    pub fn compare(op: CompareOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Equality `lhs = rhs`.
    pub fn equals(lhs: Expression, rhs: Expression) -> Self {
        Self::compare(CompareOp::Eq, lhs, rhs)
    }

    /// Variables this expression reads.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        self.collect_dependencies(&mut out);
        out
    }

    fn collect_dependencies(&self, out: &mut BTreeSet<Var>) {
        match self {
            Expression::Variable(var)
            | Expression::Property { var, .. }
            | Expression::HasLabels { var, .. } => {
                out.insert(var.clone());
            }
            Expression::Literal(_) | Expression::Parameter(_) => {}
            Expression::Comparison { lhs, rhs, .. } => {
                lhs.collect_dependencies(out);
                rhs.collect_dependencies(out);
            }
            Expression::And(terms) | Expression::Or(terms) => {
                for term in terms {
                    term.collect_dependencies(out);
                }
            }
            Expression::Not(inner) | Expression::IsNotNull(inner) => {
                inner.collect_dependencies(out)
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(out);
                }
            }
        }
    }

    /// Returns the variable when the expression is a bare variable reference.
    pub fn as_variable(&self) -> Option<&Var> {
        match self {
            Expression::Variable(var) => Some(var),
            _ => None,
        }
    }

    /// Splits nested conjunctions into their terms.
    pub fn conjuncts(self) -> Vec<Expression> {
        match self {
            Expression::And(terms) => terms.into_iter().flat_map(Expression::conjuncts).collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(var) => write!(f, "{var}"),
            Expression::Property { var, key } => write!(f, "{var}.{key}"),
            Expression::Literal(lit) => write!(f, "{lit}"),
            Expression::Parameter(name) => write!(f, "${name}"),
            Expression::HasLabels { var, labels } => {
                write!(f, "{var}")?;
                for label in labels {
                    write!(f, ":{label}")?;
                }
                Ok(())
            }
            Expression::Comparison { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Expression::And(terms) => write_joined(f, terms, " AND "),
            Expression::Or(terms) => write_joined(f, terms, " OR "),
            Expression::Not(inner) => write!(f, "NOT {inner}"),
            Expression::IsNotNull(inner) => write!(f, "{inner} IS NOT NULL"),
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                write_joined(f, args, ", ")?;
                f.write_str(")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expression], sep: &str) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({item})")?;
    }
    Ok(())
}

/// WHERE-clause predicate with its precomputed variable dependencies.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Predicate {
    /// Variables the predicate reads.
    pub dependencies: BTreeSet<Var>,
    /// The predicate expression.
    pub expr: Expression,
}

impl Predicate {
    /// Wraps an expression, computing its dependencies.
    pub fn new(expr: Expression) -> Self {
        Self {
            dependencies: expr.dependencies(),
            expr,
        }
    }

    /// True when every dependency is contained in `available`.
    pub fn is_solvable_with(&self, available: &BTreeSet<Var>) -> bool {
        self.dependencies.is_subset(available)
    }

    /// Returns `(var, label)` when this is a single-label test.
    pub fn as_label_test(&self) -> Option<(&Var, &str)> {
        match &self.expr {
            Expression::HasLabels { var, labels } if labels.len() == 1 => {
                Some((var, labels[0].as_str()))
            }
            _ => None,
        }
    }

    /// Returns `(var, key, value)` for `var.key = value` where `value` does
    /// not read `var` itself.
    pub fn as_property_equality(&self) -> Option<(&Var, &str, &Expression)> {
        let Expression::Comparison {
            op: CompareOp::Eq,
            lhs,
            rhs,
        } = &self.expr
        else {
            return None;
        };
        let (prop, value) = match (lhs.as_ref(), rhs.as_ref()) {
            (Expression::Property { .. }, value) => (lhs.as_ref(), value),
            (value, Expression::Property { .. }) => (rhs.as_ref(), value),
            _ => return None,
        };
        let Expression::Property { var, key } = prop else {
            return None;
        };
        if value.dependencies().contains(var) {
            return None;
        }
        Some((var, key.as_str(), value))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl From<Expression> for Predicate {
    fn from(expr: Expression) -> Self {
        Predicate::new(expr)
    }
}
