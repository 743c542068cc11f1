//! Predicate expressions over qualified columns.

use super::dialect::Dialect;
use super::query::SelectItem;
use super::writer::SqlWriter;

/// A SQL expression as produced by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"table"."column"`
    Column { table: String, column: String },
    /// `"table".*`
    AllColumns { table: String },
    Literal(Literal),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Two or more terms under one connective. Always parenthesized.
    Junction { op: Junction, terms: Vec<Expr> },
    /// LIKE / ILIKE.
    Pattern {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
        negated: bool,
    },
    /// BETWEEN, bounds inclusive.
    Range {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// IN (...)
    Membership {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    /// `COUNT(*)`
    CountAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    And,
    Or,
}

impl Junction {
    fn keyword(self) -> &'static str {
        match self {
            Junction::And => " AND ",
            Junction::Or => " OR ",
        }
    }
}

impl Expr {
    /// Render on its own, mostly useful in tests and logs.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut w = SqlWriter::new(dialect);
        self.write(&mut w);
        w.finish()
    }

    pub fn write(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column { table, column } => {
                w.qualified(table, column);
            }
            Expr::AllColumns { table } => {
                w.ident(table).push(".*");
            }
            Expr::Literal(lit) => write_literal(lit, w),
            Expr::Compare { op, lhs, rhs } => {
                lhs.write(w);
                w.push(" ").push(op.symbol()).push(" ");
                rhs.write(w);
            }
            Expr::Junction { op, terms } => {
                w.push("(");
                w.separated(terms, op.keyword(), |w, term| term.write(w));
                w.push(")");
            }
            Expr::Pattern {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                let lowered = *case_insensitive && !w.dialect().has_ilike();
                write_maybe_lowered(expr, lowered, w);
                if *negated {
                    w.push(" NOT");
                }
                w.push(if *case_insensitive && !lowered {
                    " ILIKE "
                } else {
                    " LIKE "
                });
                write_maybe_lowered(pattern, lowered, w);
            }
            Expr::Range {
                expr,
                low,
                high,
                negated,
            } => {
                expr.write(w);
                w.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                low.write(w);
                w.push(" AND ");
                high.write(w);
            }
            // `x IN ()` is a syntax error; the empty set matches nothing.
            Expr::Membership { values, negated, .. } if values.is_empty() => {
                w.push(if *negated { "TRUE" } else { "FALSE" });
            }
            Expr::Membership {
                expr,
                values,
                negated,
            } => {
                expr.write(w);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                w.separated(values, ", ", |w, value| value.write(w));
                w.push(")");
            }
            Expr::CountAll => {
                w.push("COUNT(*)");
            }
        }
    }
}

fn write_literal(lit: &Literal, w: &mut SqlWriter) {
    match lit {
        Literal::Int(n) => w.int(*n),
        Literal::Float(f) => w.float(*f),
        Literal::Text(s) => w.string(s),
        Literal::Bool(b) => w.boolean(*b),
        Literal::Null => w.push("NULL"),
    };
}

fn write_maybe_lowered(expr: &Expr, lowered: bool, w: &mut SqlWriter) {
    if lowered {
        w.push("LOWER(");
        expr.write(w);
        w.push(")");
    } else {
        expr.write(w);
    }
}

// =============================================================================
// Constructors
// =============================================================================

pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: table.into(),
        column: column.into(),
    }
}

pub fn table_star(table: &str) -> Expr {
    Expr::AllColumns {
        table: table.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::Text(s.into()))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn count_star() -> Expr {
    Expr::CountAll
}

/// Conjunction of `terms`: `None` when empty, the term itself when alone.
pub fn and_all(terms: Vec<Expr>) -> Option<Expr> {
    junction(Junction::And, terms)
}

/// Disjunction of `terms`, collapsing like [`and_all`].
pub fn or_all(terms: Vec<Expr>) -> Option<Expr> {
    junction(Junction::Or, terms)
}

fn junction(op: Junction, mut terms: Vec<Expr>) -> Option<Expr> {
    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(Expr::Junction { op, terms }),
    }
}

// =============================================================================
// Builder methods
// =============================================================================

/// Fluent predicate construction on anything that converts to [`Expr`].
pub trait ExprExt: Into<Expr> {
    fn eq(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Eq, rhs.into())
    }

    fn ne(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Ne, rhs.into())
    }

    fn gt(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Gt, rhs.into())
    }

    fn lt(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Lt, rhs.into())
    }

    fn gte(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Gte, rhs.into())
    }

    fn lte(self, rhs: impl Into<Expr>) -> Expr {
        compare(self.into(), CompareOp::Lte, rhs.into())
    }

    fn like(self, pattern: impl Into<Expr>) -> Expr {
        pattern_match(self.into(), pattern.into(), false, false)
    }

    fn not_like(self, pattern: impl Into<Expr>) -> Expr {
        pattern_match(self.into(), pattern.into(), false, true)
    }

    fn ilike(self, pattern: impl Into<Expr>) -> Expr {
        pattern_match(self.into(), pattern.into(), true, false)
    }

    fn not_ilike(self, pattern: impl Into<Expr>) -> Expr {
        pattern_match(self.into(), pattern.into(), true, true)
    }

    fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        range(self.into(), low.into(), high.into(), false)
    }

    fn not_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        range(self.into(), low.into(), high.into(), true)
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::Membership {
            expr: Box::new(self.into()),
            values,
            negated: false,
        }
    }

    fn not_in_list(self, values: Vec<Expr>) -> Expr {
        Expr::Membership {
            expr: Box::new(self.into()),
            values,
            negated: true,
        }
    }

    /// `expr AS "name"` in a SELECT list.
    fn alias(self, name: &str) -> SelectItem {
        SelectItem {
            expr: self.into(),
            alias: Some(name.into()),
        }
    }
}

impl ExprExt for Expr {}

fn compare(lhs: Expr, op: CompareOp, rhs: Expr) -> Expr {
    Expr::Compare {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn pattern_match(expr: Expr, pattern: Expr, case_insensitive: bool, negated: bool) -> Expr {
    Expr::Pattern {
        expr: Box::new(expr),
        pattern: Box::new(pattern),
        case_insensitive,
        negated,
    }
}

fn range(expr: Expr, low: Expr, high: Expr, negated: bool) -> Expr {
    Expr::Range {
        expr: Box::new(expr),
        low: Box::new(low),
        high: Box::new(high),
        negated,
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        lit_float(f)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}
