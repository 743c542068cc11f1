//! Renderers over [`CompiledQuery`].
//!
//! - [`CompiledQuery::to_debug_string`]: ORM-style code string, stored with saved
//!   queries and compared literally in tests.
//! - [`CompiledQuery::to_query`]: a [`crate::sql::Query`] for any supported dialect.

use crate::sql::{
    and_all, lit_bool, lit_float, lit_int, lit_str, or_all, table_col, table_star, Dialect,
    Expr, ExprExt, OrderByExpr, Query, TableRef,
};

use super::ast::{Comparison, CompiledQuery, Predicate};
use super::spec::{BoolOp, MatchValue, Operator, Scalar};

impl CompiledQuery {
    /// Render the ORM-style code string, e.g.
    /// `db_session.query(SampleAssay).join(Sample,SampleAssay.sample_id==Sample.id).filter(...)`.
    pub fn to_debug_string(&self) -> String {
        let mut out = format!("db_session.query({})", self.base);

        for join in &self.joins {
            if join.inferred {
                out.push_str(&format!(".join({})", join.model));
            } else {
                out.push_str(&format!(".join({},{})", join.model, join.relation));
            }
        }

        for filter in &self.filters {
            out.push_str(".filter(");
            write_debug_predicate(&mut out, filter);
            out.push(')');
        }

        out.push_str(&format!(
            ".group_by({base}.id).order_by({base}.id)",
            base = self.base
        ));
        out
    }

    /// Build the SQL query: base rows, inner joins, one WHERE conjunct per
    /// filter, grouped and ordered by the base id.
    pub fn to_query(&self) -> Query {
        let mut query = Query::new()
            .select(vec![table_star(&self.base_table)])
            .from(TableRef::new(&self.base_table));

        for join in &self.joins {
            let on = table_col(&join.lhs_table, &join.relation.lhs.column)
                .eq(table_col(&join.rhs_table, &join.relation.rhs.column));
            query = query.inner_join(TableRef::new(&join.table), on);
        }

        for filter in &self.filters {
            if let Some(expr) = predicate_expr(filter) {
                query = query.filter(expr);
            }
        }

        let id = table_col(&self.base_table, "id");
        query
            .group_by(vec![id.clone()])
            .order_by(vec![OrderByExpr::asc(id)])
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_query().to_sql(dialect)
    }
}

fn write_debug_predicate(out: &mut String, predicate: &Predicate) {
    match predicate {
        Predicate::Compare(c) => write_debug_comparison(out, c),
        Predicate::Group { op, children } => {
            out.push_str(match op {
                BoolOp::And => "and_(",
                BoolOp::Or => "or_(",
            });
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_debug_predicate(out, child);
            }
            out.push(')');
        }
    }
}

fn write_debug_comparison(out: &mut String, c: &Comparison) {
    let column = format!("{}.{}", c.model, c.property);

    if c.operator.is_comparison() {
        let symbol = match c.operator {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            _ => "<=",
        };
        out.push_str(&column);
        out.push_str(symbol);
        out.push_str(&debug_value(&c.value, false));
        return;
    }

    let method = match c.operator {
        Operator::Between | Operator::NotBetween => "between",
        Operator::Like | Operator::NotLike => "like",
        Operator::Ilike | Operator::NotIlike => "ilike",
        _ => "in_",
    };
    let call = format!(
        "{}.{}({})",
        column,
        method,
        debug_value(&c.value, c.operator.is_membership())
    );
    if c.operator.is_negated() {
        out.push_str(&format!("not_({})", call));
    } else {
        out.push_str(&call);
    }
}

/// Lists render as `[a,b]` for membership and as positional arguments otherwise.
fn debug_value(value: &MatchValue, as_array: bool) -> String {
    match value {
        MatchValue::Scalar(s) => debug_scalar(s),
        MatchValue::List(items) => {
            let joined = items.iter().map(debug_scalar).collect::<Vec<_>>().join(",");
            if as_array {
                format!("[{}]", joined)
            } else {
                joined
            }
        }
    }
}

fn debug_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(f) => ryu::Buffer::new().format(*f).to_string(),
        Scalar::Bool(true) => "True".into(),
        Scalar::Bool(false) => "False".into(),
    }
}

fn predicate_expr(predicate: &Predicate) -> Option<Expr> {
    match predicate {
        Predicate::Compare(c) => Some(comparison_expr(c)),
        Predicate::Group { op, children } => {
            let exprs = children.iter().filter_map(predicate_expr).collect();
            match op {
                BoolOp::And => and_all(exprs),
                BoolOp::Or => or_all(exprs),
            }
        }
    }
}

fn scalar_expr(scalar: &Scalar) -> Expr {
    match scalar {
        Scalar::Text(s) => lit_str(s),
        Scalar::Int(n) => lit_int(*n),
        Scalar::Float(f) => lit_float(*f),
        Scalar::Bool(b) => lit_bool(*b),
    }
}

fn list_exprs(value: &MatchValue) -> Vec<Expr> {
    match value {
        MatchValue::Scalar(s) => vec![scalar_expr(s)],
        MatchValue::List(items) => items.iter().map(scalar_expr).collect(),
    }
}

fn comparison_expr(c: &Comparison) -> Expr {
    let column = table_col(&c.table, &c.property);
    let mut values = list_exprs(&c.value).into_iter();
    // Value shapes are validated before compilation; the fallbacks are unreachable.
    let first = values.next().unwrap_or_else(crate::sql::lit_null);

    match c.operator {
        Operator::Eq => column.eq(first),
        Operator::NotEq => column.ne(first),
        Operator::Gt => column.gt(first),
        Operator::Lt => column.lt(first),
        Operator::Gte => column.gte(first),
        Operator::Lte => column.lte(first),
        Operator::Like => column.like(first),
        Operator::NotLike => column.not_like(first),
        Operator::Ilike => column.ilike(first),
        Operator::NotIlike => column.not_ilike(first),
        Operator::Between => {
            let second = values.next().unwrap_or_else(crate::sql::lit_null);
            column.between(first, second)
        }
        Operator::NotBetween => {
            let second = values.next().unwrap_or_else(crate::sql::lit_null);
            column.not_between(first, second)
        }
        Operator::In => column.in_list(list_exprs(&c.value)),
        Operator::NotIn => column.not_in_list(list_exprs(&c.value)),
    }
}
