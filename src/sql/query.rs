//! SELECT builder.
//!
//! Clauses are laid out one per line so rendered queries diff cleanly in
//! snapshots and logs:
//!
//! ```text
//! SELECT
//!   "sample_assay".*
//! FROM "sample_assay"
//! INNER JOIN "sample" ON "sample_assay"."sample_id" = "sample"."id"
//! WHERE "sample"."name" LIKE 'S1%'
//! GROUP BY "sample_assay"."id"
//! ORDER BY "sample_assay"."id" ASC
//! ```

use std::fmt;

use super::dialect::Dialect;
use super::expr::Expr;
use super::writer::SqlWriter;

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

/// A table named in FROM or JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }
}

/// A named subquery in a WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Box<Query>,
}

impl Cte {
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.into(),
            query: Box::new(query),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct JoinClause {
    table: TableRef,
    on: Expr,
}

/// A SELECT statement. Joins are always inner; filters are ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a Query does nothing until rendered with to_sql()"]
pub struct Query {
    ctes: Vec<Cte>,
    select: Vec<SelectItem>,
    from: Option<TableRef>,
    joins: Vec<JoinClause>,
    conditions: Vec<Expr>,
    group_by: Vec<Expr>,
    order_by: Vec<OrderByExpr>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cte(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    pub fn select(mut self, items: Vec<impl Into<SelectItem>>) -> Self {
        self.select = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    pub fn inner_join(mut self, table: TableRef, on: Expr) -> Self {
        self.joins.push(JoinClause { table, on });
        self
    }

    /// Add a WHERE conjunct.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Replaces any earlier limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut w = SqlWriter::new(dialect);
        self.write(&mut w);
        w.finish()
    }

    pub fn write(&self, w: &mut SqlWriter) {
        if !self.ctes.is_empty() {
            w.push("WITH ");
            w.separated(&self.ctes, ",\n", |w, cte| {
                w.ident(&cte.name).push(" AS (\n");
                cte.query.write(w);
                w.push("\n)");
            });
            w.push("\n");
        }

        w.push("SELECT");
        for (i, item) in self.select.iter().enumerate() {
            w.push(if i == 0 { "\n  " } else { ",\n  " });
            item.expr.write(w);
            if let Some(alias) = &item.alias {
                w.push(" AS ").ident(alias);
            }
        }

        if let Some(from) = &self.from {
            w.push("\nFROM ").ident(&from.name);
        }

        for join in &self.joins {
            w.push("\nINNER JOIN ").ident(&join.table.name).push(" ON ");
            join.on.write(w);
        }

        if !self.conditions.is_empty() {
            w.push("\nWHERE ");
            w.separated(&self.conditions, " AND ", |w, cond| cond.write(w));
        }

        if !self.group_by.is_empty() {
            w.push("\nGROUP BY ");
            w.separated(&self.group_by, ", ", |w, expr| expr.write(w));
        }

        if !self.order_by.is_empty() {
            w.push("\nORDER BY ");
            w.separated(&self.order_by, ", ", |w, order| {
                order.expr.write(w);
                w.push(match order.dir {
                    SortDir::Asc => " ASC",
                    SortDir::Desc => " DESC",
                });
            });
        }

        if let Some(clause) = w.dialect().pagination(self.limit, self.offset) {
            w.push("\n").push(&clause);
        }
    }
}

impl fmt::Display for Query {
    /// Renders for PostgreSQL.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(Dialect::default()))
    }
}
