//! Dialect-aware output buffer.

use super::dialect::Dialect;

/// Accumulates SQL text for one dialect. Identifiers and strings are quoted
/// on the way in, so callers never splice raw values.
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    out: String,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            out: String::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Keywords, operators and punctuation.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.out.push_str(sql);
        self
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(name);
        self.push(&quoted)
    }

    /// `"table"."column"`
    pub fn qualified(&mut self, table: &str, column: &str) -> &mut Self {
        self.ident(table).push(".").ident(column)
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        let quoted = self.dialect.quote_string(value);
        self.push(&quoted)
    }

    pub fn int(&mut self, value: i64) -> &mut Self {
        self.push(&value.to_string())
    }

    /// Shortest round-trip form. Match values are checked finite before they
    /// get here; anything else degrades to NULL rather than invalid SQL.
    pub fn float(&mut self, value: f64) -> &mut Self {
        if value.is_finite() {
            let mut buffer = ryu::Buffer::new();
            let text = buffer.format(value).to_string();
            self.push(&text)
        } else {
            self.push("NULL")
        }
    }

    pub fn boolean(&mut self, value: bool) -> &mut Self {
        let literal = self.dialect.bool_literal(value);
        self.push(literal)
    }

    /// Write `items` separated by `sep`.
    pub fn separated<T>(
        &mut self,
        items: &[T],
        sep: &str,
        mut each: impl FnMut(&mut Self, &T),
    ) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            each(self, item);
        }
        self
    }

    pub fn finish(self) -> String {
        self.out
    }
}
