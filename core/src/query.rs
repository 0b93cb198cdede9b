//! Dialect-aware SQL statement builder.
//!
//! [`QueryBuilder`] accumulates the parts of a SELECT, INSERT, UPDATE or
//! DELETE and renders them into a [`Statement`]: SQL text plus positional
//! arguments. Predicates are written with generic `?` tokens; rendering
//! rewrites them into the dialect's placeholders, numbered across SET
//! values, WHERE arguments and HAVING arguments in that order.
//!
//! Rendering is deterministic: the same builder state and dialect always
//! produce byte-identical SQL and argument order.
//!
//! # Example
//!
//! ```
//! use tabula_core::{Postgres, QueryBuilder, Value};
//!
//! let stmt = QueryBuilder::new(&Postgres, "users")
//!     .update()
//!     .set("username", "jdoe")
//!     .filter("\"id\" = ?", [Value::Int(7)])
//!     .build();
//!
//! assert_eq!(stmt.sql, "UPDATE \"users\" SET \"username\" = $1 WHERE \"id\" = $2");
//! assert_eq!(stmt.args, vec![Value::from("jdoe"), Value::Int(7)]);
//! ```

use std::fmt;

use crate::dialect::Dialect;
use crate::types::Value;

/// Rendered SQL with its ordered arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinKind,
    table: String,
    condition: String,
}

/// Builder for a single statement against one table.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'d> {
    dialect: &'d dyn Dialect,
    table: String,
    operation: Operation,
    columns: Vec<String>,
    raw_columns: bool,
    joins: Vec<Join>,
    wheres: Vec<String>,
    where_args: Vec<Value>,
    group_by: Vec<String>,
    having: Vec<String>,
    having_args: Vec<Value>,
    order_by: Vec<(String, Order)>,
    limit: u64,
    offset: u64,
    values: Vec<(String, Value)>,
    returning: Vec<String>,
}

impl<'d> QueryBuilder<'d> {
    /// Starts a SELECT of all columns from `table`.
    pub fn new(dialect: &'d dyn Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            operation: Operation::Select,
            columns: Vec::new(),
            raw_columns: false,
            joins: Vec::new(),
            wheres: Vec::new(),
            where_args: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            having_args: Vec::new(),
            order_by: Vec::new(),
            limit: 0,
            offset: 0,
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Selects the given columns. `table.column` references and `*` are
    /// supported; an empty list selects `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation = Operation::Select;
        self.columns = columns.into_iter().map(Into::into).collect();
        self.raw_columns = false;
        self
    }

    /// Selects SQL expressions verbatim, such as `COUNT(*)`.
    pub fn select_raw<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self = self.select(expressions);
        self.raw_columns = true;
        self
    }

    pub fn insert(mut self) -> Self {
        self.operation = Operation::Insert;
        self
    }

    pub fn update(mut self) -> Self {
        self.operation = Operation::Update;
        self
    }

    pub fn delete(mut self) -> Self {
        self.operation = Operation::Delete;
        self
    }

    /// Adds a WHERE predicate; multiple predicates are joined with AND.
    pub fn filter<I>(mut self, predicate: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.wheres.push(predicate.into());
        self.where_args.extend(args);
        self
    }

    /// Adds `column = ?` to the WHERE clause.
    pub fn filter_eq(self, column: &str, value: impl Into<Value>) -> Self {
        let predicate = format!("{} = ?", self.quote_column(column));
        self.filter(predicate, [value.into()])
    }

    pub fn join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Inner, table.into(), condition.into())
    }

    pub fn left_join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Left, table.into(), condition.into())
    }

    pub fn right_join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Right, table.into(), condition.into())
    }

    fn push_join(mut self, kind: JoinKind, table: String, condition: String) -> Self {
        self.joins.push(Join {
            kind,
            table,
            condition,
        });
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds a HAVING predicate; multiple predicates are joined with AND.
    pub fn having<I>(mut self, predicate: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.having.push(predicate.into());
        self.having_args.extend(args);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    /// Sets LIMIT; zero means no limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets OFFSET; zero means no offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets a column value for INSERT or UPDATE. Setting a column twice
    /// replaces the value and keeps its original position.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
        self
    }

    /// Requests a RETURNING clause; ignored by dialects without support.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Renders the statement.
    pub fn build(&self) -> Statement {
        let mut sql = String::new();
        let mut args = Vec::new();
        let mut position = 0usize;
        let table = self.dialect.quote(&self.table);

        match self.operation {
            Operation::Select => {
                sql.push_str("SELECT ");
                if self.columns.is_empty() {
                    sql.push('*');
                } else if self.raw_columns {
                    sql.push_str(&self.columns.join(", "));
                } else {
                    sql.push_str(&self.quote_columns(&self.columns));
                }
                sql.push_str(" FROM ");
                sql.push_str(&table);

                for join in &self.joins {
                    sql.push(' ');
                    sql.push_str(join.kind.as_sql());
                    sql.push(' ');
                    sql.push_str(&self.dialect.quote(&join.table));
                    sql.push_str(" ON ");
                    sql.push_str(&join.condition);
                }

                self.render_where(&mut sql, &mut args, &mut position);

                if !self.group_by.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&self.quote_columns(&self.group_by));
                }

                if !self.having.is_empty() {
                    sql.push_str(" HAVING ");
                    let rendered: Vec<String> = self
                        .having
                        .iter()
                        .map(|p| self.rewrite_placeholders(p, &mut position))
                        .collect();
                    sql.push_str(&rendered.join(" AND "));
                    args.extend(self.having_args.iter().cloned());
                }

                if !self.order_by.is_empty() {
                    let terms: Vec<String> = self
                        .order_by
                        .iter()
                        .map(|(c, o)| format!("{} {}", self.quote_column(c), o.as_sql()))
                        .collect();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&terms.join(", "));
                }

                if self.limit > 0 {
                    sql.push_str(&format!(" LIMIT {}", self.limit));
                }
                if self.offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", self.offset));
                }
            }
            Operation::Insert => {
                sql.push_str("INSERT INTO ");
                sql.push_str(&table);

                if self.values.is_empty() {
                    sql.push(' ');
                    sql.push_str(self.dialect.default_values_clause());
                } else {
                    let mut columns = Vec::with_capacity(self.values.len());
                    let mut placeholders = Vec::with_capacity(self.values.len());
                    for (column, value) in &self.values {
                        position += 1;
                        columns.push(self.dialect.quote(column));
                        placeholders.push(self.dialect.placeholder(position));
                        args.push(value.clone());
                    }
                    sql.push_str(&format!(
                        " ({}) VALUES ({})",
                        columns.join(", "),
                        placeholders.join(", ")
                    ));
                }

                self.render_returning(&mut sql);
            }
            Operation::Update => {
                sql.push_str("UPDATE ");
                sql.push_str(&table);
                sql.push_str(" SET ");

                let mut sets = Vec::with_capacity(self.values.len());
                for (column, value) in &self.values {
                    position += 1;
                    sets.push(format!(
                        "{} = {}",
                        self.dialect.quote(column),
                        self.dialect.placeholder(position)
                    ));
                    args.push(value.clone());
                }
                sql.push_str(&sets.join(", "));

                self.render_where(&mut sql, &mut args, &mut position);
                self.render_returning(&mut sql);
            }
            Operation::Delete => {
                sql.push_str("DELETE FROM ");
                sql.push_str(&table);
                self.render_where(&mut sql, &mut args, &mut position);
                self.render_returning(&mut sql);
            }
        }

        Statement { sql, args }
    }

    fn render_where(&self, sql: &mut String, args: &mut Vec<Value>, position: &mut usize) {
        if self.wheres.is_empty() {
            return;
        }
        let rendered: Vec<String> = self
            .wheres
            .iter()
            .map(|p| self.rewrite_placeholders(p, position))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&rendered.join(" AND "));
        args.extend(self.where_args.iter().cloned());
    }

    fn render_returning(&self, sql: &mut String) {
        if self.returning.is_empty() || !self.dialect.supports_returning() {
            return;
        }
        sql.push_str(" RETURNING ");
        sql.push_str(&self.quote_columns(&self.returning));
    }

    /// Replaces each `?` outside single-quoted literals with the next
    /// dialect placeholder.
    fn rewrite_placeholders(&self, fragment: &str, position: &mut usize) -> String {
        let mut out = String::with_capacity(fragment.len() + 8);
        let mut in_literal = false;
        for c in fragment.chars() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                '?' if !in_literal => {
                    *position += 1;
                    out.push_str(&self.dialect.placeholder(*position));
                }
                _ => out.push(c),
            }
        }
        out
    }

    /// Quotes `column` or `table.column`, leaving `*` bare.
    pub fn quote_column(&self, column: &str) -> String {
        column
            .split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.dialect.quote(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_columns(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_column(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySql, Postgres, Sqlite};

    #[test]
    fn test_select_star_by_key() {
        let stmt = QueryBuilder::new(&Postgres, "users").filter_eq("id", 1i64).build();
        assert_eq!(stmt.sql, "SELECT * FROM \"users\" WHERE \"id\" = $1");
        assert_eq!(stmt.args, vec![Value::Int(1)]);
    }

    #[test]
    fn test_insert_postgres() {
        let stmt = QueryBuilder::new(&Postgres, "users")
            .insert()
            .set("username", "jdoe")
            .build();
        assert_eq!(stmt.sql, "INSERT INTO \"users\" (\"username\") VALUES ($1)");
    }

    #[test]
    fn test_insert_returning_only_where_supported() {
        let pg = QueryBuilder::new(&Postgres, "users")
            .insert()
            .set("username", "jdoe")
            .returning(["id"])
            .build();
        assert_eq!(
            pg.sql,
            "INSERT INTO \"users\" (\"username\") VALUES ($1) RETURNING \"id\""
        );

        let my = QueryBuilder::new(&MySql, "users")
            .insert()
            .set("username", "jdoe")
            .returning(["id"])
            .build();
        assert_eq!(my.sql, "INSERT INTO `users` (`username`) VALUES (?)");
    }

    #[test]
    fn test_insert_without_values() {
        let stmt = QueryBuilder::new(&Sqlite, "counters").insert().build();
        assert_eq!(stmt.sql, "INSERT INTO \"counters\" DEFAULT VALUES");
        let stmt = QueryBuilder::new(&MySql, "counters").insert().build();
        assert_eq!(stmt.sql, "INSERT INTO `counters` () VALUES ()");
    }

    #[test]
    fn test_update_numbers_where_after_set() {
        let stmt = QueryBuilder::new(&Postgres, "users")
            .update()
            .set("username", "a")
            .set("email", "b")
            .filter("\"id\" = ? AND \"active\" = ?", [Value::Int(3), Value::Bool(true)])
            .build();
        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"username\" = $1, \"email\" = $2 WHERE \"id\" = $3 AND \"active\" = $4"
        );
        assert_eq!(
            stmt.args,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::Int(3),
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn test_set_replaces_in_place() {
        let stmt = QueryBuilder::new(&Sqlite, "t")
            .insert()
            .set("a", 1i64)
            .set("b", 2i64)
            .set("a", 3i64)
            .build();
        assert_eq!(stmt.sql, "INSERT INTO \"t\" (\"a\", \"b\") VALUES (?, ?)");
        assert_eq!(stmt.args, vec![Value::Int(3), Value::Int(2)]);
    }

    #[test]
    fn test_full_select() {
        let stmt = QueryBuilder::new(&Postgres, "orders")
            .select(["orders.customer_id", "COUNT"])
            .left_join("customers", "\"customers\".\"id\" = \"orders\".\"customer_id\"")
            .filter("\"orders\".\"status\" = ?", [Value::from("paid")])
            .group_by(["orders.customer_id"])
            .having("SUM(\"orders\".\"total\") > ?", [Value::Int(100)])
            .order_by("orders.customer_id", Order::Desc)
            .limit(10)
            .offset(20)
            .build();
        assert_eq!(
            stmt.sql,
            "SELECT \"orders\".\"customer_id\", \"COUNT\" FROM \"orders\" \
             LEFT JOIN \"customers\" ON \"customers\".\"id\" = \"orders\".\"customer_id\" \
             WHERE \"orders\".\"status\" = $1 GROUP BY \"orders\".\"customer_id\" \
             HAVING SUM(\"orders\".\"total\") > $2 ORDER BY \"orders\".\"customer_id\" DESC \
             LIMIT 10 OFFSET 20"
        );
        assert_eq!(stmt.args, vec![Value::from("paid"), Value::Int(100)]);
    }

    #[test]
    fn test_joins_and_star() {
        let stmt = QueryBuilder::new(&Sqlite, "tags")
            .select(["tags.*"])
            .join("post_tags", "\"tags\".\"id\" = \"post_tags\".\"tag_id\"")
            .right_join("x", "1 = 1")
            .build();
        assert_eq!(
            stmt.sql,
            "SELECT \"tags\".* FROM \"tags\" JOIN \"post_tags\" ON \"tags\".\"id\" = \"post_tags\".\"tag_id\" RIGHT JOIN \"x\" ON 1 = 1"
        );
    }

    #[test]
    fn test_select_raw_expressions() {
        let stmt = QueryBuilder::new(&Sqlite, "posts")
            .select_raw(["COUNT(*)"])
            .filter_eq("user_id", 1i64)
            .build();
        assert_eq!(stmt.sql, "SELECT COUNT(*) FROM \"posts\" WHERE \"user_id\" = ?");
    }

    #[test]
    fn test_zero_limit_and_offset_omitted() {
        let stmt = QueryBuilder::new(&Sqlite, "t").limit(0).offset(0).build();
        assert_eq!(stmt.sql, "SELECT * FROM \"t\"");
    }

    #[test]
    fn test_question_mark_in_literal_untouched() {
        let stmt = QueryBuilder::new(&Postgres, "t")
            .filter("\"note\" <> '?' AND \"id\" = ?", [Value::Int(1)])
            .build();
        assert_eq!(stmt.sql, "SELECT * FROM \"t\" WHERE \"note\" <> '?' AND \"id\" = $1");
    }

    #[test]
    fn test_delete() {
        let stmt = QueryBuilder::new(&MySql, "users")
            .delete()
            .filter_eq("id", 9i64)
            .returning(["id"])
            .build();
        assert_eq!(stmt.sql, "DELETE FROM `users` WHERE `id` = ?");
        assert_eq!(stmt.args, vec![Value::Int(9)]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = QueryBuilder::new(&Postgres, "users")
            .update()
            .set("b", 2i64)
            .set("a", 1i64)
            .set("c", 3i64)
            .filter_eq("id", 5i64);
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first, second);
        assert_eq!(
            first.sql,
            "UPDATE \"users\" SET \"b\" = $1, \"a\" = $2, \"c\" = $3 WHERE \"id\" = $4"
        );
    }
}
