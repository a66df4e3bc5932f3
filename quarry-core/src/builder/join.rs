//! JOIN clauses

use super::bindings::BindingKind;
use super::clause::Join;
use super::common::{Boolean, Identifier, IntoIdentifier, JoinType};
use super::Builder;
use crate::{raw, IntoOperator};
use std::ops::{Deref, DerefMut};

/// The ON conditions of one join.
///
/// Dereferences to a [`Builder`], so every `where_*` method is available
/// alongside `on`/`or_on`; a join clause may itself carry nested joins.
#[derive(Debug, Clone)]
pub struct JoinClause {
    kind: JoinType,
    table: Identifier,
    query: Builder,
}

impl JoinClause {
    fn new(parent: &Builder, kind: JoinType, table: Identifier) -> Self {
        let mut query = parent.new_query();
        query.is_join = true;
        Self { kind, table, query }
    }

    /// `first <op> second`, comparing two columns
    pub fn on<O: IntoOperator>(&mut self, first: &str, operator: O, second: &str) -> &mut Self {
        self.query
            .add_where_column(first, operator.into_operator(), second, Boolean::And);
        self
    }

    pub fn or_on<O: IntoOperator>(&mut self, first: &str, operator: O, second: &str) -> &mut Self {
        self.query
            .add_where_column(first, operator.into_operator(), second, Boolean::Or);
        self
    }

    fn into_join(self) -> Join {
        Join {
            kind: self.kind,
            table: self.table,
            clause: Box::new(self.query),
        }
    }
}

impl Deref for JoinClause {
    type Target = Builder;

    fn deref(&self) -> &Builder {
        &self.query
    }
}

impl DerefMut for JoinClause {
    fn deref_mut(&mut self) -> &mut Builder {
        &mut self.query
    }
}

impl Builder {
    /// Inner join on `first <op> second`
    pub fn join<T, O>(&mut self, table: T, first: &str, operator: O, second: &str) -> &mut Self
    where
        T: IntoIdentifier,
        O: IntoOperator,
    {
        self.join_on(JoinType::Inner, table.into_identifier(), first, operator, second)
    }

    pub fn left_join<T, O>(&mut self, table: T, first: &str, operator: O, second: &str) -> &mut Self
    where
        T: IntoIdentifier,
        O: IntoOperator,
    {
        self.join_on(JoinType::Left, table.into_identifier(), first, operator, second)
    }

    pub fn right_join<T, O>(&mut self, table: T, first: &str, operator: O, second: &str) -> &mut Self
    where
        T: IntoIdentifier,
        O: IntoOperator,
    {
        self.join_on(JoinType::Right, table.into_identifier(), first, operator, second)
    }

    pub fn cross_join<T: IntoIdentifier>(&mut self, table: T) -> &mut Self {
        let clause = JoinClause::new(self, JoinType::Cross, table.into_identifier());
        self.push_join(clause)
    }

    /// Join with conditions built by the callback
    pub fn join_with<T, F>(&mut self, kind: JoinType, table: T, callback: F) -> &mut Self
    where
        T: IntoIdentifier,
        F: FnOnce(&mut JoinClause),
    {
        let mut clause = JoinClause::new(self, kind, table.into_identifier());
        callback(&mut clause);
        self.push_join(clause)
    }

    /// Join a derived table built by `query`
    pub fn join_sub<Q, O>(&mut self, query: Q, alias: &str, first: &str, operator: O, second: &str) -> &mut Self
    where
        Q: FnOnce(&mut Builder),
        O: IntoOperator,
    {
        self.add_join_sub(JoinType::Inner, query, alias, first, operator, second)
    }

    pub fn left_join_sub<Q, O>(&mut self, query: Q, alias: &str, first: &str, operator: O, second: &str) -> &mut Self
    where
        Q: FnOnce(&mut Builder),
        O: IntoOperator,
    {
        self.add_join_sub(JoinType::Left, query, alias, first, operator, second)
    }

    fn add_join_sub<Q, O>(
        &mut self,
        kind: JoinType,
        query: Q,
        alias: &str,
        first: &str,
        operator: O,
        second: &str,
    ) -> &mut Self
    where
        Q: FnOnce(&mut Builder),
        O: IntoOperator,
    {
        let query = self.sub(query);
        self.absorb_error(&query);
        let Some((sql, bindings)) = self.compile_sub(&query) else {
            return self;
        };
        let table = match self.grammar.wrap_table(alias) {
            Ok(table) => table,
            Err(error) => {
                self.fail(error.to_string());
                return self;
            }
        };
        self.bindings.extend(BindingKind::Join, bindings);
        let table = Identifier::Raw(raw(format!("({}) as {}", sql, table)));
        self.join_on(kind, table, first, operator, second)
    }

    fn join_on<O: IntoOperator>(
        &mut self,
        kind: JoinType,
        table: Identifier,
        first: &str,
        operator: O,
        second: &str,
    ) -> &mut Self {
        let mut clause = JoinClause::new(self, kind, table);
        clause.on(first, operator, second);
        self.push_join(clause)
    }

    fn push_join(&mut self, clause: JoinClause) -> &mut Self {
        self.absorb_error(&clause.query);
        self.bindings.extend(BindingKind::Join, clause.query.get_bindings());
        self.joins.push(clause.into_join());
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{Builder, JoinType};
    use crate::grammar::{Dialect, Grammar};
    use crate::Value;

    fn builder(dialect: Dialect) -> Builder {
        let mut query = Builder::new(Grammar::new(dialect));
        query.from("users");
        query
    }

    #[test]
    fn test_basic_joins() {
        let mut query = builder(Dialect::Generic);
        query
            .join("contacts", "users.id", "=", "contacts.user_id")
            .left_join("photos", "users.id", "=", "photos.user_id");
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" inner join \"contacts\" on \"users\".\"id\" = \"contacts\".\"user_id\" left join \"photos\" on \"users\".\"id\" = \"photos\".\"user_id\""
        );
    }

    #[test]
    fn test_cross_join() {
        let mut query = builder(Dialect::MySql);
        query.cross_join("sizes");
        assert_eq!(query.to_sql().unwrap(), "select * from `users` cross join `sizes`");
    }

    #[test]
    fn test_join_bindings_precede_wheres() {
        let mut query = builder(Dialect::Generic);
        query.where_(("users.active", true)).join_with(JoinType::Left, "contacts", |join| {
            join.on("users.id", "=", "contacts.user_id").where_(("contacts.kind", "email"));
        });
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" left join \"contacts\" on \"users\".\"id\" = \"contacts\".\"user_id\" and \"contacts\".\"kind\" = ? where \"users\".\"active\" = ?"
        );
        assert_eq!(query.get_bindings(), vec![Value::from("email"), Value::Bool(true)]);
    }

    #[test]
    fn test_nested_join_conditions() {
        let mut query = builder(Dialect::Generic);
        query.join_with(JoinType::Inner, "contacts", |join| {
            join.on("users.id", "=", "contacts.user_id").where_nested(|q| {
                q.where_(("contacts.country", "NL")).or_where(("contacts.country", "BE"));
            });
        });
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" inner join \"contacts\" on \"users\".\"id\" = \"contacts\".\"user_id\" and (\"contacts\".\"country\" = ? or \"contacts\".\"country\" = ?)"
        );
    }

    #[test]
    fn test_joins_within_a_join() {
        let mut query = builder(Dialect::Generic);
        query.join_with(JoinType::Left, "contacts", |join| {
            join.on("users.id", "=", "contacts.user_id")
                .join("contact_types", "contacts.type_id", "=", "contact_types.id");
        });
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" left join (\"contacts\" inner join \"contact_types\" on \"contacts\".\"type_id\" = \"contact_types\".\"id\") on \"users\".\"id\" = \"contacts\".\"user_id\""
        );
    }

    #[test]
    fn test_join_sub() {
        let mut query = builder(Dialect::Postgres);
        query.join_sub(
            |q| {
                q.select("user_id").from("posts").where_(("published", true));
            },
            "latest",
            "users.id",
            "=",
            "latest.user_id",
        );
        query.where_(("users.id", ">", 3));
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" inner join (select \"user_id\" from \"posts\" where \"published\" = ?) as \"latest\" on \"users\".\"id\" = \"latest\".\"user_id\" where \"users\".\"id\" > ?"
        );
        assert_eq!(query.get_bindings(), vec![Value::Bool(true), Value::I32(3)]);
    }

    #[test]
    fn test_table_prefix_in_joins() {
        let mut query = Builder::new(Grammar::new(Dialect::Generic).with_table_prefix("app_"));
        query
            .from("users as u")
            .join("posts as p", "u.id", "=", "p.user_id");
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"app_users\" as \"app_u\" inner join \"app_posts\" as \"app_p\" on \"app_u\".\"id\" = \"app_p\".\"user_id\""
        );
    }
}
