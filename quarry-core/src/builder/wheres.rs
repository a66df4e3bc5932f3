//! WHERE clause methods

use super::bindings::BindingKind;
use super::clause::{DatePart, Where};
use super::common::{Boolean, IntoCondition, IntoOperand, IntoRecord, Operand};
use super::Builder;
use crate::grammar::is_json_selector;
use crate::{IntoOperator, Operator, Result, Value};

impl Builder {
    /// Add a comparison: `where_(("age", 18))` or `where_(("age", ">", 18))`
    pub fn where_<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        self.add_where(column, operator, value, Boolean::And)
    }

    pub fn or_where<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        self.add_where(column, operator, value, Boolean::Or)
    }

    pub(crate) fn add_where(
        &mut self,
        column: String,
        operator: Result<Operator>,
        value: Operand,
        boolean: Boolean,
    ) -> &mut Self {
        let Some(operator) = self.accept(operator) else {
            return self;
        };

        if value.is_null() {
            if operator.is_equality() {
                return self.add_where_null(column, false, boolean);
            }
            if operator.is_inequality() {
                return self.add_where_null(column, true, boolean);
            }
            self.fail("Illegal operator and value combination.");
            return self;
        }

        if let Operand::Value(Value::Bool(flag)) = value {
            if is_json_selector(&column) {
                self.wheres.push(Where::JsonBoolean {
                    column,
                    operator,
                    value: flag,
                    boolean,
                });
                return self;
            }
        }

        self.add_operand_binding(BindingKind::Where, &value);
        self.wheres.push(Where::Basic {
            column,
            operator,
            value,
            boolean,
        });
        self
    }

    /// Group conditions in parentheses
    pub fn where_nested<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_nested_where(callback, Boolean::And)
    }

    pub fn or_where_nested<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_nested_where(callback, Boolean::Or)
    }

    fn add_nested_where<F>(&mut self, callback: F, boolean: Boolean) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let mut nested = self.new_query();
        nested.from = self.from.clone();
        callback(&mut nested);
        self.push_nested(nested, boolean)
    }

    fn push_nested(&mut self, nested: Builder, boolean: Boolean) -> &mut Self {
        self.absorb_error(&nested);
        if nested.wheres.is_empty() {
            return self;
        }
        self.bindings
            .extend(BindingKind::Where, nested.raw_bindings(BindingKind::Where).iter().cloned());
        self.wheres.push(Where::Nested {
            query: Box::new(nested),
            boolean,
        });
        self
    }

    /// A parenthesized group of `column = value` checks, one per pair
    pub fn where_record<R: IntoRecord>(&mut self, record: R) -> &mut Self {
        self.add_where_record(record, Boolean::And)
    }

    pub fn or_where_record<R: IntoRecord>(&mut self, record: R) -> &mut Self {
        self.add_where_record(record, Boolean::Or)
    }

    fn add_where_record<R: IntoRecord>(&mut self, record: R, boolean: Boolean) -> &mut Self {
        let mut nested = self.new_query();
        for (column, value) in record.into_record() {
            nested.add_where(column, Ok(Operator::EQ), value, Boolean::And);
        }
        self.push_nested(nested, boolean)
    }

    /// Compare two columns
    pub fn where_column<O: IntoOperator>(&mut self, first: &str, operator: O, second: &str) -> &mut Self {
        self.add_where_column(first, operator.into_operator(), second, Boolean::And)
    }

    pub fn or_where_column<O: IntoOperator>(&mut self, first: &str, operator: O, second: &str) -> &mut Self {
        self.add_where_column(first, operator.into_operator(), second, Boolean::Or)
    }

    pub(crate) fn add_where_column(
        &mut self,
        first: &str,
        operator: Result<Operator>,
        second: &str,
        boolean: Boolean,
    ) -> &mut Self {
        if let Some(operator) = self.accept(operator) {
            self.wheres.push(Where::Column {
                first: first.to_string(),
                operator,
                second: second.to_string(),
                boolean,
            });
        }
        self
    }

    /// A raw condition; the bindings are taken as given
    pub fn where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.add_where_raw(sql, bindings, Boolean::And)
    }

    pub fn or_where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.add_where_raw(sql, bindings, Boolean::Or)
    }

    fn add_where_raw(&mut self, sql: &str, bindings: Vec<Value>, boolean: Boolean) -> &mut Self {
        self.bindings.extend(BindingKind::Where, bindings);
        self.wheres.push(Where::Raw {
            sql: sql.to_string(),
            boolean,
        });
        self
    }

    pub fn where_in<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_in(column, values, false, Boolean::And)
    }

    pub fn or_where_in<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_in(column, values, false, Boolean::Or)
    }

    pub fn where_not_in<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_in(column, values, true, Boolean::And)
    }

    pub fn or_where_not_in<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_in(column, values, true, Boolean::Or)
    }

    fn add_where_in<I, T>(&mut self, column: &str, values: I, not: bool, boolean: Boolean) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        let values: Vec<Operand> = values.into_iter().map(IntoOperand::into_operand).collect();
        for value in &values {
            self.add_operand_binding(BindingKind::Where, value);
        }
        self.wheres.push(Where::In {
            column: column.to_string(),
            values,
            not,
            boolean,
        });
        self
    }

    /// `column in (select ...)` with the sub-query built by the callback
    pub fn where_in_sub<F>(&mut self, column: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_in_sub(column, query, false, Boolean::And)
    }

    pub fn or_where_in_sub<F>(&mut self, column: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_in_sub(column, query, false, Boolean::Or)
    }

    pub fn where_not_in_sub<F>(&mut self, column: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_in_sub(column, query, true, Boolean::And)
    }

    pub fn or_where_not_in_sub<F>(&mut self, column: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_in_sub(column, query, true, Boolean::Or)
    }

    fn add_where_in_sub(&mut self, column: &str, query: Builder, not: bool, boolean: Boolean) -> &mut Self {
        self.absorb_error(&query);
        self.bindings.extend(BindingKind::Where, query.get_bindings());
        self.wheres.push(Where::InSub {
            column: column.to_string(),
            query: Box::new(query),
            not,
            boolean,
        });
        self
    }

    /// Inline integers into the SQL; values without a leading integer are dropped
    pub fn where_integer_in_raw<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.add_where_integer_in_raw(column, values, false, Boolean::And)
    }

    pub fn or_where_integer_in_raw<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.add_where_integer_in_raw(column, values, false, Boolean::Or)
    }

    pub fn where_integer_not_in_raw<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.add_where_integer_in_raw(column, values, true, Boolean::And)
    }

    pub fn or_where_integer_not_in_raw<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.add_where_integer_in_raw(column, values, true, Boolean::Or)
    }

    fn add_where_integer_in_raw<I, T>(&mut self, column: &str, values: I, not: bool, boolean: Boolean) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values = values
            .into_iter()
            .filter_map(|value| value.into().leading_integer())
            .collect();
        self.wheres.push(Where::InRaw {
            column: column.to_string(),
            values,
            not,
            boolean,
        });
        self
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.add_where_null(column.to_string(), false, Boolean::And)
    }

    pub fn or_where_null(&mut self, column: &str) -> &mut Self {
        self.add_where_null(column.to_string(), false, Boolean::Or)
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.add_where_null(column.to_string(), true, Boolean::And)
    }

    pub fn or_where_not_null(&mut self, column: &str) -> &mut Self {
        self.add_where_null(column.to_string(), true, Boolean::Or)
    }

    fn add_where_null(&mut self, column: String, not: bool, boolean: Boolean) -> &mut Self {
        self.wheres.push(Where::Null { column, not, boolean });
        self
    }

    pub fn where_between<A: IntoOperand, B: IntoOperand>(&mut self, column: &str, min: A, max: B) -> &mut Self {
        self.add_where_between(column, min.into_operand(), max.into_operand(), false, Boolean::And)
    }

    pub fn or_where_between<A: IntoOperand, B: IntoOperand>(&mut self, column: &str, min: A, max: B) -> &mut Self {
        self.add_where_between(column, min.into_operand(), max.into_operand(), false, Boolean::Or)
    }

    pub fn where_not_between<A: IntoOperand, B: IntoOperand>(&mut self, column: &str, min: A, max: B) -> &mut Self {
        self.add_where_between(column, min.into_operand(), max.into_operand(), true, Boolean::And)
    }

    pub fn or_where_not_between<A, B>(&mut self, column: &str, min: A, max: B) -> &mut Self
    where
        A: IntoOperand,
        B: IntoOperand,
    {
        self.add_where_between(column, min.into_operand(), max.into_operand(), true, Boolean::Or)
    }

    fn add_where_between(&mut self, column: &str, min: Operand, max: Operand, not: bool, boolean: Boolean) -> &mut Self {
        self.add_operand_binding(BindingKind::Where, &min);
        self.add_operand_binding(BindingKind::Where, &max);
        self.wheres.push(Where::Between {
            column: column.to_string(),
            min,
            max,
            not,
            boolean,
        });
        self
    }

    /// `column between min_column and max_column`
    pub fn where_between_columns(&mut self, column: &str, min: &str, max: &str) -> &mut Self {
        self.add_where_between_columns(column, min, max, false, Boolean::And)
    }

    pub fn or_where_between_columns(&mut self, column: &str, min: &str, max: &str) -> &mut Self {
        self.add_where_between_columns(column, min, max, false, Boolean::Or)
    }

    pub fn where_not_between_columns(&mut self, column: &str, min: &str, max: &str) -> &mut Self {
        self.add_where_between_columns(column, min, max, true, Boolean::And)
    }

    fn add_where_between_columns(&mut self, column: &str, min: &str, max: &str, not: bool, boolean: Boolean) -> &mut Self {
        self.wheres.push(Where::BetweenColumns {
            column: column.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            not,
            boolean,
        });
        self
    }

    pub fn where_date<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Date, condition, Boolean::And)
    }

    pub fn or_where_date<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Date, condition, Boolean::Or)
    }

    pub fn where_time<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Time, condition, Boolean::And)
    }

    pub fn or_where_time<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Time, condition, Boolean::Or)
    }

    pub fn where_day<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Day, condition, Boolean::And)
    }

    pub fn or_where_day<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Day, condition, Boolean::Or)
    }

    pub fn where_month<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Month, condition, Boolean::And)
    }

    pub fn or_where_month<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Month, condition, Boolean::Or)
    }

    pub fn where_year<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Year, condition, Boolean::And)
    }

    pub fn or_where_year<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_date_where(DatePart::Year, condition, Boolean::Or)
    }

    fn add_date_where<C: IntoCondition>(&mut self, part: DatePart, condition: C, boolean: Boolean) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        let Some(operator) = self.accept(operator) else {
            return self;
        };
        let value = match value {
            Operand::Value(value) => Operand::Value(date_part_value(part, value)),
            expression => expression,
        };
        self.add_operand_binding(BindingKind::Where, &value);
        self.wheres.push(Where::Date {
            part,
            column,
            operator,
            value,
            boolean,
        });
        self
    }

    /// `column <op> (select ...)`
    pub fn where_sub<O, F>(&mut self, column: &str, operator: O, callback: F) -> &mut Self
    where
        O: IntoOperator,
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_sub(column, operator.into_operator(), query, Boolean::And)
    }

    pub fn or_where_sub<O, F>(&mut self, column: &str, operator: O, callback: F) -> &mut Self
    where
        O: IntoOperator,
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_sub(column, operator.into_operator(), query, Boolean::Or)
    }

    fn add_where_sub(&mut self, column: &str, operator: Result<Operator>, query: Builder, boolean: Boolean) -> &mut Self {
        let Some(operator) = self.accept(operator) else {
            return self;
        };
        self.absorb_error(&query);
        self.bindings.extend(BindingKind::Where, query.get_bindings());
        self.wheres.push(Where::Sub {
            column: column.to_string(),
            operator,
            query: Box::new(query),
            boolean,
        });
        self
    }

    pub fn where_exists<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_exists(query, false, Boolean::And)
    }

    pub fn or_where_exists<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_exists(query, false, Boolean::Or)
    }

    pub fn where_not_exists<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_exists(query, true, Boolean::And)
    }

    pub fn or_where_not_exists<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.add_where_exists(query, true, Boolean::Or)
    }

    /// Add an exists check over an already built query
    pub fn add_where_exists(&mut self, query: Builder, not: bool, boolean: Boolean) -> &mut Self {
        self.absorb_error(&query);
        self.bindings.extend(BindingKind::Where, query.get_bindings());
        self.wheres.push(Where::Exists {
            query: Box::new(query),
            not,
            boolean,
        });
        self
    }

    /// `(a, b) = (?, ?)`; the column and value counts must match
    pub fn where_row_values<O, I, T>(&mut self, columns: &[&str], operator: O, values: I) -> &mut Self
    where
        O: IntoOperator,
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_row_values(columns, operator.into_operator(), values, Boolean::And)
    }

    pub fn or_where_row_values<O, I, T>(&mut self, columns: &[&str], operator: O, values: I) -> &mut Self
    where
        O: IntoOperator,
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.add_where_row_values(columns, operator.into_operator(), values, Boolean::Or)
    }

    fn add_where_row_values<I, T>(
        &mut self,
        columns: &[&str],
        operator: Result<Operator>,
        values: I,
        boolean: Boolean,
    ) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        let Some(operator) = self.accept(operator) else {
            return self;
        };
        let values: Vec<Operand> = values.into_iter().map(IntoOperand::into_operand).collect();
        if columns.len() != values.len() {
            self.fail("The number of columns must match the number of values");
            return self;
        }
        for value in &values {
            self.add_operand_binding(BindingKind::Where, value);
        }
        self.wheres.push(Where::RowValues {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            operator,
            values,
            boolean,
        });
        self
    }

    pub fn where_json_contains<T: Into<Value>>(&mut self, column: &str, value: T) -> &mut Self {
        self.add_where_json_contains(column, value.into(), false, Boolean::And)
    }

    pub fn or_where_json_contains<T: Into<Value>>(&mut self, column: &str, value: T) -> &mut Self {
        self.add_where_json_contains(column, value.into(), false, Boolean::Or)
    }

    pub fn where_json_doesnt_contain<T: Into<Value>>(&mut self, column: &str, value: T) -> &mut Self {
        self.add_where_json_contains(column, value.into(), true, Boolean::And)
    }

    pub fn or_where_json_doesnt_contain<T: Into<Value>>(&mut self, column: &str, value: T) -> &mut Self {
        self.add_where_json_contains(column, value.into(), true, Boolean::Or)
    }

    fn add_where_json_contains(&mut self, column: &str, value: Value, not: bool, boolean: Boolean) -> &mut Self {
        let value = self.grammar.prepare_binding_for_json_contains(value);
        self.bindings.push(BindingKind::Where, value.clone());
        self.wheres.push(Where::JsonContains {
            column: column.to_string(),
            value: Operand::Value(value),
            not,
            boolean,
        });
        self
    }

    /// Compare the length of a JSON array: `where_json_length(("tags", ">", 1))`
    pub fn where_json_length<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_where_json_length(condition, Boolean::And)
    }

    pub fn or_where_json_length<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        self.add_where_json_length(condition, Boolean::Or)
    }

    fn add_where_json_length<C: IntoCondition>(&mut self, condition: C, boolean: Boolean) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        let Some(operator) = self.accept(operator) else {
            return self;
        };
        self.add_operand_binding(BindingKind::Where, &value);
        self.wheres.push(Where::JsonLength {
            column,
            operator,
            value,
            boolean,
        });
        self
    }
}

/// Dates and times are compared as formatted strings; days and months are zero padded
fn date_part_value(part: DatePart, value: Value) -> Value {
    match (part, value) {
        (DatePart::Date, Value::DateTime(at)) => Value::String(at.format("%Y-%m-%d").to_string()),
        (DatePart::Date, Value::Date(date)) => Value::String(date.format("%Y-%m-%d").to_string()),
        (DatePart::Time, Value::DateTime(at)) => Value::String(at.format("%H:%M:%S").to_string()),
        (DatePart::Time, Value::Time(time)) => Value::String(time.format("%H:%M:%S").to_string()),
        (DatePart::Day, Value::DateTime(at)) => Value::String(at.format("%d").to_string()),
        (DatePart::Day, Value::Date(date)) => Value::String(date.format("%d").to_string()),
        (DatePart::Month, Value::DateTime(at)) => Value::String(at.format("%m").to_string()),
        (DatePart::Month, Value::Date(date)) => Value::String(date.format("%m").to_string()),
        (DatePart::Year, Value::DateTime(at)) => Value::String(at.format("%Y").to_string()),
        (DatePart::Year, Value::Date(date)) => Value::String(date.format("%Y").to_string()),
        (DatePart::Day | DatePart::Month, value) => value.two_digits(),
        (_, value) => value,
    }
}
