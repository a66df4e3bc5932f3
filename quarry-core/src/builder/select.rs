//! SELECT shaping: columns, sources, grouping, ordering, paging, unions and locks

use super::bindings::BindingKind;
use super::clause::{Having, Lock, Order, Union};
use super::common::{Boolean, Identifier, IntoColumns, IntoCondition, IntoIdentifier, IntoOperand, Operand, SortDirection};
use super::Builder;
use crate::{raw, Operator, Result, Value};

impl Builder {
    /// Set the columns to select, replacing any previous selection
    pub fn select<C: IntoColumns>(&mut self, columns: C) -> &mut Self {
        self.columns = Some(columns.into_columns());
        self.bindings.clear(BindingKind::Select);
        self
    }

    pub fn add_select<C: IntoColumns>(&mut self, columns: C) -> &mut Self {
        self.columns
            .get_or_insert_with(Vec::new)
            .extend(columns.into_columns());
        self
    }

    pub fn select_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.add_select(raw(sql));
        self.bindings.extend(BindingKind::Select, bindings);
        self
    }

    /// Select a sub-query as an aliased column
    pub fn select_sub<F>(&mut self, callback: F, alias: &str) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.absorb_error(&query);
        if let Some((sql, bindings)) = self.compile_sub(&query) {
            let column = format!("({}) as {}", sql, self.grammar.wrap_value(alias));
            self.add_select(raw(column));
            self.bindings.extend(BindingKind::Select, bindings);
        }
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// Set the table to select from; `"users as u"` aliases it
    pub fn from<T: IntoIdentifier>(&mut self, table: T) -> &mut Self {
        self.from = Some(table.into_identifier());
        self
    }

    pub fn from_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.from = Some(Identifier::Raw(raw(sql)));
        self.bindings.extend(BindingKind::From, bindings);
        self
    }

    /// Select from a derived table
    pub fn from_sub<F>(&mut self, callback: F, alias: &str) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.absorb_error(&query);
        if let Some((sql, bindings)) = self.compile_sub(&query) {
            let table = match self.grammar.wrap_table(alias) {
                Ok(table) => table,
                Err(error) => {
                    self.fail(error.to_string());
                    return self;
                }
            };
            self.from = Some(Identifier::Raw(raw(format!("({}) as {}", sql, table))));
            self.bindings.set(BindingKind::From, bindings);
        }
        self
    }

    pub fn group_by<C: IntoColumns>(&mut self, columns: C) -> &mut Self {
        self.groups.extend(columns.into_columns());
        self
    }

    pub fn group_by_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.groups.push(Identifier::Raw(raw(sql)));
        self.bindings.extend(BindingKind::GroupBy, bindings);
        self
    }

    pub fn having<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        self.add_having(column, operator, value, Boolean::And)
    }

    pub fn or_having<C: IntoCondition>(&mut self, condition: C) -> &mut Self {
        let (column, operator, value) = condition.into_condition();
        self.add_having(column, operator, value, Boolean::Or)
    }

    fn add_having(&mut self, column: String, operator: Result<Operator>, value: Operand, boolean: Boolean) -> &mut Self {
        let Some(operator) = self.accept(operator) else {
            return self;
        };
        if value.is_null() && (operator.is_equality() || operator.is_inequality()) {
            let not = operator.is_inequality();
            self.havings.push(Having::Null { column, not, boolean });
            return self;
        }
        self.add_operand_binding(BindingKind::Having, &value);
        self.havings.push(Having::Basic {
            column,
            operator,
            value,
            boolean,
        });
        self
    }

    pub fn having_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.add_having_raw(sql, bindings, Boolean::And)
    }

    pub fn or_having_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.add_having_raw(sql, bindings, Boolean::Or)
    }

    fn add_having_raw(&mut self, sql: &str, bindings: Vec<Value>, boolean: Boolean) -> &mut Self {
        self.bindings.extend(BindingKind::Having, bindings);
        self.havings.push(Having::Raw {
            sql: sql.to_string(),
            boolean,
        });
        self
    }

    pub fn having_null(&mut self, column: &str) -> &mut Self {
        self.havings.push(Having::Null {
            column: column.to_string(),
            not: false,
            boolean: Boolean::And,
        });
        self
    }

    pub fn having_not_null(&mut self, column: &str) -> &mut Self {
        self.havings.push(Having::Null {
            column: column.to_string(),
            not: true,
            boolean: Boolean::And,
        });
        self
    }

    pub fn having_between<A: IntoOperand, B: IntoOperand>(&mut self, column: &str, min: A, max: B) -> &mut Self {
        let (min, max) = (min.into_operand(), max.into_operand());
        self.add_operand_binding(BindingKind::Having, &min);
        self.add_operand_binding(BindingKind::Having, &max);
        self.havings.push(Having::Between {
            column: column.to_string(),
            min,
            max,
            not: false,
            boolean: Boolean::And,
        });
        self
    }

    /// Order by a column; after a union the ordering applies to the whole union
    pub fn order_by<C: IntoIdentifier>(&mut self, column: C, direction: SortDirection) -> &mut Self {
        let order = Order::Column {
            column: column.into_identifier(),
            direction,
        };
        self.push_order(order, Vec::new())
    }

    pub fn order_by_desc<C: IntoIdentifier>(&mut self, column: C) -> &mut Self {
        self.order_by(column, SortDirection::Desc)
    }

    pub fn order_by_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.push_order(Order::Raw(sql.to_string()), bindings)
    }

    /// Order by the result of a sub-query
    pub fn order_by_sub<F>(&mut self, callback: F, direction: SortDirection) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        self.absorb_error(&query);
        match self.compile_sub(&query) {
            Some((sql, bindings)) => self.push_order(Order::Raw(format!("({}) {}", sql, direction)), bindings),
            None => self,
        }
    }

    fn push_order(&mut self, order: Order, bindings: Vec<Value>) -> &mut Self {
        if self.unions.is_empty() {
            self.orders.push(order);
            self.bindings.extend(BindingKind::Order, bindings);
        } else {
            self.union_orders.push(order);
            self.bindings.extend(BindingKind::UnionOrder, bindings);
        }
        self
    }

    /// Newest first on the given column, `created_at` when `None`
    pub fn latest(&mut self, column: Option<&str>) -> &mut Self {
        self.order_by(column.unwrap_or("created_at"), SortDirection::Desc)
    }

    pub fn oldest(&mut self, column: Option<&str>) -> &mut Self {
        self.order_by(column.unwrap_or("created_at"), SortDirection::Asc)
    }

    pub fn in_random_order(&mut self, seed: &str) -> &mut Self {
        let sql = self.grammar.compile_random(seed);
        self.order_by_raw(&sql, Vec::new())
    }

    /// Drop all orderings and their bindings
    pub fn reorder(&mut self) -> &mut Self {
        self.orders.clear();
        self.union_orders.clear();
        self.bindings.clear(BindingKind::Order);
        self.bindings.clear(BindingKind::UnionOrder);
        self
    }

    pub fn reorder_by<C: IntoIdentifier>(&mut self, column: C, direction: SortDirection) -> &mut Self {
        self.reorder().order_by(column, direction)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        if self.unions.is_empty() {
            self.limit = Some(limit);
        } else {
            self.union_limit = Some(limit);
        }
        self
    }

    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.limit(limit)
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        if self.unions.is_empty() {
            self.offset = Some(offset);
        } else {
            self.union_offset = Some(offset);
        }
        self
    }

    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.offset(offset)
    }

    /// Window the results to one page; pages count from 1
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.offset(offset).limit(per_page)
    }

    /// Rows after `last_id` on `column`, ascending, for cursor-style paging
    pub fn for_page_after_id(&mut self, per_page: u64, last_id: Option<Value>, column: &str) -> &mut Self {
        self.orders.retain(|order| !order.is_on(column));
        if let Some(last_id) = last_id {
            self.where_((column, Operator::GT, last_id));
        }
        self.order_by(column, SortDirection::Asc).limit(per_page)
    }

    pub fn union(&mut self, query: Builder) -> &mut Self {
        self.add_union(query, false)
    }

    pub fn union_all(&mut self, query: Builder) -> &mut Self {
        self.add_union(query, true)
    }

    fn add_union(&mut self, query: Builder, all: bool) -> &mut Self {
        self.absorb_error(&query);
        self.bindings.extend(BindingKind::Union, query.get_bindings());
        self.unions.push(Union {
            query: Box::new(query),
            all,
        });
        self
    }

    pub fn lock_for_update(&mut self) -> &mut Self {
        self.lock(Lock::Update)
    }

    pub fn shared_lock(&mut self) -> &mut Self {
        self.lock(Lock::Shared)
    }

    /// Locking reads always go to the write handle
    pub fn lock(&mut self, lock: Lock) -> &mut Self {
        self.lock = Some(lock);
        self.use_write = true;
        self
    }
}
