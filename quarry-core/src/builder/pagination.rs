//! Paginated result pages

use super::bindings::BindingKind;
use super::common::Identifier;
use super::fetch::json_to_u64;
use super::Builder;
use crate::connection::{Connection, Driver, Row};
use crate::Result;
use serde::Serialize;

/// A page of results together with the total number of matching rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthAwarePaginator<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> LengthAwarePaginator<T> {
    pub fn new(items: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 {
            1
        } else {
            total.div_ceil(per_page).max(1)
        };
        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    /// 1-based position of the first item on this page
    pub fn first_item(&self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.current_page.saturating_sub(1) * self.per_page + 1)
    }

    pub fn last_item(&self) -> Option<u64> {
        self.first_item().map(|first| first + self.items.len() as u64 - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A page of results that only knows whether another page follows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplePaginator<T> {
    pub items: Vec<T>,
    pub per_page: u64,
    pub current_page: u64,
    pub has_more: bool,
}

impl<T> SimplePaginator<T> {
    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Builder {
    /// Count the matching rows, then fetch page `page` (from 1) of them.
    ///
    /// No page is fetched when the count is zero.
    pub async fn paginate<D: Driver>(
        &self,
        conn: &mut Connection<D>,
        per_page: u64,
        page: u64,
    ) -> Result<LengthAwarePaginator<Row>> {
        let page = page.max(1);
        let total = self.count_for_pagination(conn).await?;

        let items = if total > 0 {
            let mut query = self.clone();
            query.for_page(page, per_page);
            query.get(conn).await?
        } else {
            Vec::new()
        };

        Ok(LengthAwarePaginator::new(items, total, per_page, page))
    }

    /// Fetch page `page` without counting, reading one extra row to learn
    /// whether another page exists
    pub async fn simple_paginate<D: Driver>(
        &self,
        conn: &mut Connection<D>,
        per_page: u64,
        page: u64,
    ) -> Result<SimplePaginator<Row>> {
        let page = page.max(1);
        let mut query = self.clone();
        query.offset(page.saturating_sub(1).saturating_mul(per_page));
        query.limit(per_page.saturating_add(1));

        let mut items = query.get(conn).await?;
        let has_more = items.len() as u64 > per_page;
        items.truncate(per_page as usize);

        Ok(SimplePaginator {
            items,
            per_page,
            current_page: page,
            has_more,
        })
    }

    async fn count_for_pagination<D: Driver>(&self, conn: &mut Connection<D>) -> Result<u64> {
        let mut query = self.clone();
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        query.union_orders.clear();
        query.union_limit = None;
        query.union_offset = None;
        query.bindings.clear(BindingKind::Order);
        query.bindings.clear(BindingKind::UnionOrder);

        let count = if !self.groups.is_empty() || !self.havings.is_empty() {
            // grouped rows are counted from a derived table
            if query.columns.is_none() && !query.joins.is_empty() {
                if let Some(table) = query.from.as_ref().and_then(Identifier::name) {
                    let all = format!("{}.*", table);
                    query.select(all.as_str());
                }
            }
            let (sql, bindings) = query.to_compiled()?;
            let mut outer = self.new_query();
            outer.from_raw(
                &format!("({}) as {}", sql, self.grammar.wrap_value("aggregate_table")),
                bindings,
            );
            outer.set_aggregate("count", vec![Identifier::Name("*".to_string())]);
            outer
        } else {
            if query.unions.is_empty() {
                query.columns = None;
                query.bindings.clear(BindingKind::Select);
            }
            query.set_aggregate("count", vec![Identifier::Name("*".to_string())]);
            query
        };

        let rows = count.get(conn).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("aggregate"))
            .and_then(json_to_u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SortDirection;
    use crate::connection::mock::MockDriver;
    use crate::grammar::{Dialect, Grammar};
    use crate::Value;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn setup() -> (MockDriver, Connection<MockDriver>) {
        let driver = MockDriver::new("write");
        let conn = Connection::new(driver.clone(), Grammar::new(Dialect::MySql));
        (driver, conn)
    }

    #[test]
    fn test_page_arithmetic() {
        let page = LengthAwarePaginator::new(vec![1, 2, 3], 23, 3, 2);
        assert_eq!(page.last_page, 8);
        assert!(page.has_more_pages());
        assert_eq!(page.first_item(), Some(4));
        assert_eq!(page.last_item(), Some(6));

        let empty: LengthAwarePaginator<i32> = LengthAwarePaginator::new(vec![], 0, 15, 1);
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.first_item(), None);
        assert!(!empty.has_more_pages());
    }

    #[tokio::test]
    async fn test_paginate_counts_then_fetches() {
        let (driver, mut conn) = setup();
        driver.push_rows(vec![json!({"aggregate": 5})]);
        driver.push_rows(vec![json!({"id": 3}), json!({"id": 4})]);

        let mut query = conn.table("users");
        query.select(["id", "name"]).where_(("active", true)).order_by("id", SortDirection::Asc);
        let page = assert_ok!(query.paginate(&mut conn, 2, 2).await);

        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.items.len(), 2);

        let calls = driver.calls();
        assert_eq!(calls[0].sql, "select count(*) as aggregate from `users` where `active` = ?");
        assert_eq!(
            calls[1].sql,
            "select `id`, `name` from `users` where `active` = ? order by `id` asc limit 2 offset 2"
        );
        assert_eq!(calls[1].bindings, vec![Value::Bool(true)]);
    }

    #[tokio::test]
    async fn test_paginate_skips_the_page_query_when_empty() {
        let (driver, mut conn) = setup();
        driver.push_rows(vec![json!({"aggregate": 0})]);

        let page = assert_ok!(conn.table("users").paginate(&mut conn, 15, 1).await);
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(driver.count_of("select"), 1);
    }

    #[tokio::test]
    async fn test_paginate_grouped_query_counts_a_derived_table() {
        let (driver, mut conn) = setup();
        driver.push_rows(vec![json!({"aggregate": 2})]);
        driver.push_rows(vec![]);

        let mut query = conn.table("orders");
        query.select("user_id").group_by("user_id").having(("user_id", ">", 10));
        assert_ok!(query.paginate(&mut conn, 10, 1).await);

        let call = &driver.calls()[0];
        assert_eq!(
            call.sql,
            "select count(*) as aggregate from (select `user_id` from `orders` group by `user_id` having `user_id` > ?) as `aggregate_table`"
        );
        assert_eq!(call.bindings, vec![Value::I32(10)]);
    }

    #[tokio::test]
    async fn test_simple_paginate_reads_one_extra_row() {
        let (driver, mut conn) = setup();
        driver.push_rows(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);

        let page = assert_ok!(conn.table("users").simple_paginate(&mut conn, 2, 1).await);
        assert!(page.has_more_pages());
        assert_eq!(page.items.len(), 2);
        assert_eq!(driver.calls_of("select"), vec!["select * from `users` limit 3 offset 0".to_string()]);
    }
}
