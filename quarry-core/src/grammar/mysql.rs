use super::Grammar;
use crate::builder::clause::Lock;
use crate::builder::common::Record;
use crate::builder::Builder;
use crate::Result;

pub(super) fn wrap_json_selector(grammar: &Grammar, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(value);
    format!("json_unquote(json_extract({}{}))", field, path)
}

pub(super) fn wrap_json_boolean_selector(grammar: &Grammar, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(value);
    format!("json_extract({}{})", field, path)
}

/// JSON `null` counts as null alongside a missing key
pub(super) fn where_json_null(grammar: &Grammar, column: &str, not: bool) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    if not {
        format!(
            "(json_extract({f}{p}) is not null AND json_type(json_extract({f}{p})) != 'NULL')",
            f = field,
            p = path
        )
    } else {
        format!(
            "(json_extract({f}{p}) is null OR json_type(json_extract({f}{p})) = 'NULL')",
            f = field,
            p = path
        )
    }
}

pub(super) fn compile_json_contains(grammar: &Grammar, column: &str, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    format!("json_contains({}, {}{})", field, value, path)
}

pub(super) fn compile_json_length(grammar: &Grammar, column: &str, operator: &str, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    format!("json_length({}{}) {} {}", field, path, operator, value)
}

pub(super) fn compile_lock(lock: &Lock) -> &str {
    match lock {
        Lock::Update => "for update",
        Lock::Shared => "lock in share mode",
        Lock::Raw(sql) => sql,
    }
}

pub(super) fn compile_upsert(
    grammar: &Grammar,
    query: &Builder,
    records: &[Record],
    update: &[String],
) -> Result<String> {
    let sql = grammar.compile_insert(query, records)?;
    let columns = update
        .iter()
        .map(|column| {
            let wrapped = grammar.wrap(column)?;
            Ok(format!("{} = values({})", wrapped, wrapped))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{} on duplicate key update {}", sql, columns.join(", ")))
}

/// Single-table updates and deletes may carry an order and a limit
pub(super) fn append_order_and_limit(grammar: &Grammar, query: &Builder, mut sql: String) -> Result<String> {
    if !query.orders.is_empty() {
        sql.push(' ');
        sql.push_str(&grammar.compile_orders(&query.orders)?);
    }
    if let Some(limit) = query.limit.and_then(|limit| grammar.compile_limit(limit)) {
        sql.push(' ');
        sql.push_str(&limit);
    }
    Ok(sql)
}
