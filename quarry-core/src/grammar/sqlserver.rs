use super::{Components, Grammar};
use crate::builder::clause::{DatePart, Lock};
use crate::builder::common::{Identifier, Operand, Record};
use crate::builder::Builder;
use crate::{raw, Error, Result};

pub(super) fn wrap_json_selector(grammar: &Grammar, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(value);
    format!("json_value({}{})", field, path)
}

pub(super) fn date_based_where(part: DatePart, column: &str, operator: &str, value: &str) -> String {
    match part {
        DatePart::Date => format!("cast({} as date) {} {}", column, operator, value),
        DatePart::Time => format!("cast({} as time) {} {}", column, operator, value),
        _ => format!("{}({}) {} {}", part.as_str(), column, operator, value),
    }
}

pub(super) fn compile_json_contains(grammar: &Grammar, column: &str, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    format!("{} in (select [value] from openjson({}{}))", value, field, path)
}

pub(super) fn compile_json_length(grammar: &Grammar, column: &str, operator: &str, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    format!("(select count(*) from openjson({}{})) {} {}", field, path, operator, value)
}

/// Locks are table hints on the from clause
pub(super) fn compile_from_lock(from: String, lock: Option<&Lock>) -> String {
    match lock {
        Some(Lock::Raw(sql)) => format!("{} {}", from, sql),
        Some(Lock::Update) => format!("{} with(rowlock,updlock,holdlock)", from),
        Some(Lock::Shared) => format!("{} with(rowlock,holdlock)", from),
        None => from,
    }
}

/// Offsets page through a `row_number()` window over the query's ordering
pub(super) fn compile_ansi_offset(query: &Builder, mut components: Components) -> String {
    let orders = components
        .orders
        .take()
        .unwrap_or_else(|| "order by (select 0)".to_string());

    if let Some(columns) = components.columns.as_mut() {
        columns.push_str(&format!(", row_number() over ({}) as row_num", orders));
    }

    let offset = query.offset.unwrap_or(0);
    let start = offset + 1;
    let constraint = match query.limit.filter(|limit| *limit > 0) {
        Some(limit) => format!("between {} and {}", start, offset + limit),
        None => format!(">= {}", start),
    };

    format!(
        "select * from ({}) as temp_table where row_num {} order by row_num",
        components.concatenate(),
        constraint
    )
}

pub(super) fn compile_exists(grammar: &Grammar, query: &Builder) -> Result<String> {
    let mut exists = query.clone();
    exists.columns = Some(vec![Identifier::Raw(raw("1 [exists]"))]);
    exists.limit = Some(1);
    grammar.compile_select(&exists)
}

pub(super) fn delete_top(query: &Builder, sql: String) -> String {
    match query.limit.filter(|limit| *limit > 0) {
        Some(limit) if query.offset.unwrap_or(0) == 0 => {
            sql.replacen("delete", &format!("delete top ({})", limit), 1)
        }
        _ => sql,
    }
}

pub(super) fn compile_upsert(
    grammar: &Grammar,
    query: &Builder,
    records: &[Record],
    unique_by: &[String],
    update: &[String],
) -> Result<String> {
    let table = query
        .from
        .as_ref()
        .and_then(Identifier::name)
        .ok_or_else(|| Error::invalid_query("Upserts require a table name"))?;
    let first = records
        .first()
        .ok_or_else(|| Error::invalid_query("Upserts require at least one record"))?;

    let columns: Vec<&str> = first.iter().map(|(column, _)| column.as_str()).collect();
    let columns = grammar.columnize_names(&columns)?;
    let parameters = records
        .iter()
        .map(|record| {
            let values: Vec<Operand> = record.iter().map(|(_, value)| value.clone()).collect();
            format!("({})", grammar.parameterize(&values))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "merge {} using (values {}) {} ({}) ",
        grammar.wrap_table(table)?,
        parameters,
        grammar.wrap_table("upsert_source")?,
        columns
    );

    let on = unique_by
        .iter()
        .map(|column| {
            Ok(format!(
                "{} = {}",
                grammar.wrap(&format!("upsert_source.{}", column))?,
                grammar.wrap(&format!("{}.{}", table, column))?
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    sql.push_str(&format!("on {} ", on.join(" and ")));

    if !update.is_empty() {
        let sets = update
            .iter()
            .map(|column| {
                Ok(format!(
                    "{} = {}",
                    grammar.wrap(column)?,
                    grammar.wrap(&format!("upsert_source.{}", column))?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(&format!("when matched then update set {} ", sets.join(", ")));
    }

    sql.push_str(&format!(
        "when not matched then insert ({}) values ({});",
        columns, columns
    ));
    Ok(sql)
}
