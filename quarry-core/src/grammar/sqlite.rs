use super::Grammar;
use crate::builder::clause::DatePart;
use crate::Result;

pub(super) fn wrap_json_selector(grammar: &Grammar, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(value);
    format!("json_extract({}{})", field, path)
}

pub(super) fn date_based_where(part: DatePart, column: &str, operator: &str, value: &str) -> String {
    let format = match part {
        DatePart::Date => "%Y-%m-%d",
        DatePart::Day => "%d",
        DatePart::Month => "%m",
        DatePart::Year => "%Y",
        DatePart::Time => "%H:%M:%S",
    };
    format!("strftime('{}', {}) {} cast({} as text)", format, column, operator, value)
}

pub(super) fn compile_json_contains(grammar: &Grammar, column: &str, value: &str) -> Result<String> {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    Ok(format!(
        "exists (select 1 from json_each({}{}) where {} is {})",
        field,
        path,
        grammar.wrap("json_each.value")?,
        value
    ))
}

pub(super) fn compile_json_length(grammar: &Grammar, column: &str, operator: &str, value: &str) -> String {
    let (field, path) = grammar.wrap_json_field_and_path(column);
    format!("json_array_length({}{}) {} {}", field, path, operator, value)
}
