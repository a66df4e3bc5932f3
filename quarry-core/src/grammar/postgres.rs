use super::Grammar;
use crate::builder::clause::DatePart;
use crate::Result;

/// `"col"->'a'->>'b'`; integer segments index arrays and stay unquoted
pub(super) fn wrap_json_selector(grammar: &Grammar, value: &str) -> String {
    let mut segments = value.split("->");
    let field = grammar.wrap_segments(segments.next().unwrap_or_default());
    let mut attributes: Vec<String> = segments.flat_map(wrap_json_path_segment).collect();
    match attributes.pop() {
        Some(last) if attributes.is_empty() => format!("{}->>{}", field, last),
        Some(last) => format!("{}->{}->>{}", field, attributes.join("->"), last),
        None => field,
    }
}

/// `tags[0][1]` becomes `'tags'`, `0`, `1`
fn wrap_json_path_segment(segment: &str) -> Vec<String> {
    let (key, brackets) = match segment.find('[') {
        Some(at) if segment.ends_with(']') => segment.split_at(at),
        _ => return vec![wrap_json_path_attribute(segment)],
    };
    let indexes: Option<Vec<&str>> = brackets[1..brackets.len() - 1]
        .split("][")
        .map(|index| index.parse::<i64>().ok().map(|_| index))
        .collect();
    match indexes {
        Some(indexes) => {
            let key = (!key.is_empty()).then(|| wrap_json_path_attribute(key));
            key.into_iter()
                .chain(indexes.into_iter().map(str::to_string))
                .collect()
        }
        None => vec![wrap_json_path_attribute(segment)],
    }
}

fn wrap_json_path_attribute(attribute: &str) -> String {
    if attribute.parse::<i64>().is_ok() {
        attribute.to_string()
    } else {
        format!("'{}'", attribute.replace('\'', "''"))
    }
}

pub(super) fn wrap_json_boolean_selector(grammar: &Grammar, value: &str) -> String {
    format!("({})::jsonb", wrap_json_selector(grammar, value).replace("->>", "->"))
}

pub(super) fn date_based_where(part: DatePart, column: &str, operator: &str, value: &str) -> String {
    match part {
        DatePart::Date => format!("{}::date {} {}", column, operator, value),
        DatePart::Time => format!("{}::time {} {}", column, operator, value),
        _ => format!("extract({} from {}) {} {}", part.as_str(), column, operator, value),
    }
}

pub(super) fn compile_json_contains(grammar: &Grammar, column: &str, value: &str) -> Result<String> {
    let column = grammar.wrap(column)?.replace("->>", "->");
    Ok(format!("({})::jsonb @> {}", column, value))
}

pub(super) fn compile_json_length(grammar: &Grammar, column: &str, operator: &str, value: &str) -> Result<String> {
    let column = grammar.wrap(column)?.replace("->>", "->");
    Ok(format!("jsonb_array_length(({})::jsonb) {} {}", column, operator, value))
}

/// Rewrite `?` placeholders as `$1, $2, ...`.
///
/// `??` is an escaped literal question mark; quoted strings and identifiers
/// are copied untouched.
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut index = 0;

    while let Some(c) = chars.next() {
        match quote {
            Some(open) => {
                out.push(c);
                if c == open {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' if chars.peek() == Some(&'?') => {
                    chars.next();
                    out.push('?');
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                other => out.push(other),
            },
        }
    }

    out
}
