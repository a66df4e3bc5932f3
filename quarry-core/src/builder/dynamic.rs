//! Named handlers and dynamic `whereXAndY` calls

use super::common::Boolean;
use super::Builder;
use crate::{Error, Result, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A handler invoked by [`Builder::call`]
pub type MacroFn = Arc<dyn Fn(&mut Builder, &[Value]) -> Result<()> + Send + Sync>;

/// A registry of named builder extensions.
///
/// Cloning is cheap; a connection hands its registry to every builder it
/// creates, and registering on a clone does not affect the others.
#[derive(Clone, Default)]
pub struct Macros {
    handlers: Arc<HashMap<String, MacroFn>>,
}

impl Macros {
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Builder, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.handlers).insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<MacroFn> {
        self.handlers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        Arc::make_mut(&mut self.handlers).remove(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Macros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Macros").field("names", &names).finish()
    }
}

/// Split a `whereFirstNameOrEmail` style method name into columns and booleans.
///
/// `And`/`Or` only separate segments when an uppercase letter follows them,
/// so `whereOrderId` is the single column `order_id`. Each segment is snake
/// cased by breaking before every uppercase letter: `UserID` is `user_i_d`.
pub fn parse_dynamic_where(method: &str) -> Result<Vec<(String, Boolean)>> {
    let finder = method
        .strip_prefix("where")
        .ok_or_else(|| Error::undefined_method(method))?;

    let mut segments = Vec::new();
    let mut boolean = Boolean::And;
    let mut start = 0;
    let mut index = 0;

    while index < finder.len() {
        let rest = &finder[index..];
        let connector = [("And", Boolean::And), ("Or", Boolean::Or)]
            .into_iter()
            .find(|(word, _)| {
                rest.starts_with(*word)
                    && rest[word.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_uppercase())
            });

        match connector {
            Some((word, next)) => {
                segments.push((segment_column(method, &finder[start..index])?, boolean));
                boolean = next;
                index += word.len();
                start = index;
            }
            None => {
                index += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    segments.push((segment_column(method, &finder[start..])?, boolean));

    Ok(segments)
}

fn segment_column(method: &str, segment: &str) -> Result<String> {
    if segment.is_empty() {
        return Err(Error::undefined_method(method));
    }
    Ok(snake_case(segment))
}

fn snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for (index, c) in value.chars().filter(|c| !c.is_whitespace()).enumerate() {
        if c.is_uppercase() && index > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}
