//! Query and partial-update descriptors accepted by `EntityStore`.
//!
//! # Invariants
//! - Field and key names must match `^[A-Za-z_][A-Za-z0-9_]*$`; they are
//!   turned into JSON paths and never interpolated unchecked.

use crate::model::EntityId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name pattern is valid")
});

/// Returns whether `name` is usable as a top-level document field or key.
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME_RE.is_match(name)
}

pub(crate) fn json_path(name: &str) -> String {
    format!("$.{name}")
}

/// Named-field partial update. Fields not listed are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates {
    fields: Vec<(String, Value)>,
}

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`. A later call for the same field wins.
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        let field = field.into();
        self.fields.retain(|(existing, _)| existing != &field);
        self.fields.push((field, value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }
}

/// Numeric comparison used by element predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub(crate) fn sql_operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// One `key <op> value` test applied to an object array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPredicate {
    pub key: String,
    pub op: Comparison,
    pub value: i64,
}

impl ElementPredicate {
    pub fn new(key: impl Into<String>, op: Comparison, value: i64) -> Self {
        Self {
            key: key.into(),
            op,
            value,
        }
    }
}

/// Array element matcher for `EntityStore::find_where_array_contains`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayMatcher {
    /// Scalar array holds this id, e.g. a project's `members` holds employee 7.
    Equals(EntityId),
    /// Object array holds one element satisfying every predicate, e.g. an
    /// employee's `skills` holds `skillId = 3` with `proficiency >= 4`.
    ElementMatch(Vec<ElementPredicate>),
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            total: self.total,
            page_number: self.page_number,
            page_size: self.page_size,
        })
    }
}
