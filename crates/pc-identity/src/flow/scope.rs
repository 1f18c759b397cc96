//! Scope normalization
//!
//! Requests carry scope either as one space-delimited string or as a list.
//! Both forms normalize to the same sorted, de-duplicated, single-space
//! joined string so equal requests produce byte-identical authorize URLs.

use std::collections::BTreeSet;

use serde::Deserialize;

/// A scope as requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScopeRequest {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for ScopeRequest {
    fn from(value: &str) -> Self {
        ScopeRequest::Text(value.to_string())
    }
}

impl From<String> for ScopeRequest {
    fn from(value: String) -> Self {
        ScopeRequest::Text(value)
    }
}

impl From<Vec<String>> for ScopeRequest {
    fn from(value: Vec<String>) -> Self {
        ScopeRequest::List(value)
    }
}

impl From<&[&str]> for ScopeRequest {
    fn from(value: &[&str]) -> Self {
        ScopeRequest::List(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ScopeRequest {
    fn from(value: [&str; N]) -> Self {
        ScopeRequest::List(value.iter().map(|s| s.to_string()).collect())
    }
}

impl ScopeRequest {
    /// Individual scope values, sorted and unique.
    pub fn items(&self) -> BTreeSet<String> {
        let raw: Vec<&str> = match self {
            ScopeRequest::Text(text) => text.split_whitespace().collect(),
            // List entries may themselves hold several space-separated values.
            ScopeRequest::List(list) => list.iter().flat_map(|s| s.split_whitespace()).collect(),
        };
        raw.into_iter().map(str::to_string).collect()
    }

    pub fn normalize(&self) -> String {
        self.items().into_iter().collect::<Vec<_>>().join(" ")
    }
}

pub fn normalize_scope(scope: impl Into<ScopeRequest>) -> String {
    scope.into().normalize()
}

/// Normalized list form, used when storing a client's allowed scope.
pub fn normalize_scope_list(scope: impl Into<ScopeRequest>) -> Vec<String> {
    scope.into().items().into_iter().collect()
}
