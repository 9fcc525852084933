//! Request matching logic.
//!
//! The three predicates a stub expectation can apply to a request payload.

use crate::value::{to_comparable_string, FieldValue, Fields};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Matching mode of an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Whole-payload equality
    Equals,
    /// Field subset equality
    Contains,
    /// Per-field regex search
    Matches,
}

impl Rule {
    /// Name of the rule as it appears in stub definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Equals => "equals",
            Rule::Contains => "contains",
            Rule::Matches => "matches",
        }
    }

    /// Apply this rule's predicate to a request payload.
    pub fn evaluate(&self, expect: &Fields, actual: &Fields) -> bool {
        match self {
            Rule::Equals => equals(expect, actual),
            Rule::Contains => contains(expect, actual),
            Rule::Matches => matches(expect, actual),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Same key set, same values, same types.
pub fn equals(expect: &Fields, actual: &Fields) -> bool {
    expect == actual
}

/// Every expected key is present with an equal value. Extra keys are ignored.
pub fn contains(expect: &Fields, actual: &Fields) -> bool {
    expect
        .iter()
        .all(|(key, value)| actual.get(key).is_some_and(|actual| actual == value))
}

/// Every expected pattern finds a match in the corresponding actual value.
///
/// Fails closed: a missing field, a value without a string form, or a pattern
/// that does not compile all make the whole predicate false.
pub fn matches(expect: &Fields, actual: &Fields) -> bool {
    CompiledPatterns::new(expect).is_match(actual)
}

/// `matches` expectation with its patterns compiled up front.
///
/// A pattern that has no string form or does not compile is kept as `None`
/// and never matches.
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    patterns: Vec<(String, Option<Regex>)>,
}

impl CompiledPatterns {
    /// Compile every pattern of a `matches` expectation.
    pub fn new(expect: &Fields) -> Self {
        let patterns = expect
            .iter()
            .map(|(key, pattern)| (key.clone(), compile_pattern(key, pattern)))
            .collect();
        Self { patterns }
    }

    /// Whether every pattern finds a match in the request payload.
    pub fn is_match(&self, actual: &Fields) -> bool {
        for (key, regex) in &self.patterns {
            let Some(regex) = regex else {
                return false;
            };

            let Some(actual_value) = actual.get(key) else {
                warn!(field = %key, "Field missing from request payload");
                return false;
            };
            let actual_value = match to_comparable_string(actual_value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(field = %key, error = %e, "Cannot match request value");
                    return false;
                }
            };

            if !regex.is_match(&actual_value) {
                return false;
            }
        }
        true
    }
}

fn compile_pattern(key: &str, pattern: &FieldValue) -> Option<Regex> {
    let pattern = match to_comparable_string(pattern) {
        Ok(p) => p,
        Err(e) => {
            warn!(field = %key, error = %e, "Cannot use expected value as a pattern");
            return None;
        }
    };

    match Regex::new(&pattern) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!(
                field = %key,
                pattern = %pattern,
                error = %e,
                "Error on compiling regex"
            );
            None
        }
    }
}
