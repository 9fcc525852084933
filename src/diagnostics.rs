//! Closest-match diagnostics for lookups that found no stub.
//!
//! Every populated expectation seen during a failed scan becomes a
//! [`CloseMatch`] candidate. Candidates are ranked by how many of their keys and
//! values loosely occur in the rendered request, and the best one is named in
//! the not-found report. The ranking is a heuristic for humans only; it never
//! influences which stub matches.

use crate::matcher::Rule;
use crate::value::Fields;
use serde::Serialize;
use std::fmt;

/// Candidate collected while scanning stubs.
#[derive(Debug, Clone, Copy)]
pub struct CloseMatch<'a> {
    /// Rule the expectation belongs to
    pub rule: Rule,
    /// The populated expectation mapping
    pub expect: &'a Fields,
}

/// The winning candidate, detached from the repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosestMatch {
    /// Rule of the closest expectation
    pub rule: Rule,
    /// The closest expectation mapping
    pub expectation: Fields,
}

/// Everything needed to explain a lookup miss.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StubNotFoundReport {
    /// Requested service
    pub service: String,
    /// Requested method
    pub method: String,
    /// Rendered request payload
    pub query: String,
    /// Best-ranked candidate, if any stub had a populated expectation
    pub closest: Option<ClosestMatch>,
}

impl StubNotFoundReport {
    /// Build the report for a failed scan.
    pub fn new(service: &str, method: &str, data: &Fields, candidates: &[CloseMatch<'_>]) -> Self {
        let query = render_fields(data);
        let closest = closest_match(&query, candidates).map(|c| ClosestMatch {
            rule: c.rule,
            expectation: c.expect.clone(),
        });

        Self {
            service: service.to_string(),
            method: method.to_string(),
            query,
            closest,
        }
    }
}

impl fmt::Display for StubNotFoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Can't find stub\n\nService: {}\n\nMethod: {}\n\nInput\n\n{}",
            self.service, self.method, self.query
        )?;
        if let Some(closest) = &self.closest {
            write!(
                f,
                "\n\nClosest Match\n\n{}:{}",
                closest.rule,
                render_fields(&closest.expectation)
            )?;
        }
        Ok(())
    }
}

/// Render a field map as one `key: value` line per entry.
pub fn render_fields(fields: &Fields) -> String {
    let mut out = String::from("{\n");
    for (key, value) in fields {
        out.push_str(&format!("\t{}: {}\n", key, value));
    }
    out.push('}');
    out
}

/// Loose containment: every character of `needle` appears in `haystack` in order.
pub fn fuzzy_match(needle: &str, haystack: &str) -> bool {
    let mut remaining = haystack.chars();
    needle.chars().all(|c| remaining.any(|h| h == c))
}

/// Fraction of the expectation's keys and values that loosely occur in the
/// rendered request, in `[0, 1]`.
pub fn rank_match(rendered: &str, expect: &Fields) -> f32 {
    if expect.is_empty() {
        return 0.0;
    }

    let mut occurrences = 0usize;
    for (key, value) in expect {
        if fuzzy_match(&format!("{}:", key), rendered) {
            occurrences += 1;
        }
        if fuzzy_match(&value.to_string(), rendered) {
            occurrences += 1;
        }
    }

    occurrences as f32 / (expect.len() * 2) as f32
}

/// Pick the strictly highest-ranked candidate; ties go to the earliest.
pub fn closest_match<'a>(rendered: &str, candidates: &[CloseMatch<'a>]) -> Option<CloseMatch<'a>> {
    let first = *candidates.first()?;

    let mut best = first;
    let mut best_rank = 0.0f32;
    for candidate in candidates {
        let rank = rank_match(rendered, candidate.expect);
        if rank > best_rank {
            best_rank = rank;
            best = *candidate;
        }
    }
    Some(best)
}
