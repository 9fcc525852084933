//! In-memory stub repository.
//!
//! Stubs are kept per service and method in registration order; the first
//! stub whose expectation accepts a request wins. All access goes through a
//! single lock held for the whole operation.

use crate::config::{LookupQuery, Output, Stub};
use crate::diagnostics::{CloseMatch, StubNotFoundReport};
use crate::matcher::{CompiledPatterns, Rule};
use crate::value::Fields;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;

/// Service name to method name to stubs in registration order.
pub type StubMapping = BTreeMap<String, BTreeMap<String, Vec<Stub>>>;

/// A registered stub with its `matches` patterns compiled.
#[derive(Debug)]
struct StoredStub {
    stub: Stub,
    patterns: CompiledPatterns,
}

impl StoredStub {
    fn new(stub: Stub) -> Self {
        let patterns = CompiledPatterns::new(&stub.input.matches);
        Self { stub, patterns }
    }

    fn accepts(&self, rule: Rule, expect: &Fields, data: &Fields) -> bool {
        match rule {
            Rule::Matches => self.patterns.is_match(data),
            _ => rule.evaluate(expect, data),
        }
    }
}

type StoredMapping = BTreeMap<String, BTreeMap<String, Vec<StoredStub>>>;

/// Why a lookup did not produce an output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// No stub was ever registered for the service
    #[error("Can't find stub for Service: {service}")]
    ServiceNotFound { service: String },

    /// The service has stubs, but none for this method
    #[error("Can't find stub for Service: {service} and Method: {method}")]
    MethodNotFound { service: String, method: String },

    /// The method's stub list exists but holds no stubs
    #[error("Stub for Service: {service} and Method: {method} is empty")]
    EmptyStubSet { service: String, method: String },

    /// Stubs exist but none accepted the request
    #[error("{0}")]
    StubNotFound(Box<StubNotFoundReport>),
}

/// Registry of stubs shared by every caller.
#[derive(Debug, Default)]
pub struct StubRepository {
    stubs: RwLock<StoredMapping>,
}

impl StubRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoredMapping> {
        self.stubs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoredMapping> {
        self.stubs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a stub to its service/method list. Duplicates are kept.
    pub fn register(&self, stub: Stub) {
        let stored = StoredStub::new(stub);
        let mut stubs = self.write();
        let stub = &stored.stub;
        debug!(service = %stub.service, method = %stub.method, "Registering stub");
        stubs
            .entry(stub.service.clone())
            .or_default()
            .entry(stub.method.clone())
            .or_default()
            .push(stored);
    }

    /// Find the output of the first stub accepting the query.
    pub fn lookup(&self, query: &LookupQuery) -> Result<Output, LookupError> {
        let stubs = self.read();

        let methods = stubs
            .get(&query.service)
            .ok_or_else(|| LookupError::ServiceNotFound {
                service: query.service.clone(),
            })?;

        let candidates = methods
            .get(&query.method)
            .ok_or_else(|| LookupError::MethodNotFound {
                service: query.service.clone(),
                method: query.method.clone(),
            })?;

        if candidates.is_empty() {
            return Err(LookupError::EmptyStubSet {
                service: query.service.clone(),
                method: query.method.clone(),
            });
        }

        let mut close_matches = Vec::new();
        for (index, stored) in candidates.iter().enumerate() {
            for (rule, expect) in stored.stub.input.modes() {
                close_matches.push(CloseMatch { rule, expect });
                if stored.accepts(rule, expect, &query.data) {
                    debug!(
                        service = %query.service,
                        method = %query.method,
                        index,
                        rule = %rule,
                        "Stub matched"
                    );
                    return Ok(stored.stub.output.clone());
                }
            }
        }

        Err(LookupError::StubNotFound(Box::new(StubNotFoundReport::new(
            &query.service,
            &query.method,
            &query.data,
            &close_matches,
        ))))
    }

    /// Copy of the whole repository.
    pub fn snapshot(&self) -> StubMapping {
        self.read()
            .iter()
            .map(|(service, methods)| {
                let methods = methods
                    .iter()
                    .map(|(method, stubs)| {
                        (method.clone(), stubs.iter().map(|s| s.stub.clone()).collect())
                    })
                    .collect();
                (service.clone(), methods)
            })
            .collect()
    }

    /// Drop every registered stub.
    pub fn clear(&self) {
        let mut stubs = self.write();
        stubs.clear();
        debug!("Stub repository cleared");
    }

    /// Number of registered stubs across all services and methods.
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .flat_map(|methods| methods.values())
            .map(Vec::len)
            .sum()
    }

    /// Whether no stub is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Expectation;
    use crate::value::{FieldValue, Fields};
    use std::sync::Arc;

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn output(tag: &str) -> Output {
        Output::data(serde_json::json!({ "x": tag }))
    }

    #[test]
    fn test_register_then_lookup_round_trip() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[("a", 1.into())])),
            Output::data(serde_json::json!({"x": "y"})),
        ));

        let query = LookupQuery::new("Svc", "Get", fields(&[("a", 1.into())]));
        let out = repo.lookup(&query).unwrap();
        assert_eq!(out.data, serde_json::json!({"x": "y"}));
    }

    #[test]
    fn test_equals_rejects_extra_and_missing_keys() {
        let repo = StubRepository::new();
        let expect = fields(&[("a", 1.into()), ("b", "two".into())]);
        repo.register(Stub::new("Svc", "Get", Expectation::equals(expect.clone()), output("eq")));

        assert!(repo.lookup(&LookupQuery::new("Svc", "Get", expect)).is_ok());

        let missing = LookupQuery::new("Svc", "Get", fields(&[("a", 1.into())]));
        assert!(matches!(
            repo.lookup(&missing),
            Err(LookupError::StubNotFound(_))
        ));

        let extra = LookupQuery::new(
            "Svc",
            "Get",
            fields(&[("a", 1.into()), ("b", "two".into()), ("c", 3.into())]),
        );
        assert!(matches!(repo.lookup(&extra), Err(LookupError::StubNotFound(_))));
    }

    #[test]
    fn test_contains_ignores_extra_keys() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::contains(fields(&[("id", 5.into())])),
            output("contains"),
        ));

        let superset = LookupQuery::new(
            "Svc",
            "Get",
            fields(&[("id", 5.into()), ("verbose", true.into())]),
        );
        assert_eq!(repo.lookup(&superset).unwrap(), output("contains"));

        let wrong = LookupQuery::new("Svc", "Get", fields(&[("id", 6.into())]));
        assert!(repo.lookup(&wrong).is_err());

        let absent = LookupQuery::new("Svc", "Get", fields(&[("verbose", true.into())]));
        assert!(repo.lookup(&absent).is_err());
    }

    #[test]
    fn test_matches_pattern() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::matches(fields(&[("name", "^J.*".into())])),
            output("regex"),
        ));

        let john = LookupQuery::new("Svc", "Get", fields(&[("name", "John".into())]));
        assert_eq!(repo.lookup(&john).unwrap(), output("regex"));

        let amy = LookupQuery::new("Svc", "Get", fields(&[("name", "Amy".into())]));
        assert!(matches!(repo.lookup(&amy), Err(LookupError::StubNotFound(_))));
    }

    #[test]
    fn test_first_registered_wins() {
        let repo = StubRepository::new();
        let expect = fields(&[("a", 1.into())]);
        repo.register(Stub::new("Svc", "Get", Expectation::contains(expect.clone()), output("first")));
        repo.register(Stub::new("Svc", "Get", Expectation::equals(expect.clone()), output("second")));

        let query = LookupQuery::new("Svc", "Get", expect);
        assert_eq!(repo.lookup(&query).unwrap(), output("first"));
    }

    #[test]
    fn test_multi_mode_stub_is_or_matched() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation {
                equals: fields(&[("a", 1.into())]),
                contains: Fields::new(),
                matches: fields(&[("name", "^J".into())]),
            },
            output("multi"),
        ));

        // equals fails, matches succeeds
        let query = LookupQuery::new(
            "Svc",
            "Get",
            fields(&[("a", 1.into()), ("name", "Jane".into())]),
        );
        assert_eq!(repo.lookup(&query).unwrap(), output("multi"));
    }

    #[test]
    fn test_bad_pattern_fails_only_its_stub() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::matches(fields(&[("name", "([".into())])),
            output("broken-regex"),
        ));
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::matches(fields(&[(
                "name",
                FieldValue::Unsupported(serde_json::json!({"x": 1})),
            )])),
            output("object-pattern"),
        ));
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::matches(fields(&[("tags", "^a".into())])),
            output("list-value"),
        ));
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[
                ("name", "John".into()),
                ("tags", FieldValue::Unsupported(serde_json::json!(["a", "b"]))),
            ])),
            output("fallback"),
        ));

        let query = LookupQuery::new(
            "Svc",
            "Get",
            fields(&[
                ("name", "John".into()),
                ("tags", FieldValue::Unsupported(serde_json::json!(["a", "b"]))),
            ]),
        );
        assert_eq!(repo.lookup(&query).unwrap(), output("fallback"));
    }

    #[test]
    fn test_structural_misses() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Create",
            Expectation::equals(fields(&[("a", 1.into())])),
            output("create"),
        ));

        let err = repo
            .lookup(&LookupQuery::new("Other", "Create", Fields::new()))
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::ServiceNotFound {
                service: "Other".to_string()
            }
        );

        let err = repo
            .lookup(&LookupQuery::new("Svc", "Get", Fields::new()))
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::MethodNotFound {
                service: "Svc".to_string(),
                method: "Get".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "Can't find stub for Service: Svc and Method: Get"
        );
    }

    #[test]
    fn test_empty_stub_set() {
        let repo = StubRepository::new();
        repo.write()
            .entry("Svc".to_string())
            .or_default()
            .insert("Get".to_string(), Vec::new());

        let err = repo
            .lookup(&LookupQuery::new("Svc", "Get", Fields::new()))
            .unwrap_err();
        assert!(matches!(err, LookupError::EmptyStubSet { .. }));
    }

    #[test]
    fn test_not_found_names_first_candidate_on_tie() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[("qqq", "zzz".into())])),
            output("one"),
        ));
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::contains(fields(&[("www", "yyy".into())])),
            output("two"),
        ));

        let query = LookupQuery::new("Svc", "Get", fields(&[("name", "John".into())]));
        let err = repo.lookup(&query).unwrap_err();
        let LookupError::StubNotFound(report) = err else {
            panic!("Expected StubNotFound");
        };
        let closest = report.closest.as_ref().unwrap();
        assert_eq!(closest.rule, Rule::Equals);
        assert_eq!(closest.expectation, fields(&[("qqq", "zzz".into())]));
        assert!(report.to_string().contains("Closest Match"));
    }

    #[test]
    fn test_not_found_names_best_candidate() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[("qqq", "zzz".into())])),
            output("one"),
        ));
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::matches(fields(&[("name", "^Jo$".into())])),
            output("two"),
        ));

        let query = LookupQuery::new("Svc", "Get", fields(&[("name", "John".into())]));
        let LookupError::StubNotFound(report) = repo.lookup(&query).unwrap_err() else {
            panic!("Expected StubNotFound");
        };
        assert_eq!(report.closest.as_ref().unwrap().rule, Rule::Matches);
    }

    #[test]
    fn test_not_found_without_candidates() {
        let repo = StubRepository::new();
        repo.register(Stub::new("Svc", "Get", Expectation::default(), output("blank")));

        let query = LookupQuery::new("Svc", "Get", fields(&[("a", 1.into())]));
        let LookupError::StubNotFound(report) = repo.lookup(&query).unwrap_err() else {
            panic!("Expected StubNotFound");
        };
        assert!(report.closest.is_none());
        assert!(!report.to_string().contains("Closest Match"));
    }

    #[test]
    fn test_duplicates_kept_and_clear_empties() {
        let repo = StubRepository::new();
        let stub = Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[("a", 1.into())])),
            output("dup"),
        );
        repo.register(stub.clone());
        repo.register(stub.clone());

        let snapshot = repo.snapshot();
        assert_eq!(snapshot["Svc"]["Get"], vec![stub.clone(), stub]);
        assert_eq!(repo.len(), 2);

        repo.clear();
        assert!(repo.snapshot().is_empty());
        assert!(repo.is_empty());
    }

    #[test]
    fn test_lookup_does_not_mutate() {
        let repo = StubRepository::new();
        repo.register(Stub::new(
            "Svc",
            "Get",
            Expectation::equals(fields(&[("a", 1.into())])),
            output("a"),
        ));
        let before = repo.snapshot();

        let _ = repo.lookup(&LookupQuery::new("Svc", "Get", fields(&[("a", 1.into())])));
        let _ = repo.lookup(&LookupQuery::new("Svc", "Get", fields(&[("a", 2.into())])));

        assert_eq!(repo.snapshot(), before);
    }

    #[test]
    fn test_concurrent_register_and_lookup() {
        let repo = Arc::new(StubRepository::new());

        std::thread::scope(|scope| {
            for worker in 0..4i64 {
                let repo = Arc::clone(&repo);
                scope.spawn(move || {
                    for i in 0..50i64 {
                        let key = worker * 100 + i;
                        repo.register(Stub::new(
                            "Svc",
                            "Get",
                            Expectation::equals(fields(&[("k", key.into())])),
                            Output::data(serde_json::json!(key)),
                        ));
                        let query = LookupQuery::new("Svc", "Get", fields(&[("k", key.into())]));
                        assert_eq!(repo.lookup(&query).unwrap().data, serde_json::json!(key));
                    }
                });
            }
        });

        assert_eq!(repo.len(), 200);
    }
}
