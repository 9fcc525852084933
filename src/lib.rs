//! Stub Matcher
//!
//! A stub-matching engine for request/response mocking. Callers register
//! expected inputs paired with canned outputs per service method; lookups
//! return the output of the first registered stub that accepts the request
//! payload, or explain which stub came closest.
//!
//! # Features
//!
//! - **Exact Matching**: `equals` compares the whole payload
//! - **Partial Matching**: `contains` requires a subset of fields
//! - **Pattern Matching**: `matches` runs a regex against each field
//! - **Closest-Match Diagnostics**: misses name the best-ranked candidate
//! - **Directory Loading**: JSON or YAML stub files, one stub per file
//!
//! # Example Stub Definition
//!
//! ```json
//! {
//!   "service": "Greeter",
//!   "method": "SayHello",
//!   "input": { "equals": { "name": "tokopedia" } },
//!   "output": { "data": { "message": "Hello Tokopedia" } }
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod loader;
pub mod matcher;
pub mod storage;
pub mod value;

pub use config::{EngineConfig, Expectation, LookupQuery, Output, Stub};
pub use engine::StubEngine;
pub use storage::{LookupError, StubRepository};
pub use value::{FieldValue, Fields};
