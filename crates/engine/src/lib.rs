//! sitecheck engine
//!
//! Descriptor-driven validation of UI components on live pages:
//! - Component descriptors say where a component lives and which fields to read
//! - The orchestrator extracts them through a [`DomAccessor`], running any
//!   interaction a component needs first
//! - The matcher compares extraction records with expectation records
//! - Harvested links are checked by a bounded, rate-limited worker pool
//! - Verdicts fold into page and run results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PageRunner (Rust)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageLoader::open(url) -> DomAccessor                       │
//! │    ├── PlaywrightBrowser  (live browser, node driver)       │
//! │    └── StaticLoader       (HTTP fetch + HTML snapshot)      │
//! │  Orchestrator::run_all(descriptors) -> ExtractionRecord     │
//! │  match_component(record, expectation) -> ComponentVerdict   │
//! │  LinkValidator::validate(links) -> LinkVerdict              │
//! │  aggregate_page / aggregate_run -> PageResult / RunResult   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregate;
pub mod descriptor;
pub mod dom;
pub mod error;
pub mod expectation;
pub mod extract;
pub mod links;
pub mod matcher;
pub mod orchestrator;
pub mod pattern;
pub mod playwright;
pub mod registry;
pub mod runner;
pub mod snapshot;

pub use descriptor::{ComponentDescriptor, FieldDescriptor, Interaction, Read, RepeatDescriptor, SelectorSpec};
pub use dom::{DomAccessor, DomAction, PageLoader, Scope};
pub use error::{DomError, DomResult};
pub use expectation::{Expect, ExpectationCatalog, ExpectationRecord, Predicate};
pub use links::{LinkTransport, LinkValidator, LinkValidatorConfig, ReqwestTransport};
pub use matcher::{match_component, MatchOptions};
pub use orchestrator::Orchestrator;
pub use playwright::{Browser, PlaywrightBrowser, PlaywrightConfig};
pub use registry::ComponentRegistry;
pub use runner::{write_results, PageCheck, PageRunner, RunnerConfig};
pub use snapshot::{HtmlSnapshot, StaticLoader};
