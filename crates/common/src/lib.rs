//! sitecheck Common Library
//!
//! Shared result model and error types for the sitecheck workspace. The
//! engine produces these values; report sinks only ever read them.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// sitecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default locale label for pages listed without one
pub const DEFAULT_LOCALE: &str = "US/EN";
