//! # Model-State Testkit
//!
//! Test utilities for the model-state crates.
//!
//! This crate provides:
//! - Test projects over in-memory and file-backed stores
//! - Property-based test generators using proptest
//! - A store wrapper that fails writes on demand, for crash scenarios
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use modelstate_testkit::prelude::*;
//!
//! let mut project = TestProject::memory();
//! let ids = project.add_chain(3);
//! project.save_model_state(false, false, "three entities").unwrap();
//! assert_eq!(project.tracker().len(), ids.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_tracing;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
