//! Core utilities for the Kiwix Android build tools
//!
//! This crate provides the shared functionality both build pipelines rely on:
//!
//! - **Error handling**: structured errors with codes, context and recovery suggestions
//! - **Process execution**: external tools behind the [`process::Runner`] seam
//! - **Environment overlays**: scoped, restorable compiler environments
//! - **Pipelines**: fixed-order stage selection and execution
//! - **Configuration**: TOML-based configuration with defaults
//! - **Trees**: copying, moving and scanning directory trees
//!
//! # Example
//!
//! ```rust
//! use kiwix_core::pipeline::{Selection, Stage};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Step { Configure, Make }
//!
//! impl Stage for Step {
//!     const ORDER: &'static [Self] = &[Step::Configure, Step::Make];
//!     fn name(self) -> &'static str {
//!         match self { Step::Configure => "configure", Step::Make => "make" }
//!     }
//!     fn description(self) -> &'static str { "" }
//! }
//!
//! let selection = Selection::<Step>::from_names(["--make"]).unwrap();
//! assert_eq!(selection.stages(), vec![Step::Make]);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod env_overlay;
pub mod error;
pub mod file_scanner;
pub mod pipeline;
pub mod process;
pub mod tree;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::env_overlay::{EnvOverlay, EnvStack};
    pub use crate::error::{exit_codes, Error, ErrorCode, Result, ResultExt};
    pub use crate::pipeline::{Pipeline, Selection, Stage, Step};
    pub use crate::process::{Invocation, Runner, SystemRunner};
}
