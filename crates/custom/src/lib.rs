//! Custom Kiwix app generation
//!
//! Turns an app descriptor (JSON) and the Kiwix Android template into a
//! branded, optionally content-embedding application:
//! - Descriptor parsing, overrides and validation
//! - Remote content and icon resolution
//! - Tree rewrites: branding, manifest, package rename
//! - Launcher icons and the embedded content archive
//! - The staged generation pipeline

pub mod app;
pub mod content;
pub mod descriptor;
pub mod embed;
pub mod icons;
pub mod rename;
pub mod rewrite;
pub mod stages;
pub mod worktree;

pub use app::{read_descriptor, App};
pub use content::ContentFetcher;
pub use descriptor::{AppDescriptor, Override};
pub use stages::{CustomBuild, CustomStage};
pub use worktree::WorkTree;
