//! Native dependency pipeline and Gradle packaging for Kiwix Android
//!
//! This crate provides the Android build side of the tools:
//! - Target architectures and their NDK toolchains
//! - The per-architecture native build (liblzma, libicu, libzim, libkiwix)
//! - Locale list generation
//! - Gradle APK assembly, cleanup and listing

pub mod arch;
pub mod config;
pub mod gradle;
pub mod manifest;
pub mod native;
pub mod toolchain;

pub use arch::Arch;
pub use config::BuildConfig;
pub use native::{NativeBuild, NativeReport, NativeStage, Progress};
