//! Terminal helpers for the Kiwix Android build tools
//!
//! Provides shared CLI functionality:
//! - Status and step messages
//! - Progress bars for transfers
//! - Size and duration formatting

#![warn(missing_docs)]

pub mod output;
pub mod progress;
