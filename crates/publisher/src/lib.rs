//! Publishing for Kiwix custom apps
//!
//! This crate talks to the Play publishing API and to CI result endpoints:
//!
//! - **Releases**: APK and companion content uploaded in one edit transaction
//! - **Listings**: store details, texts and images from the descriptor
//! - **Polling**: waiting for a test run to finish with a bounded number of attempts
//!
//! # Example
//!
//! ```rust,no_run
//! use kiwix_publisher::{ClientConfig, PlayClient, publish_release, Release};
//! use std::path::PathBuf;
//!
//! # async fn example() -> kiwix_publisher::ApiResult<()> {
//! let client = PlayClient::with_config(ClientConfig::new(
//!     "https://androidpublisher.googleapis.com",
//!     "ya29.token",
//! ))?;
//! let release = Release {
//!     package: "org.demo.app".into(),
//!     version_code: 5,
//!     apk: PathBuf::from("build/outputs/apk/org.demo.app-1.0.apk"),
//!     companion: Some(PathBuf::from("demo.zim")),
//!     track: "alpha".into(),
//! };
//! publish_release(&client, &release).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod edits;
pub mod error;
pub mod listing;
pub mod poll;
pub mod publish;

pub use client::PlayClient;
pub use config::ClientConfig;
pub use edits::{Edit, EditsApi};
pub use error::{ApiError, ApiResult};
pub use listing::{update_listing, ListingUpdate};
pub use poll::{await_run, HttpRunSource, PollSettings, RunSource, RunStatus};
pub use publish::{publish_release, within_edit, Published, Release, StoreTarget};
