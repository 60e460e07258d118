//! Resolved custom apps
//!
//! Loading goes descriptor → overrides → validation → content resolution.
//! Nothing is written to disk before validation passes; resolution then
//! only downloads remote content next to the descriptor.

use crate::content::{is_remote, name_of, sanitize_name, ContentFetcher};
use crate::descriptor::{defaults, AppDescriptor, Override};
use kiwix_core::error::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Library name of embedded content
pub const EMBEDDED_CONTENT_NAME: &str = "libcontent.so";

/// A descriptor with every reference resolved and derived fields computed
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    pub descriptor: AppDescriptor,
    pub app_name: String,
    pub package: String,
    pub version_name: String,
    pub version_code: u64,
    pub content_version_code: u64,
    pub zim_file: PathBuf,
    pub zim_size: u64,
    /// File name the content gets inside the APK or on the device
    pub zim_name: String,
    pub embed_zim: bool,
    pub ic_launcher: PathBuf,
}

/// Read a descriptor from a path or URL
///
/// Returns it with the directory its relative references resolve against:
/// the descriptor's own directory, or the current one for remote sources.
pub async fn read_descriptor(
    source: &str,
    defaults: Map<String, Value>,
    fetcher: &ContentFetcher,
) -> Result<(AppDescriptor, PathBuf)> {
    if is_remote(source) {
        let json = fetcher.fetch_text(source).await?;
        return Ok((AppDescriptor::parse(&json, defaults)?, std::env::current_dir()?));
    }
    let path = std::path::absolute(source)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((AppDescriptor::load(&path, defaults)?, base))
}

impl App {
    /// Every field, derived ones included, for template substitution
    pub fn fields(&self) -> &Map<String, Value> {
        self.descriptor.fields()
    }

    /// Load, override, validate and resolve a descriptor
    ///
    /// `source` is a path or URL. Remote descriptors resolve their relative
    /// references against the current directory.
    pub async fn load(
        source: &str,
        overrides: &[Override],
        template_dir: &Path,
        fetcher: &ContentFetcher,
    ) -> Result<Self> {
        let (mut descriptor, base_dir) =
            read_descriptor(source, defaults(template_dir), fetcher).await?;

        descriptor.apply_overrides(overrides)?;
        descriptor.validate()?;
        Self::resolve(descriptor, &base_dir, fetcher).await
    }

    /// Resolve content and icon references of a validated descriptor
    pub async fn resolve(
        mut descriptor: AppDescriptor,
        base_dir: &Path,
        fetcher: &ContentFetcher,
    ) -> Result<Self> {
        let zim = fetcher.resolve(&descriptor.zim_file()?, base_dir).await?;
        let icon_ref = descriptor.text("ic_launcher").unwrap_or_default();
        let icon = fetcher.resolve(&icon_ref, base_dir).await?;

        let embed_zim = descriptor.embed_zim();
        let zim_name = if embed_zim {
            EMBEDDED_CONTENT_NAME.to_string()
        } else {
            sanitize_name(&name_of(&zim.path.to_string_lossy()))
        };
        let version_code = descriptor.version_code()?;
        let content_version_code = descriptor.content_version_code()?;

        descriptor.set("zim_file", zim.path.to_string_lossy().into_owned());
        descriptor.set("ic_launcher", icon.path.to_string_lossy().into_owned());
        descriptor.set("zim_size", zim.size.to_string());
        descriptor.set("zim_name", zim_name.clone());
        descriptor.set("content_version_code", content_version_code);
        descriptor.set("embed_zim", embed_zim);

        let app = Self {
            app_name: descriptor.app_name()?,
            package: descriptor.package()?,
            version_name: descriptor.version_name()?,
            version_code,
            content_version_code,
            zim_file: zim.path,
            zim_size: zim.size,
            zim_name,
            embed_zim,
            ic_launcher: icon.path,
            descriptor,
        };
        info!(
            package = %app.package,
            version = app.version_code,
            zim_size = app.zim_size,
            "descriptor resolved"
        );
        Ok(app)
    }
}
