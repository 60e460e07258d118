//! Edit transactions
//!
//! Every change to a store entry happens inside an edit: it is opened,
//! filled, and only becomes visible once committed. An edit that is never
//! committed expires on its own; deleting it just releases it early.

use crate::error::ApiResult;
use serde_json::{Map, Value};
use std::path::Path;

/// An open edit on one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub package: String,
    pub id: String,
}

impl Edit {
    pub fn new(package: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            id: id.into(),
        }
    }
}

/// Operations of the publishing API used by the release tools
#[allow(async_fn_in_trait)]
pub trait EditsApi {
    /// Open a new edit for `package`
    async fn insert_edit(&self, package: &str) -> ApiResult<Edit>;

    /// Upload an APK; returns the version code the store read from it
    async fn upload_apk(&self, edit: &Edit, apk: &Path) -> ApiResult<u64>;

    /// Upload the main expansion file of `version_code`; returns its stored size
    async fn upload_expansion(&self, edit: &Edit, version_code: u64, file: &Path)
    -> ApiResult<u64>;

    /// Release `version_codes` on `track`
    async fn update_track(&self, edit: &Edit, track: &str, version_codes: &[u64]) -> ApiResult<()>;

    async fn commit_edit(&self, edit: &Edit) -> ApiResult<()>;

    async fn delete_edit(&self, edit: &Edit) -> ApiResult<()>;

    /// Replace the app details (contact data, default language)
    async fn update_details(&self, edit: &Edit, details: &Map<String, Value>) -> ApiResult<()>;

    /// Default listing language currently set on the store entry
    async fn default_language(&self, edit: &Edit) -> ApiResult<String>;

    /// Replace the listing texts of one language
    async fn update_listing(
        &self,
        edit: &Edit,
        language: &str,
        listing: &Map<String, Value>,
    ) -> ApiResult<()>;

    /// Delete every image of a type; returns how many were removed
    async fn delete_images(&self, edit: &Edit, language: &str, image_type: &str)
    -> ApiResult<usize>;

    async fn upload_image(
        &self,
        edit: &Edit,
        language: &str,
        image_type: &str,
        image: &Path,
    ) -> ApiResult<()>;
}
