//! Store listing updates
//!
//! The `play_store` section of a descriptor holds `details`, `listings`
//! keyed by language and `images` keyed by image type. All of it goes into
//! one edit.

use crate::edits::{Edit, EditsApi};
use crate::error::{ApiError, ApiResult};
use crate::publish::{within_edit, PLAY_STORE};
use kiwix_custom::content::{is_remote, ContentFetcher};
use kiwix_custom::descriptor::AppDescriptor;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// App details fields the API accepts
pub const DETAILS_FIELDS: &[&str] = &[
    "contactEmail",
    "contactPhone",
    "contactWebsite",
    "defaultLanguage",
];

/// Listing fields the API accepts
pub const LISTING_FIELDS: &[&str] = &["fullDescription", "shortDescription", "title", "video"];

/// Counts of what a listing update changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingUpdate {
    pub details: bool,
    pub languages: usize,
    pub images: usize,
}

/// Keep the non-null `allowed` entries of `source`
fn pick(source: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    source
        .iter()
        .filter(|(k, v)| allowed.contains(&k.as_str()) && !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn object<'a>(section: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    section.get(key).and_then(Value::as_object)
}

/// Push the store listing of `descriptor` in a single edit
///
/// Relative image paths resolve against `base_dir`; remote images are
/// staged in a temporary directory removed afterwards.
pub async fn update_listing<A: EditsApi>(
    api: &A,
    descriptor: &AppDescriptor,
    base_dir: &Path,
    fetcher: &ContentFetcher,
) -> ApiResult<ListingUpdate> {
    let package = descriptor.package()?;
    let section = descriptor
        .store_section(PLAY_STORE)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::config(format!("descriptor has no `{}` data", PLAY_STORE)))?;
    let staging = tempfile::tempdir()?;

    info!(package = %package, "updating store listing");
    within_edit(api, &package, |edit| async move {
        let mut update = ListingUpdate::default();
        let mut default_language = None;

        if let Some(details) = object(section, "details") {
            let body = pick(details, DETAILS_FIELDS);
            api.update_details(&edit, &body).await?;
            default_language = body
                .get("defaultLanguage")
                .and_then(Value::as_str)
                .map(str::to_string);
            update.details = true;
            debug!(fields = body.len(), "details updated");
        }

        if let Some(listings) = object(section, "listings") {
            for (language, texts) in listings {
                let texts = texts.as_object().cloned().unwrap_or_default();
                let body = pick(&texts, LISTING_FIELDS);
                api.update_listing(&edit, language, &body).await?;
                update.languages += 1;
                debug!(language = %language, fields = body.len(), "listing updated");
            }
        }

        if let Some(images) = object(section, "images") {
            update.images = upload_images(
                api,
                &edit,
                images,
                default_language,
                base_dir,
                staging.path(),
                fetcher,
            )
            .await?;
        }
        Ok(update)
    })
    .await
}

async fn upload_images<A: EditsApi>(
    api: &A,
    edit: &Edit,
    images: &Map<String, Value>,
    default_language: Option<String>,
    base_dir: &Path,
    staging: &Path,
    fetcher: &ContentFetcher,
) -> ApiResult<usize> {
    let language = match default_language {
        Some(language) => language,
        None => api.default_language(edit).await?,
    };

    let mut uploaded = 0;
    for (image_type, refs) in images {
        let refs: Vec<&str> = refs
            .as_array()
            .map(|refs| refs.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if refs.is_empty() {
            continue;
        }

        let deleted = api.delete_images(edit, &language, image_type).await?;
        debug!(image_type = %image_type, deleted, "images cleared");
        for reference in refs {
            let dir = if is_remote(reference) { staging } else { base_dir };
            let image = fetcher.resolve(reference, dir).await?;
            api.upload_image(edit, &language, image_type, &image.path)
                .await?;
            uploaded += 1;
        }
    }
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::fake::FakeStore;
    use std::time::Duration;

    fn fetcher() -> ContentFetcher {
        ContentFetcher::new(Duration::from_secs(5)).unwrap().quiet()
    }

    fn descriptor(play_store: &str) -> AppDescriptor {
        let json = format!(
            r#"{{"app_name": "Demo", "package": "org.demo.app", "version_name": "1.0",
                "version_code": 5, "zim_file": "demo.zim", "play_store": {}}}"#,
            play_store
        );
        AppDescriptor::parse(&json, Map::new()).unwrap()
    }

    #[tokio::test]
    async fn test_full_listing_in_one_edit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shot1.png"), "one").unwrap();
        std::fs::write(dir.path().join("shot2.png"), "two").unwrap();
        let descriptor = descriptor(
            r#"{
                "details": {"contactEmail": "a@b.c", "contactPhone": null,
                            "defaultLanguage": "en-US", "unknown": 1},
                "listings": {"en-US": {"title": "Demo", "fullDescription": "Long",
                                       "recentChanges": "x"}},
                "images": {"phoneScreenshots": ["shot1.png", "shot2.png"], "tvBanner": []}
            }"#,
        );

        let store = FakeStore::default();
        let update = update_listing(&store, &descriptor, dir.path(), &fetcher())
            .await
            .unwrap();
        assert_eq!(
            update,
            ListingUpdate {
                details: true,
                languages: 1,
                images: 2
            }
        );
        assert_eq!(
            store.calls(),
            vec![
                "insert org.demo.app",
                "details contactEmail,defaultLanguage",
                "listing en-US title,fullDescription",
                "deleteall en-US phoneScreenshots",
                "image en-US phoneScreenshots one",
                "image en-US phoneScreenshots two",
                "commit edit-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_images_use_store_default_language() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("icon.png"), "icon").unwrap();
        let descriptor = descriptor(r#"{"images": {"icon": ["icon.png"]}}"#);

        let store = FakeStore {
            default_language: Some("fr-FR".to_string()),
            ..FakeStore::default()
        };
        update_listing(&store, &descriptor, dir.path(), &fetcher())
            .await
            .unwrap();
        let calls = store.calls();
        assert_eq!(calls[1], "language");
        assert_eq!(calls[3], "image fr-FR icon icon");
    }

    #[tokio::test]
    async fn test_missing_image_abandons_edit() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor(
            r#"{"details": {"defaultLanguage": "en-US"}, "images": {"icon": ["gone.png"]}}"#,
        );

        let store = FakeStore::default();
        let err = update_listing(&store, &descriptor, dir.path(), &fetcher())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Build(_)));
        let calls = store.calls();
        assert_eq!(calls.last().map(String::as_str), Some("delete edit-1"));
        assert!(!calls.iter().any(|c| c.starts_with("commit")));
    }

    #[tokio::test]
    async fn test_no_store_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::default();
        let err = update_listing(&store, &descriptor("{}"), dir.path(), &fetcher())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
        assert!(store.calls().is_empty());
    }
}
