//! Release uploads
//!
//! One release is one edit: APK, optional companion content, track
//! assignment, then commit. If any step fails the edit is deleted and the
//! error returned, so a partial upload never becomes visible.

use crate::edits::{Edit, EditsApi};
use crate::error::{ApiError, ApiResult};
use kiwix_custom::content::ContentFetcher;
use kiwix_custom::descriptor::AppDescriptor;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Descriptor section holding store data
pub const PLAY_STORE: &str = "play_store";

/// Target of an upload, as given by `--store <store>[:<track>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub store: String,
    pub track: Option<String>,
}

impl StoreTarget {
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let (store, track) = match raw.split_once(':') {
            Some((store, track)) => (store, Some(track.to_string()).filter(|t| !t.is_empty())),
            None => (raw, None),
        };
        if store != PLAY_STORE {
            return Err(ApiError::config(format!(
                "unknown store `{}` (expected `{}`)",
                store, PLAY_STORE
            )));
        }
        Ok(Self {
            store: store.to_string(),
            track,
        })
    }

    /// Track to release on, `default` when none was named
    pub fn track_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.track.as_deref().unwrap_or(default)
    }
}

/// Everything one release upload needs, resolved to local files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub package: String,
    pub version_code: u64,
    pub apk: PathBuf,
    /// Main expansion file, when the content is not embedded in the APK
    pub companion: Option<PathBuf>,
    pub track: String,
}

/// Default location of a built APK under `project_dir`
pub fn apk_path(project_dir: &Path, package: &str, version_name: &str) -> PathBuf {
    project_dir
        .join("build")
        .join("outputs")
        .join("apk")
        .join(format!("{}-{}.apk", package, version_name))
}

impl Release {
    /// Build a release from a validated descriptor
    ///
    /// Remote content is downloaded into `base_dir`; `apk` replaces the
    /// default `build/outputs/apk/<package>-<version_name>.apk` location.
    pub async fn from_descriptor(
        descriptor: &AppDescriptor,
        base_dir: &Path,
        project_dir: &Path,
        apk: Option<PathBuf>,
        track: &str,
        fetcher: &ContentFetcher,
    ) -> ApiResult<Self> {
        descriptor.validate()?;
        let package = descriptor.package()?;
        let version_name = descriptor.version_name()?;
        let apk = apk.unwrap_or_else(|| apk_path(project_dir, &package, &version_name));
        if !apk.is_file() {
            return Err(kiwix_core::Error::artifact_missing("build", &apk).into());
        }

        let companion = if descriptor.embed_zim() {
            None
        } else {
            let content = fetcher.resolve(&descriptor.zim_file()?, base_dir).await?;
            Some(content.path)
        };

        Ok(Self {
            package,
            version_code: descriptor.version_code()?,
            apk,
            companion,
            track: track.to_string(),
        })
    }
}

/// What a committed release contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub edit: String,
    pub version_code: u64,
    pub companion_size: Option<u64>,
}

/// Run `fill` inside a fresh edit on `package`
///
/// The edit is committed when `fill` succeeds. On any failure, the commit
/// included, the edit is deleted and the original error is returned.
pub async fn within_edit<A, T, F, Fut>(api: &A, package: &str, fill: F) -> ApiResult<T>
where
    A: EditsApi,
    F: FnOnce(Edit) -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let edit = api.insert_edit(package).await?;
    let outcome = match fill(edit.clone()).await {
        Ok(value) => api.commit_edit(&edit).await.map(|()| value),
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        warn!(edit = %edit.id, error = %e, "abandoning edit");
        if let Err(cleanup) = api.delete_edit(&edit).await {
            warn!(edit = %edit.id, error = %cleanup, "could not delete edit");
        }
    }
    outcome
}

/// Upload `release` in a single edit
pub async fn publish_release<A: EditsApi>(api: &A, release: &Release) -> ApiResult<Published> {
    info!(package = %release.package, track = %release.track, "publishing release");
    within_edit(api, &release.package, |edit| async move {
        let version_code = api.upload_apk(&edit, &release.apk).await?;
        info!(version_code, "APK uploaded");

        let companion_size = match &release.companion {
            Some(file) => {
                let size = api
                    .upload_expansion(&edit, release.version_code, file)
                    .await?;
                info!(size, "expansion file uploaded");
                Some(size)
            }
            None => None,
        };

        api.update_track(&edit, &release.track, &[version_code]).await?;
        Ok(Published {
            edit: edit.id,
            version_code,
            companion_size,
        })
    })
    .await
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory store recording every call

    use super::*;
    use serde_json::{Map, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeStore {
        pub calls: Mutex<Vec<String>>,
        /// Name of the call that fails, if any
        pub fail_on: Option<&'static str>,
        pub default_language: Option<String>,
    }

    impl FakeStore {
        pub fn failing(call: &'static str) -> Self {
            Self {
                fail_on: Some(call),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, name: &'static str, detail: String) -> ApiResult<()> {
            self.calls.lock().unwrap().push(detail);
            if self.fail_on == Some(name) {
                return Err(ApiError::api_response(500, format!("{} failed", name)));
            }
            Ok(())
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    impl EditsApi for FakeStore {
        async fn insert_edit(&self, package: &str) -> ApiResult<Edit> {
            self.record("insert", format!("insert {}", package))?;
            Ok(Edit::new(package, "edit-1"))
        }

        async fn upload_apk(&self, _edit: &Edit, apk: &Path) -> ApiResult<u64> {
            self.record("apk", format!("apk {}", file_name(apk)))?;
            Ok(5)
        }

        async fn upload_expansion(
            &self,
            _edit: &Edit,
            version_code: u64,
            file: &Path,
        ) -> ApiResult<u64> {
            self.record("expansion", format!("expansion {} {}", version_code, file_name(file)))?;
            Ok(std::fs::metadata(file)?.len())
        }

        async fn update_track(
            &self,
            _edit: &Edit,
            track: &str,
            version_codes: &[u64],
        ) -> ApiResult<()> {
            self.record("track", format!("track {} {:?}", track, version_codes))
        }

        async fn commit_edit(&self, edit: &Edit) -> ApiResult<()> {
            self.record("commit", format!("commit {}", edit.id))
        }

        async fn delete_edit(&self, edit: &Edit) -> ApiResult<()> {
            self.record("delete", format!("delete {}", edit.id))
        }

        async fn update_details(&self, _edit: &Edit, details: &Map<String, Value>) -> ApiResult<()> {
            let keys: Vec<&str> = details.keys().map(String::as_str).collect();
            self.record("details", format!("details {}", keys.join(",")))
        }

        async fn default_language(&self, _edit: &Edit) -> ApiResult<String> {
            self.record("language", "language".to_string())?;
            self.default_language
                .clone()
                .ok_or(ApiError::MissingField("defaultLanguage"))
        }

        async fn update_listing(
            &self,
            _edit: &Edit,
            language: &str,
            listing: &Map<String, Value>,
        ) -> ApiResult<()> {
            let keys: Vec<&str> = listing.keys().map(String::as_str).collect();
            self.record("listing", format!("listing {} {}", language, keys.join(",")))
        }

        async fn delete_images(
            &self,
            _edit: &Edit,
            language: &str,
            image_type: &str,
        ) -> ApiResult<usize> {
            self.record("deleteall", format!("deleteall {} {}", language, image_type))?;
            Ok(0)
        }

        async fn upload_image(
            &self,
            _edit: &Edit,
            language: &str,
            image_type: &str,
            image: &Path,
        ) -> ApiResult<()> {
            let content = std::fs::read_to_string(image).unwrap_or_default();
            self.record("image", format!("image {} {} {}", language, image_type, content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeStore;
    use super::*;
    use serde_json::Map;
    use std::time::Duration;

    const DEMO: &str = r#"{"app_name": "Demo", "package": "org.demo.app",
        "version_name": "1.0", "version_code": 5, "zim_file": "demo.zim"}"#;

    fn fetcher() -> ContentFetcher {
        ContentFetcher::new(Duration::from_secs(5)).unwrap().quiet()
    }

    /// Project with a built APK and the content next to the descriptor
    fn demo_project(dir: &Path) -> PathBuf {
        let apk = apk_path(dir, "org.demo.app", "1.0");
        std::fs::create_dir_all(apk.parent().unwrap()).unwrap();
        std::fs::write(&apk, "apk").unwrap();
        std::fs::write(dir.join("demo.zim"), "zim-content").unwrap();
        apk
    }

    async fn demo_release(dir: &Path, json: &str) -> ApiResult<Release> {
        let descriptor = AppDescriptor::parse(json, Map::new()).unwrap();
        Release::from_descriptor(&descriptor, dir, dir, None, "alpha", &fetcher()).await
    }

    #[test]
    fn test_store_target() {
        let target = StoreTarget::parse("play_store:beta").unwrap();
        assert_eq!(target.track_or("alpha"), "beta");
        assert_eq!(StoreTarget::parse("play_store").unwrap().track_or("alpha"), "alpha");
        assert_eq!(StoreTarget::parse("play_store:").unwrap().track, None);
        assert!(StoreTarget::parse("f_droid:beta").is_err());
    }

    #[tokio::test]
    async fn test_release_with_companion_content() {
        let dir = tempfile::tempdir().unwrap();
        demo_project(dir.path());

        let release = demo_release(dir.path(), DEMO).await.unwrap();
        assert_eq!(release.apk.file_name().unwrap(), "org.demo.app-1.0.apk");
        assert_eq!(release.companion, Some(dir.path().join("demo.zim")));

        let store = FakeStore::default();
        let published = publish_release(&store, &release).await.unwrap();
        assert_eq!(
            store.calls(),
            vec![
                "insert org.demo.app",
                "apk org.demo.app-1.0.apk",
                "expansion 5 demo.zim",
                "track alpha [5]",
                "commit edit-1",
            ]
        );
        assert_eq!(published.version_code, 5);
        assert_eq!(published.companion_size, Some(11));
    }

    #[tokio::test]
    async fn test_embedded_content_has_no_companion() {
        let dir = tempfile::tempdir().unwrap();
        demo_project(dir.path());
        let json = DEMO.replace("\"zim_file\"", "\"embed_zim\": true, \"zim_file\"");

        let release = demo_release(dir.path(), &json).await.unwrap();
        assert_eq!(release.companion, None);

        let store = FakeStore::default();
        publish_release(&store, &release).await.unwrap();
        assert!(!store.calls().iter().any(|c| c.starts_with("expansion")));
    }

    #[tokio::test]
    async fn test_failed_upload_is_never_committed() {
        let dir = tempfile::tempdir().unwrap();
        demo_project(dir.path());
        let release = demo_release(dir.path(), DEMO).await.unwrap();

        for step in ["apk", "expansion", "track", "commit"] {
            let store = FakeStore::failing(step);
            let err = publish_release(&store, &release).await.unwrap_err();
            assert!(matches!(err, ApiError::ApiResponse { status: 500, .. }));

            let calls = store.calls();
            assert_eq!(calls.last().map(String::as_str), Some("delete edit-1"));
            let committed = calls.iter().filter(|c| c.starts_with("commit")).count();
            assert_eq!(committed, usize::from(step == "commit"));
        }
    }

    #[tokio::test]
    async fn test_missing_apk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo.zim"), "zim").unwrap();
        let err = demo_release(dir.path(), DEMO).await.unwrap_err();
        assert!(
            matches!(err, ApiError::Build(ref e) if e.code == kiwix_core::ErrorCode::ArtifactMissing)
        );
    }
}
