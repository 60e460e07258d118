//! HTTP client for the Play publishing API (v3)

use crate::config::ClientConfig;
use crate::edits::{Edit, EditsApi};
use crate::error::{ApiError, ApiResult};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, Span};
use uuid::Uuid;

/// Request correlation ID header
const X_REQUEST_ID: &str = "X-Request-ID";

const API_PATH: &str = "androidpublisher/v3/applications";

const APK_MEDIA_TYPE: &str = "application/vnd.android.package-archive";
const BINARY_MEDIA_TYPE: &str = "application/octet-stream";
const IMAGE_MEDIA_TYPE: &str = "image/png";

#[derive(Deserialize)]
struct EditResource {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApkResource {
    version_code: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpansionUpload {
    expansion_file: ExpansionFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpansionFile {
    #[serde(default)]
    file_size: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppDetails {
    default_language: Option<String>,
}

#[derive(Deserialize)]
struct DeletedImages {
    #[serde(default)]
    deleted: Vec<Value>,
}

/// int64 fields come back as JSON strings
fn int64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Publishing API client
///
/// Requests are never retried: a failed call is reported to the caller,
/// which abandons the edit it belongs to.
#[derive(Clone)]
pub struct PlayClient {
    inner: Client,
    config: Arc<ClientConfig>,
}

impl PlayClient {
    /// Create a client with a validated configuration
    pub fn with_config(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("kiwix-publisher/", env!("CARGO_PKG_VERSION"))),
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .map_err(|_| ApiError::config("access token contains invalid characters"))?;
        bearer.set_sensitive(true);
        default_headers.insert(AUTHORIZATION, bearer);

        // Media uploads are bounded while connecting only
        let inner = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn edit_url(&self, edit: &Edit, suffix: &str) -> String {
        format!(
            "{}/{}/{}/edits/{}{}",
            self.base_url(),
            API_PATH,
            edit.package,
            edit.id,
            suffix
        )
    }

    fn upload_url(&self, edit: &Edit, suffix: &str) -> String {
        format!(
            "{}/upload/{}/{}/edits/{}{}?uploadType=media",
            self.base_url(),
            API_PATH,
            edit.package,
            edit.id,
            suffix
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());
        debug!(%method, url, "request");
        self.inner
            .request(method, url)
            .header(X_REQUEST_ID, request_id)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        self.send(self.json_request(method, url, body)).await
    }

    /// JSON call, bounded by the configured request timeout
    fn json_request(&self, method: Method, url: &str, body: Option<&Value>) -> RequestBuilder {
        let request = self.request(method, url).timeout(self.config.timeout);
        match body {
            Some(body) => request.json(body),
            None => request,
        }
    }

    /// Media upload call; no total timeout applies
    fn upload_request(
        &self,
        url: &str,
        body: impl Into<Body>,
        size: u64,
        media_type: &'static str,
    ) -> RequestBuilder {
        self.request(Method::POST, url)
            .header(CONTENT_TYPE, media_type)
            .header(CONTENT_LENGTH, size)
            .body(body)
    }

    /// Stream a file as the media body of an upload call
    async fn upload<T: DeserializeOwned>(
        &self,
        url: &str,
        file: &Path,
        media_type: &'static str,
    ) -> ApiResult<T> {
        let handle = tokio::fs::File::open(file).await?;
        let size = handle.metadata().await?.len();
        info!(file = %file.display(), size, "uploading");
        let request = self.upload_request(url, handle, size, media_type);
        self.send(request).await
    }

    /// Deserialize a success body; empty bodies read as `null`
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(serde_json::from_value(Value::Null)?);
            }
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = status.as_u16(), "API call failed");
            Err(ApiError::api_response(status.as_u16(), message))
        }
    }
}

impl EditsApi for PlayClient {
    #[instrument(skip(self), fields(request_id))]
    async fn insert_edit(&self, package: &str) -> ApiResult<Edit> {
        let url = format!("{}/{}/{}/edits", self.base_url(), API_PATH, package);
        let edit: EditResource = self
            .send_json(Method::POST, &url, Some(&json!({})))
            .await?;
        info!(edit = %edit.id, "edit opened");
        Ok(Edit::new(package, edit.id))
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn upload_apk(&self, edit: &Edit, apk: &Path) -> ApiResult<u64> {
        let url = self.upload_url(edit, "/apks");
        let uploaded: ApkResource = self.upload(&url, apk, APK_MEDIA_TYPE).await?;
        Ok(uploaded.version_code)
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn upload_expansion(
        &self,
        edit: &Edit,
        version_code: u64,
        file: &Path,
    ) -> ApiResult<u64> {
        let url = self.upload_url(edit, &format!("/apks/{}/expansionFiles/main", version_code));
        let uploaded: ExpansionUpload = self.upload(&url, file, BINARY_MEDIA_TYPE).await?;
        int64(&uploaded.expansion_file.file_size).ok_or(ApiError::MissingField("fileSize"))
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn update_track(&self, edit: &Edit, track: &str, version_codes: &[u64]) -> ApiResult<()> {
        let codes: Vec<String> = version_codes.iter().map(u64::to_string).collect();
        let body = json!({
            "track": track,
            "releases": [{ "versionCodes": codes, "status": "completed" }],
        });
        let url = self.edit_url(edit, &format!("/tracks/{}", track));
        let _: Value = self.send_json(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn commit_edit(&self, edit: &Edit) -> ApiResult<()> {
        let url = self.edit_url(edit, ":commit");
        let _: Value = self.send_json(Method::POST, &url, None).await?;
        info!(edit = %edit.id, "edit committed");
        Ok(())
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn delete_edit(&self, edit: &Edit) -> ApiResult<()> {
        let url = self.edit_url(edit, "");
        let _: Value = self.send_json(Method::DELETE, &url, None).await?;
        Ok(())
    }

    #[instrument(skip(self, edit, details), fields(request_id, edit = %edit.id))]
    async fn update_details(&self, edit: &Edit, details: &Map<String, Value>) -> ApiResult<()> {
        let url = self.edit_url(edit, "/details");
        let body = Value::Object(details.clone());
        let _: Value = self.send_json(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn default_language(&self, edit: &Edit) -> ApiResult<String> {
        let url = self.edit_url(edit, "/details");
        let details: AppDetails = self.send_json(Method::GET, &url, None).await?;
        details
            .default_language
            .ok_or(ApiError::MissingField("defaultLanguage"))
    }

    #[instrument(skip(self, edit, listing), fields(request_id, edit = %edit.id))]
    async fn update_listing(
        &self,
        edit: &Edit,
        language: &str,
        listing: &Map<String, Value>,
    ) -> ApiResult<()> {
        let url = self.edit_url(edit, &format!("/listings/{}", language));
        let mut body = listing.clone();
        body.insert("language".to_string(), Value::from(language));
        let _: Value = self
            .send_json(Method::PUT, &url, Some(&Value::Object(body)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn delete_images(
        &self,
        edit: &Edit,
        language: &str,
        image_type: &str,
    ) -> ApiResult<usize> {
        let url = self.edit_url(edit, &format!("/listings/{}/{}", language, image_type));
        let deleted: Option<DeletedImages> = self.send_json(Method::DELETE, &url, None).await?;
        Ok(deleted.map_or(0, |d| d.deleted.len()))
    }

    #[instrument(skip(self, edit), fields(request_id, edit = %edit.id))]
    async fn upload_image(
        &self,
        edit: &Edit,
        language: &str,
        image_type: &str,
        image: &Path,
    ) -> ApiResult<()> {
        let url = self.upload_url(edit, &format!("/listings/{}/{}", language, image_type));
        let _: Value = self.upload(&url, image, IMAGE_MEDIA_TYPE).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn client(server: &mockito::Server) -> PlayClient {
        PlayClient::with_config(ClientConfig::new(server.url(), "ya29.token")).unwrap()
    }

    #[tokio::test]
    async fn test_insert_edit_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/androidpublisher/v3/applications/org.demo.app/edits")
            .match_header("authorization", "Bearer ya29.token")
            .match_header("x-request-id", Matcher::Any)
            .with_body(r#"{"id": "e-42", "expiryTimeSeconds": "1700000000"}"#)
            .create_async()
            .await;

        let edit = client(&server).insert_edit("org.demo.app").await.unwrap();
        assert_eq!(edit, Edit::new("org.demo.app", "e-42"));
        mock.assert_async().await;
    }

    #[test]
    fn test_total_timeout_applies_to_json_calls_only() {
        let client = PlayClient::with_config(
            ClientConfig::new("http://localhost:1", "t").with_timeout(Duration::from_secs(7)),
        )
        .unwrap();
        let edit = Edit::new("org.demo.app", "e-1");

        let json_call = client
            .json_request(Method::PUT, &client.edit_url(&edit, "/tracks/alpha"), None)
            .build()
            .unwrap();
        assert_eq!(json_call.timeout(), Some(&Duration::from_secs(7)));

        let upload = client
            .upload_request(&client.upload_url(&edit, "/apks"), "APK", 3, APK_MEDIA_TYPE)
            .build()
            .unwrap();
        assert_eq!(upload.timeout(), None);
        assert_eq!(upload.headers()[CONTENT_LENGTH], "3");
    }

    #[tokio::test]
    async fn test_upload_outlives_json_timeout() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/upload/androidpublisher/v3/applications/org.demo.app/edits/e-1/apks",
            )
            .match_query(Matcher::Any)
            .with_body(r#"{"versionCode": 9}"#)
            .create_async()
            .await;
        let client = PlayClient::with_config(
            ClientConfig::new(server.url(), "t").with_timeout(Duration::from_nanos(1)),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        std::fs::write(&apk, vec![0u8; 256 * 1024]).unwrap();
        let edit = Edit::new("org.demo.app", "e-1");
        assert_eq!(client.upload_apk(&edit, &apk).await.unwrap(), 9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_uploads_stream_the_file() {
        let mut server = mockito::Server::new_async().await;
        let apk_mock = server
            .mock(
                "POST",
                "/upload/androidpublisher/v3/applications/org.demo.app/edits/e-1/apks",
            )
            .match_query(Matcher::UrlEncoded("uploadType".into(), "media".into()))
            .match_header("content-type", APK_MEDIA_TYPE)
            .match_body("APK-BYTES")
            .with_body(r#"{"versionCode": 5, "binary": {"sha1": "aa"}}"#)
            .create_async()
            .await;
        let obb_mock = server
            .mock(
                "POST",
                "/upload/androidpublisher/v3/applications/org.demo.app/edits/e-1/apks/5/expansionFiles/main",
            )
            .match_query(Matcher::Any)
            .match_body("ZIM")
            .with_body(r#"{"expansionFile": {"fileSize": "3"}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("org.demo.app-1.0.apk");
        std::fs::write(&apk, "APK-BYTES").unwrap();
        let zim = dir.path().join("demo.zim");
        std::fs::write(&zim, "ZIM").unwrap();

        let api = client(&server);
        let edit = Edit::new("org.demo.app", "e-1");
        assert_eq!(api.upload_apk(&edit, &apk).await.unwrap(), 5);
        assert_eq!(api.upload_expansion(&edit, 5, &zim).await.unwrap(), 3);
        apk_mock.assert_async().await;
        obb_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_track_and_commit() {
        let mut server = mockito::Server::new_async().await;
        let track = server
            .mock(
                "PUT",
                "/androidpublisher/v3/applications/org.demo.app/edits/e-1/tracks/alpha",
            )
            .match_body(Matcher::PartialJson(json!({
                "track": "alpha",
                "releases": [{"versionCodes": ["5"]}],
            })))
            .with_body(r#"{"track": "alpha"}"#)
            .create_async()
            .await;
        let commit = server
            .mock(
                "POST",
                "/androidpublisher/v3/applications/org.demo.app/edits/e-1:commit",
            )
            .with_body(r#"{"id": "e-1"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/androidpublisher/v3/applications/org.demo.app/edits/e-1")
            .with_status(204)
            .create_async()
            .await;

        let api = client(&server);
        let edit = Edit::new("org.demo.app", "e-1");
        api.update_track(&edit, "alpha", &[5]).await.unwrap();
        api.commit_edit(&edit).await.unwrap();
        api.delete_edit(&edit).await.unwrap();
        track.assert_async().await;
        commit.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_reports_expired_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/androidpublisher/v3/applications/org.demo.app/edits")
            .with_status(401)
            .with_body(r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#)
            .create_async()
            .await;

        let err = client(&server).insert_edit("org.demo.app").await.unwrap_err();
        assert!(matches!(err, ApiError::CredentialsExpired));
    }

    #[tokio::test]
    async fn test_listing_calls() {
        let mut server = mockito::Server::new_async().await;
        let base = "/androidpublisher/v3/applications/org.demo.app/edits/e-1";
        server
            .mock("GET", format!("{}/details", base).as_str())
            .with_body(r#"{"defaultLanguage": "en-US", "contactEmail": "a@b.c"}"#)
            .create_async()
            .await;
        let listing = server
            .mock("PUT", format!("{}/listings/fr-FR", base).as_str())
            .match_body(Matcher::Json(json!({"title": "Démo", "language": "fr-FR"})))
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("DELETE", format!("{}/listings/en-US/phoneScreenshots", base).as_str())
            .with_body(r#"{"deleted": [{"sha1": "a"}, {"sha1": "b"}]}"#)
            .create_async()
            .await;

        let api = client(&server);
        let edit = Edit::new("org.demo.app", "e-1");
        assert_eq!(api.default_language(&edit).await.unwrap(), "en-US");
        let mut texts = Map::new();
        texts.insert("title".into(), Value::from("Démo"));
        api.update_listing(&edit, "fr-FR", &texts).await.unwrap();
        assert_eq!(
            api.delete_images(&edit, "en-US", "phoneScreenshots").await.unwrap(),
            2
        );
        listing.assert_async().await;
    }

    #[test]
    fn test_int64_fields() {
        assert_eq!(int64(&json!("1024")), Some(1024));
        assert_eq!(int64(&json!(7)), Some(7));
        assert_eq!(int64(&Value::Null), None);
    }
}
