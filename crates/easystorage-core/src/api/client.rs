//! API client for the media-storage backend.
//!
//! Every JSON operation goes through the same pipeline: JSON content type,
//! caller headers, bearer token when logged in, then status handling. A 401
//! logs the session out before the body is looked at.

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::config::Config;

use super::ApiError;

/// Field names the backend may use for the OAuth redirect target
const REDIRECT_FIELDS: [&str; 4] = ["url", "auth_url", "authorization_url", "redirect_url"];

/// Response of the OAuth start endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct AuthStart(pub Value);

impl AuthStart {
    /// Where to send the user to continue the Google sign-in
    pub fn redirect_url(&self) -> Option<&str> {
        if let Some(url) = self.0.as_str() {
            return Some(url);
        }
        REDIRECT_FIELDS
            .iter()
            .find_map(|field| self.0.get(field).and_then(Value::as_str))
    }
}

/// Raw media bytes with the content type the backend reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContent {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Extra per-call input for [`ApiClient::request_json`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: header::HeaderMap,
    pub body: Option<Value>,
}

/// API client for the storage backend.
/// Clone is cheap - reqwest::Client and SessionStore share their state.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Create a client for the configured base URL
    pub fn new(config: &Config, session: SessionStore) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        let session = self.session.session();
        if session.is_authenticated() {
            if let Some(token) = session.token() {
                let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| {
                        ApiError::InvalidHeader("token is not a valid header value".to_string())
                    })?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
        }
        Ok(headers)
    }

    /// Start a JSON request: content type set, caller headers still to come.
    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(endpoint))
            .header(header::CONTENT_TYPE, "application/json")
    }

    /// Add the bearer token, send, and run the status/JSON pipeline.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        // Applied last so the session's token wins over caller headers
        let request = request.headers(self.auth_headers()?).build()?;
        debug!(method = %request.method(), path = request.url().path(), "API request");

        let response = self.client.execute(request).await?;
        let response = self.check_response(response).await?;

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// 401 logs out without reading the body; other failures use `detail`.
    async fn check_response(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected the session, logging out");
            if let Err(e) = self.session.logout() {
                warn!(error = %e, "Failed to clear stored session");
            }
            return Err(ApiError::ExpiredSession);
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let err = ApiError::from_status(status, &body);
            debug!(status = status.as_u16(), error = %err, "API request failed");
            return Err(err);
        }
        Ok(response)
    }

    /// Run an arbitrary JSON call through the common pipeline.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let mut request = self.request(method, endpoint).headers(options.headers);
        if let Some(body) = options.body {
            request = request.body(body.to_string());
        }
        self.execute(request).await
    }

    // ===== Backend Operations =====

    /// Liveness probe
    pub async fn check_health(&self) -> Result<Value, ApiError> {
        self.execute(self.request(Method::GET, "/health")).await
    }

    /// Begin the Google OAuth flow
    pub async fn start_google_auth(&self) -> Result<AuthStart, ApiError> {
        self.execute(self.request(Method::GET, "/auth/google/start"))
            .await
    }

    /// Submit a processing job
    pub async fn submit_job<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Value, ApiError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| ApiError::InvalidRequest(format!("Unserializable job payload: {}", e)))?;
        self.execute(self.request(Method::POST, "/submit").body(body))
            .await
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<Value, ApiError> {
        let endpoint = format!("/status/{}", urlencoding::encode(job_id));
        self.execute(self.request(Method::GET, &endpoint)).await
    }

    /// Search media. `params` is flattened into the query string in order,
    /// e.g. `&[("q", "cats"), ("limit", "10")]`.
    pub async fn search_media<P: Serialize + ?Sized>(&self, params: &P) -> Result<Value, ApiError> {
        self.execute(self.request(Method::GET, "/search").query(params))
            .await
    }

    /// Fetch raw media bytes.
    ///
    /// Skips the JSON pipeline: no content type, no `detail` parsing and no
    /// logout on 401. Any failure status is a `ContentLoad` error.
    pub async fn get_media_content_blob(&self, media_id: &str) -> Result<MediaContent, ApiError> {
        let endpoint = format!("/media/{}/content", urlencoding::encode(media_id));
        let request = self
            .client
            .get(self.url(&endpoint))
            .headers(self.auth_headers()?);

        debug!(media_id = media_id, "Fetching media content");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::ContentLoad { status });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(MediaContent {
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::auth::MemoryStore;

    #[test]
    fn test_auth_start_redirect_url() {
        let start = AuthStart(json!({"auth_url": "https://accounts.google.com/o/oauth2"}));
        assert_eq!(start.redirect_url(), Some("https://accounts.google.com/o/oauth2"));

        let start = AuthStart(json!({"url": "https://a.example", "auth_url": "https://b.example"}));
        assert_eq!(start.redirect_url(), Some("https://a.example"));

        let start = AuthStart(json!("https://plain.example"));
        assert_eq!(start.redirect_url(), Some("https://plain.example"));

        assert_eq!(AuthStart(json!({"state": "xyz"})).redirect_url(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let session = SessionStore::open(Arc::new(MemoryStore::new())).unwrap();
        let config = Config {
            api_base_url: "http://localhost:8000/".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, session).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/health"), "http://localhost:8000/health");
    }

    #[tokio::test]
    async fn test_unserializable_payload_is_invalid_request() {
        use std::collections::HashMap;

        let session = SessionStore::open(Arc::new(MemoryStore::new())).unwrap();
        let client = ApiClient::new(&Config::default(), session).unwrap();

        // JSON object keys must be strings
        let payload: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        let err = client.submit_job(&payload).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_auth_headers_follow_session() {
        let session = SessionStore::open(Arc::new(MemoryStore::new())).unwrap();
        let client = ApiClient::new(&Config::default(), session.clone()).unwrap();
        assert!(client.auth_headers().unwrap().is_empty());

        session.set_auth("tok", "user").unwrap();
        let headers = client.auth_headers().unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer tok");

        session.set_auth("bad\ntoken", "user").unwrap();
        assert!(matches!(
            client.auth_headers(),
            Err(ApiError::InvalidHeader(_))
        ));
    }
}
