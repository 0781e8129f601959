use std::sync::{Arc, OnceLock, RwLock};

use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::{ApiError, ApiResult, SESSION_EXPIRED_MESSAGE};

/// Callback installed by the session layer, fired on a 401 before the error
/// is handed back to the caller. The credential exchange is the one request
/// that never fires it.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Longest plain-text error body worth showing to a person. Anything bigger
/// (HTML error pages, dumps) falls back to a generic message.
const MAX_PLAIN_ERROR_LEN: usize = 300;

/// Shared pipeline under every API surface: joins paths onto the configured
/// base URL, injects the bearer token, and collapses every outcome into
/// [`ApiError`] so callers never touch transport types.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Config,
    token: Arc<RwLock<Option<String>>>,
    on_unauthorized: Arc<OnceLock<UnauthorizedHook>>,
}

/// Body of a binary download plus what the server said about it.
#[derive(Debug, Clone)]
pub struct BinaryPayload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: mime::Mime,
}

impl ApiClient {
    pub fn new(config: Config) -> Self {
        Self {
            http: Client::new(),
            config,
            token: Arc::new(RwLock::new(None)),
            on_unauthorized: Arc::new(OnceLock::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn origin(&self) -> Url {
        self.config.origin()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    /// Install the global 401 listener. Only the first installation wins;
    /// the session store owns this slot.
    pub(crate) fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        let _ = self.on_unauthorized.set(hook);
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self.http.get(self.endpoint(path)?);
        let response = self.send(request).await?;
        self.read_json(response, true).await
    }

    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        let request = self.http.get(self.endpoint(path)?).query(query);
        let response = self.send(request).await?;
        self.read_json(response, true).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let request = self.http.post(self.endpoint(path)?).json(body);
        let response = self.send(request).await?;
        self.read_json(response, true).await
    }

    /// POST for the credential exchange itself. A 401 from this request
    /// means the submitted credentials were rejected, not that a session
    /// expired, so the unauthorized listener stays out of it and the
    /// rejection surfaces inline to the caller.
    pub async fn post_json_preauth<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let request = self.http.post(self.endpoint(path)?).json(body);
        let response = self.send(request).await?;
        self.read_json(response, false).await
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let request = self.http.patch(self.endpoint(path)?).json(body);
        let response = self.send(request).await?;
        self.read_json(response, true).await
    }

    /// PATCH with no request body, ignoring whatever the server returns
    /// beyond success or failure.
    pub async fn patch_empty(&self, path: &str) -> ApiResult<()> {
        let request = self.http.patch(self.endpoint(path)?);
        let response = self.send(request).await?;
        self.expect_success(response).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let request = self.http.delete(self.endpoint(path)?);
        let response = self.send(request).await?;
        self.expect_success(response).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> ApiResult<T> {
        let request = self.http.post(self.endpoint(path)?).multipart(form);
        let response = self.send(request).await?;
        self.read_json(response, true).await
    }

    pub async fn get_binary(&self, path: &str) -> ApiResult<BinaryPayload> {
        let request = self.http.get(self.endpoint(path)?);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response, true).await);
        }

        let file_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(file_name_from_disposition);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                warn!(?err, "connection dropped while reading download body");
                return Err(ApiError::network());
            }
        };

        Ok(BinaryPayload {
            bytes,
            file_name,
            content_type,
        })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| {
                warn!(?err, path, "failed to build request URL");
                ApiError::local("Invalid request path.")
            })
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request = match self.token.read().unwrap().clone() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        match request.send().await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(?err, "request never reached the server");
                Err(ApiError::network())
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        notify_unauthorized: bool,
    ) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_from_response(response, notify_unauthorized).await);
        }
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(?err, "connection dropped while reading response body");
                return Err(ApiError::network());
            }
        };
        serde_json::from_str(&text).map_err(|err| {
            let preview = if text.len() > 500 {
                format!("{}...", truncate_to_char_boundary(&text, 500))
            } else {
                text.clone()
            };
            warn!(?err, body = %preview, "response body did not match the expected shape");
            ApiError::server(
                status.as_u16(),
                "The server returned an unexpected response.",
                None,
            )
        })
    }

    async fn expect_success(&self, response: Response) -> ApiResult<()> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.error_from_response(response, true).await)
    }

    /// Turn a non-success response into the normalized error shape, firing
    /// the 401 listener when the status calls for it.
    async fn error_from_response(
        &self,
        response: Response,
        notify_unauthorized: bool,
    ) -> ApiError {
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let data: Option<Value> = serde_json::from_str(&raw).ok();
        let message = extract_server_message(data.as_ref(), &raw);

        if status == StatusCode::UNAUTHORIZED {
            if notify_unauthorized {
                if let Some(hook) = self.on_unauthorized.get() {
                    hook();
                }
            }
            let message = message.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string());
            return ApiError::unauthorized(message, data);
        }

        let message =
            message.unwrap_or_else(|| format!("Request failed with status {}.", status.as_u16()));
        ApiError::server(status.as_u16(), message, data)
    }
}

/// Pull a display-worthy message out of an error body: the conventional
/// `message`/`error` JSON keys first, then a short plain-text body.
fn extract_server_message(data: Option<&Value>, raw: &str) -> Option<String> {
    if let Some(value) = data {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                let message = message.trim();
                if !message.is_empty() {
                    return Some(message.to_string());
                }
            }
        }
        return None;
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_PLAIN_ERROR_LEN {
        return None;
    }
    Some(trimmed.to_string())
}

/// Clip a body for logging without landing inside a multibyte character.
fn truncate_to_char_boundary(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn file_name_from_disposition(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let name = part.trim().strip_prefix("filename=")?;
        let name = name.trim().trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
