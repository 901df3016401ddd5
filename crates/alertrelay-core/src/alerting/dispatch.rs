//! Delivery of channel requests
//!
//! Notifiers build a [`DispatchRequest`] and hand it to the shared
//! [`DispatchGateway`], which forwards it to an injected [`WebhookSender`].
//! Retries and backoff belong to the sender implementation or the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Error, Result};

/// Content type for JSON bodies
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for form bodies
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Unreserved characters of a query component; everything else is escaped.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTTP method of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    #[default]
    Post,
    /// PUT
    Put,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// Basic authentication credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport-agnostic HTTP request built fresh for each notification
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    /// Target URL
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Request body
    pub body: Bytes,
    /// Optional basic authentication
    pub basic_auth: Option<BasicAuth>,
}

impl DispatchRequest {
    /// Empty POST request to `url`
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            body: Bytes::new(),
            basic_auth: None,
        }
    }

    /// Replace the method
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set basic authentication
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    /// Serialize `payload` as the JSON body
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)?;
        Ok(self.header("Content-Type", CONTENT_TYPE_JSON).raw_body(body))
    }

    /// Use an encoded form as the body, without touching headers
    pub fn form(self, form: &FormBody) -> Self {
        self.raw_body(form.encode())
    }

    /// Set the body verbatim
    pub fn raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Body as text, lossily decoded
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// `application/x-www-form-urlencoded` body with keys in lexical order
#[derive(Debug, Clone, Default)]
pub struct FormBody(BTreeMap<String, String>);

impl FormBody {
    /// Empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set a field only when `value` is non-empty
    pub fn set_non_empty(self, key: impl Into<String>, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.set(key, value)
        }
    }

    /// Encode as `k=v&k=v`, spaces as `+`
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", query_escape(k), query_escape(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Escape a string for use inside a query component
pub fn query_escape(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ESCAPE)
        .to_string()
        .replace("%20", "+")
}

/// Escape a string for use as a URL path segment
pub fn path_escape(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ESCAPE).to_string()
}

/// Transport collaborator performing the actual network call
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Deliver one request; any non-success outcome is an error
    async fn send(&self, request: DispatchRequest) -> std::result::Result<(), DispatchError>;
}

/// Uniform entry point shared by every notifier
#[derive(Clone)]
pub struct DispatchGateway {
    sender: Arc<dyn WebhookSender>,
}

impl std::fmt::Debug for DispatchGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchGateway").finish_non_exhaustive()
    }
}

impl DispatchGateway {
    /// Wrap a sender
    pub fn new(sender: Arc<dyn WebhookSender>) -> Self {
        Self { sender }
    }

    /// Send `request` unless `cancel` fires first.
    ///
    /// A token cancelled before the call never reaches the sender. A
    /// cancellation during the call reports [`DispatchError::Cancelled`]
    /// even though the remote side may have received the request.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        request: DispatchRequest,
    ) -> std::result::Result<(), DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        debug!(url = %redact_url(&request.url), method = %request.method, "Dispatching request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.sender.send(request) => result,
        }
    }
}

/// Strip path and query, which may embed credentials (bot tokens, keys)
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(url) => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Production sender backed by `reqwest`
pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    /// Create a sender with the configured timeout and user agent
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;
        debug!(
            timeout = %humantime::format_duration(config.timeout),
            user_agent = %config.user_agent,
            "Created HTTP webhook sender"
        );

        Ok(Self { client })
    }

    /// Create a sender with only a timeout configured
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::new(&DispatchConfig {
            timeout,
            ..DispatchConfig::default()
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    #[instrument(skip(self, request), fields(method = %request.method))]
    async fn send(&self, request: DispatchRequest) -> std::result::Result<(), DispatchError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &request.basic_auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.password));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                DispatchError::InvalidRequest(e.to_string())
            } else {
                error!(error = %e, "HTTP request failed");
                DispatchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Webhook returned non-success status");
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
