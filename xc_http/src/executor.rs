//! Signed request execution with retry on rate limiting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::ApiErrorBody;
use crate::errors::ClientError;
use crate::errors::Result;
use crate::settings::ClientSettings;
use crate::settings::SANDBOX_URL;
use crate::signer;
use crate::signer::AuthHeaders;
use crate::signer::Credentials;
use crate::signer::SecretEncoding;
use crate::transport::ReqwestTransport;
use crate::transport::Transport;
use crate::transport::TransportRequest;
use crate::transport::TransportResponse;

pub const CLIENT_USER_AGENT: &str = "Client 1.0";

const APPLICATION_JSON: &str = "application/json";

/// Partial update for the client's endpoint and credentials.
///
/// `None` and empty strings both mean "leave as is": an update can replace a
/// value but never clear it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
}

impl ClientConfig {
    pub fn base_url(url: impl Into<String>) -> Self {
        Self { base_url: Some(url.into()), ..Default::default() }
    }

    pub fn credentials(credentials: Credentials) -> Self {
        Self {
            base_url: None,
            key: Some(credentials.key),
            secret: Some(credentials.secret),
            passphrase: Some(credentials.passphrase),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Everything an attempt reads from the client, swapped as a unit
#[derive(Clone)]
struct Endpoint {
    base_url: String,
    credentials: Credentials,
}

/// Executes signed JSON requests against one exchange.
///
/// Endpoint and credentials are snapshotted at the start of every attempt, so
/// `update_config` can run concurrently with in-flight requests.
pub struct RequestExecutor<T = ReqwestTransport> {
    endpoint: RwLock<Arc<Endpoint>>,
    transport: T,
    retry_count: u32,
    secret_encoding: SecretEncoding,
}

impl RequestExecutor<ReqwestTransport> {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        Self::with_transport(base_url, credentials, ReqwestTransport::new()?)
    }

    /// Build a client from startup settings, switching to the sandbox
    /// endpoint when requested
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let executor = Self::new(settings.base_url.clone(), settings.credentials())?
            .with_retry_count(settings.retry_count)
            .with_secret_encoding(settings.secret_encoding);

        if settings.api_sandbox {
            executor.update_config(&ClientConfig::base_url(SANDBOX_URL));
        }

        Ok(executor)
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn with_transport(base_url: impl Into<String>, credentials: Credentials, transport: T) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ClientError::Config("no base url defined".into()));
        }

        Ok(Self {
            endpoint: RwLock::new(Arc::new(Endpoint { base_url, credentials })),
            transport,
            retry_count: 0,
            secret_encoding: SecretEncoding::default(),
        })
    }

    /// Number of extra attempts after a 429 (default: 0, a single attempt)
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_secret_encoding(mut self, encoding: SecretEncoding) -> Self {
        self.secret_encoding = encoding;
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn base_url(&self) -> String {
        self.endpoint.read().base_url.clone()
    }

    pub fn credentials(&self) -> Credentials {
        self.endpoint.read().credentials.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Apply the non-empty fields of `config`, leaving the rest untouched
    pub fn update_config(&self, config: &ClientConfig) {
        let mut endpoint = self.endpoint.write();
        let mut next = Endpoint::clone(&endpoint);
        let mut changed = Vec::new();

        if let Some(base_url) = non_empty(&config.base_url) {
            next.base_url = base_url.to_string();
            changed.push("base_url");
        }
        if let Some(key) = non_empty(&config.key) {
            next.credentials.key = key.to_string();
            changed.push("key");
        }
        if let Some(secret) = non_empty(&config.secret) {
            next.credentials.secret = secret.to_string();
            changed.push("secret");
        }
        if let Some(passphrase) = non_empty(&config.passphrase) {
            next.credentials.passphrase = passphrase.to_string();
            changed.push("passphrase");
        }

        if changed.is_empty() {
            return;
        }

        *endpoint = Arc::new(next);
        info!(fields = ?changed, "Client config updated");
    }

    /// Authentication headers for a request, signed with the current secret
    pub fn headers(&self, method: &Method, path: &str, timestamp: &str, body: &str) -> Result<AuthHeaders> {
        let endpoint = self.snapshot();
        signer::headers(&endpoint.credentials, self.secret_encoding, method, path, timestamp, body)
    }

    /// Delay before attempt `attempt` (0-indexed): `(2^attempt - 1) / 2` seconds
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(2u64.saturating_pow(attempt).saturating_sub(1).saturating_mul(500))
    }

    /// Send a request and decode a 200 response body into `R`
    pub async fn request<R, P>(&self, method: Method, path: &str, params: Option<&P>) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.execute(method, path, params).await?.json()
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.request::<R, ()>(Method::GET, path, None).await
    }

    pub async fn post<R, P>(&self, path: &str, params: &P) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(params)).await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.request::<R, ()>(Method::DELETE, path, None).await
    }

    /// Send a request, retrying on 429 with exponential backoff.
    ///
    /// Makes at most `retry_count + 1` attempts. Once they are used up the
    /// final 429 is returned like any other error status.
    pub async fn execute<P>(&self, method: Method, path: &str, params: Option<&P>) -> Result<TransportResponse>
    where
        P: Serialize + ?Sized,
    {
        let mut attempt = 0;

        loop {
            let delay = Self::backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let response = self.send_once(&method, path, params).await?;
            debug!(%method, path, attempt, status = %response.status, "Request completed");

            if response.status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retry_count {
                attempt += 1;
                warn!(%method, path, attempt, backoff = ?Self::backoff(attempt), "Rate limited, retrying");
                continue;
            }

            return check_status(response);
        }
    }

    /// One attempt, no retry: send the request and map non-200 statuses to
    /// [`ClientError::Api`]
    pub async fn attempt<P>(&self, method: &Method, path: &str, params: Option<&P>) -> Result<TransportResponse>
    where
        P: Serialize + ?Sized,
    {
        check_status(self.send_once(method, path, params).await?)
    }

    async fn send_once<P>(&self, method: &Method, path: &str, params: Option<&P>) -> Result<TransportResponse>
    where
        P: Serialize + ?Sized,
    {
        let endpoint = self.snapshot();

        let missing = endpoint.credentials.missing();
        if !missing.is_empty() {
            return Err(ClientError::Config(format!("missing credentials: {}", missing.join(", "))));
        }

        let body = match params {
            Some(params) => serde_json::to_string(params).map_err(ClientError::Encoding)?,
            None => String::new(),
        };

        let timestamp = signer::unix_timestamp()?;
        let auth = signer::headers(&endpoint.credentials, self.secret_encoding, method, path, &timestamp, &body)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        for (name, value) in auth.iter() {
            let value =
                HeaderValue::from_str(value).map_err(|_| ClientError::Config(format!("{name} contains invalid header characters")))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let request = TransportRequest {
            method: method.clone(),
            url: format!("{}{}", endpoint.base_url, path),
            headers,
            body: Bytes::from(body),
        };

        self.transport.send(request).await
    }

    fn snapshot(&self) -> Arc<Endpoint> {
        Arc::clone(&self.endpoint.read())
    }
}

/// Pass a 200 through; turn anything else into an API error
fn check_status(response: TransportResponse) -> Result<TransportResponse> {
    if response.status == StatusCode::OK {
        return Ok(response);
    }

    match serde_json::from_slice::<ApiErrorBody>(&response.body) {
        Ok(body) => Err(ClientError::Api { status: response.status, body }),
        Err(source) => Err(ClientError::UndecodableApiError { status: response.status, body: response.body, source }),
    }
}
