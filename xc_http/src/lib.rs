//! # xc_http
//!
//! Signed REST client for the exchange API: HMAC request signing, retry on
//! HTTP 429 with exponential backoff, and JSON response decoding.

pub mod errors;
pub mod executor;
pub mod settings;
pub mod signer;
pub mod transport;

pub use errors::ApiErrorBody;
pub use errors::ClientError;
pub use errors::Result;
pub use executor::ClientConfig;
pub use executor::RequestExecutor;
pub use settings::ClientSettings;
pub use settings::load_settings;
pub use signer::Credentials;
pub use signer::SecretEncoding;
pub use transport::ReqwestTransport;
pub use transport::Transport;
pub use transport::TransportConfig;
pub use transport::TransportRequest;
pub use transport::TransportResponse;

pub use reqwest::Method;
pub use reqwest::StatusCode;
