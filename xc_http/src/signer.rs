//! Request authentication.
//!
//! Every request carries four headers: the API key, the passphrase, the
//! unix timestamp (seconds) and a base64 HMAC-SHA256 signature over
//! `timestamp + method + path + body`.

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::Hmac;
use hmac::Mac;
use reqwest::Method;
use serde::Deserialize;
use sha2::Sha256;

use crate::errors::ClientError;
use crate::errors::Result;

type HmacSha256 = Hmac<Sha256>;

pub const CB_ACCESS_KEY: &str = "cb-access-key";
pub const CB_ACCESS_PASSPHRASE: &str = "cb-access-passphrase";
pub const CB_ACCESS_TIMESTAMP: &str = "cb-access-timestamp";
pub const CB_ACCESS_SIGN: &str = "cb-access-sign";

/// How the API secret is turned into HMAC key bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// Secret is base64 text and is decoded before use (exchange default)
    #[default]
    Base64,
    /// Secret bytes are used as-is
    Raw,
}

/// API credentials. Never printed: `Debug` redacts every field.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) key: String,
    pub(crate) secret: String,
    pub(crate) passphrase: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self { key: key.into(), secret: secret.into(), passphrase: passphrase.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// Names of the credential fields that are still empty
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.key.is_empty() {
            missing.push("key");
        }
        if self.secret.is_empty() {
            missing.push("secret");
        }
        if self.passphrase.is_empty() {
            missing.push("passphrase");
        }
        missing
    }

    fn signing_key(&self, encoding: SecretEncoding) -> Result<Vec<u8>> {
        match encoding {
            SecretEncoding::Base64 => {
                STANDARD.decode(&self.secret).map_err(|err| ClientError::Signature(format!("secret is not valid base64: {err}")))
            }
            SecretEncoding::Raw => Ok(self.secret.as_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &redact(&self.key))
            .field("secret", &redact(&self.secret))
            .field("passphrase", &redact(&self.passphrase))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

/// Authentication headers for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub signature: String,
}

impl AuthHeaders {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (CB_ACCESS_KEY, self.key.as_str()),
            (CB_ACCESS_PASSPHRASE, self.passphrase.as_str()),
            (CB_ACCESS_TIMESTAMP, self.timestamp.as_str()),
            (CB_ACCESS_SIGN, self.signature.as_str()),
        ]
        .into_iter()
    }
}

/// The exact string that gets signed
pub fn prehash(timestamp: &str, method: &Method, path: &str, body: &str) -> String {
    format!("{timestamp}{}{path}{body}", method.as_str())
}

/// HMAC-SHA256 of `message` under `key`, base64 encoded
pub fn sign(key: &[u8], message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|err| ClientError::Signature(format!("invalid HMAC key: {err}")))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build the authentication headers for a request.
///
/// `path` excludes the host and `body` must be the exact text that will be
/// sent (empty when there is none).
pub fn headers(
    credentials: &Credentials,
    encoding: SecretEncoding,
    method: &Method,
    path: &str,
    timestamp: &str,
    body: &str,
) -> Result<AuthHeaders> {
    let key = credentials.signing_key(encoding)?;
    let signature = sign(&key, &prehash(timestamp, method, path, body))?;

    Ok(AuthHeaders {
        key: credentials.key().to_string(),
        passphrase: credentials.passphrase().to_string(),
        timestamp: timestamp.to_string(),
        signature,
    })
}

/// Current unix time in whole seconds, as sent in `CB-ACCESS-TIMESTAMP`
pub fn unix_timestamp() -> Result<String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().to_string())
        .map_err(|_| ClientError::Signature("system clock is before the unix epoch".into()))
}
