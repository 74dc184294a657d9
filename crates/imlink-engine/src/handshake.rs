use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Source of session credentials.
///
/// Called once per connection attempt, so implementations may refresh an expired
/// token before returning it.
pub trait AuthProvider {
    fn access_token(&self) -> Result<String, AuthError>;

    fn signing_secret(&self) -> Result<String, AuthError>;
}

/// Fixed credentials, for tests and the CLI.
#[derive(Clone)]
pub struct StaticAuth {
    token: String,
    secret: String,
}

impl StaticAuth {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl AuthProvider for StaticAuth {
    fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }

    fn signing_secret(&self) -> Result<String, AuthError> {
        Ok(self.secret.clone())
    }
}

impl fmt::Debug for StaticAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAuth")
            .field("token", &format_args!("<redacted:{} bytes>", self.token.len()))
            .field(
                "secret",
                &format_args!("<redacted:{} bytes>", self.secret.len()),
            )
            .finish()
    }
}

/// Base64(HMAC-SHA256(secret, data)).
pub fn sign(secret: &str, data: &str) -> Result<String, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidKey)?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Query parameters that authenticate one connection attempt.
///
/// The token and signature are credential material and are redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    pub trace_id: String,
    /// Unix seconds.
    pub timestamp: u64,
    pub sign: String,
    pub token: String,
}

impl HandshakeParams {
    /// Sign `trace_id || timestamp` with `secret`.
    pub fn new(
        trace_id: impl Into<String>,
        timestamp: u64,
        secret: &str,
        token: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let trace_id = trace_id.into();
        let sign = sign(secret, &format!("{trace_id}{timestamp}"))?;
        Ok(Self {
            trace_id,
            timestamp,
            sign,
            token: token.into(),
        })
    }

    /// Fresh trace id, current timestamp and current credentials from `auth`.
    pub fn generate<A: AuthProvider + ?Sized>(auth: &A, now: SystemTime) -> Result<Self, AuthError> {
        let token = auth.access_token()?;
        let secret = auth.signing_secret()?;
        let timestamp = now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self::new(uuid::Uuid::new_v4().to_string(), timestamp, &secret, token)
    }

    /// `traceId=..&timestamp=..&sign=..&token=..`, percent-encoded.
    pub fn query(&self) -> String {
        format!(
            "traceId={}&timestamp={}&sign={}&token={}",
            urlencoding::encode(&self.trace_id),
            self.timestamp,
            urlencoding::encode(&self.sign),
            urlencoding::encode(&self.token),
        )
    }

    /// Append the handshake query to `base`.
    pub fn channel_url(&self, base: &str) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}{}", self.query())
    }
}

impl fmt::Debug for HandshakeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeParams")
            .field("trace_id", &self.trace_id)
            .field("timestamp", &self.timestamp)
            .field("sign", &format_args!("<redacted:{} bytes>", self.sign.len()))
            .field("token", &format_args!("<redacted:{} bytes>", self.token.len()))
            .finish()
    }
}
