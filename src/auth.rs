//! Request authentication
//!
//! Payloads are canonicalized as `k1=v1&k2=v2` with keys sorted ascending,
//! then signed with HMAC-SHA256 keyed by the source's secret. The signature
//! is lowercase hex.

use crate::error::{AggregatorError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Hex length of an HMAC-SHA256 signature
pub const SIGNATURE_HEX_LEN: usize = 64;

/// API key pair for one source
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    api_key: String,
    secret_key: String,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Flat payload value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadValue::Str(s) => f.write_str(s),
            PayloadValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Str(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Str(s)
    }
}

impl From<i64> for PayloadValue {
    fn from(i: i64) -> Self {
        PayloadValue::Int(i)
    }
}

/// Build the canonical `k=v&...` string with keys in ascending order
pub fn canonical_string<I, K, V>(payload: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PayloadValue>,
{
    let mut pairs: Vec<(String, PayloadValue)> = payload
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 signer owned by a single adapter
#[derive(Clone)]
pub struct Signer {
    credential: Credential,
    mac: HmacSha256,
}

impl Signer {
    pub fn new(credential: Credential) -> Result<Self> {
        if credential.secret_key.is_empty() {
            return Err(AggregatorError::Signing("empty secret key".to_string()));
        }
        let mac = HmacSha256::new_from_slice(credential.secret_key.as_bytes())
            .map_err(|e| AggregatorError::Signing(e.to_string()))?;
        Ok(Self { credential, mac })
    }

    pub fn api_key(&self) -> &str {
        self.credential.api_key()
    }

    /// Sign a flat payload mapping
    pub fn sign<I, K, V>(&self, payload: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PayloadValue>,
    {
        self.sign_message(&canonical_string(payload))
    }

    /// Sign an already canonical message
    pub fn sign_message(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign a JSON object. Nested values are rejected.
    pub fn sign_json(&self, payload: &serde_json::Value) -> Result<String> {
        let obj = payload
            .as_object()
            .ok_or_else(|| AggregatorError::Signing("payload must be an object".to_string()))?;

        let mut flat = Vec::with_capacity(obj.len());
        for (k, v) in obj {
            let value = match v {
                serde_json::Value::String(s) => PayloadValue::Str(s.clone()),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => PayloadValue::Int(i),
                    None => {
                        return Err(AggregatorError::Signing(format!(
                            "non-integer number for key {}",
                            k
                        )))
                    }
                },
                other => {
                    return Err(AggregatorError::Signing(format!(
                        "unsupported value for key {}: {}",
                        k, other
                    )))
                }
            };
            flat.push((k.clone(), value));
        }
        Ok(self.sign(flat))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("credential", &self.credential)
            .finish()
    }
}

/// Shape-only signature check: 64 lowercase hex characters.
///
/// This does not recompute the HMAC against any payload.
pub fn is_valid_signature_shape(signature: &str) -> bool {
    signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
