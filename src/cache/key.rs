//! Request fingerprinting.

use crate::types::ApiType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Fields that vary per request without changing the answer. Credentials are
/// included so they never become part of a cache key.
pub const VOLATILE_FIELDS: &[&str] = &[
    "timestamp",
    "request_id",
    "nonce",
    "_ts",
    "cache_buster",
    "signature",
    "key",
    "api_key",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestFingerprint {
    pub api_type: ApiType,
    /// Hex SHA-256 of the canonical parameters.
    pub hash: String,
}

impl RequestFingerprint {
    /// Key under which the entry lives in the backend.
    pub fn storage_key(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.to_string()
        } else {
            format!("{}:{}", prefix, self)
        }
    }
}

impl std::fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.api_type, self.hash)
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    volatile: BTreeSet<String>,
    salt: Option<String>,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            volatile: VOLATILE_FIELDS.iter().map(|s| s.to_string()).collect(),
            salt: None,
        }
    }

    pub fn with_volatile_field(mut self, field: impl Into<String>) -> Self {
        self.volatile.insert(field.into().to_ascii_lowercase());
        self
    }

    /// Namespaces every hash, e.g. per deployment or schema version.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn is_volatile(&self, field: &str) -> bool {
        self.volatile.contains(&field.to_ascii_lowercase())
    }

    /// Canonical form: volatile fields dropped at every depth, object keys
    /// sorted, strings trimmed.
    pub fn normalize(&self, params: &Value) -> Value {
        match params {
            Value::Object(obj) => {
                let sorted: BTreeMap<&String, Value> = obj
                    .iter()
                    .filter(|(k, _)| !self.is_volatile(k))
                    .map(|(k, v)| (k, self.normalize(v)))
                    .collect();
                let mut out = Map::new();
                for (k, v) in sorted {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.normalize(v)).collect()),
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        }
    }

    pub fn generate(&self, api_type: ApiType, params: &Value) -> RequestFingerprint {
        let canonical = self.normalize(params).to_string();
        let mut hasher = Sha256::new();
        hasher.update(api_type.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical.as_bytes());
        if let Some(ref s) = self.salt {
            hasher.update(b"\n");
            hasher.update(s.as_bytes());
        }
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        RequestFingerprint { api_type, hash }
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}
