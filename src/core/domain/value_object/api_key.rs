use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Deserializer};

const MAX_LENGTH: usize = 512;

/// An opaque node API key, sent verbatim in the `apikey` header.
///
/// The key never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validates and wraps a key.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_api_key(&key)?;
        Ok(Self(key))
    }

    /// Returns the raw key for the request header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ApiKey::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Validates an API key. It must be usable as an HTTP header value.
pub(crate) fn validate_api_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Field {
            field: "api_key".to_string(),
            message: "API key cannot be empty".to_string(),
        });
    }
    if key.len() > MAX_LENGTH {
        return Err(ValidationError::Format(format!(
            "API key exceeds maximum length of {} characters",
            MAX_LENGTH
        )));
    }
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::Format(
            "API key may only contain visible ASCII characters".to_string(),
        ));
    }
    Ok(())
}
