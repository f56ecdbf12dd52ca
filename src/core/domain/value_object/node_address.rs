use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

const ALLOWED_SCHEMES: [&str; 2] = ["https", "http"];
const MAX_LENGTH: usize = 2083; // RFC 7230 practical limit

/// A validated base address of a node's management API.
///
/// The address is an absolute `http`/`https` URL without query string or
/// fragment. Endpoint paths are appended to it by [`NodeAddress::endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress(Url);

impl NodeAddress {
    /// Parses and validates an address.
    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        validate_address(address)?;
        let url = Url::parse(address.trim())
            .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
        Ok(Self(url))
    }

    /// Returns the address as a string (always with a trailing slash for bare hosts).
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Builds the full URL for an API path, keeping any path prefix of the base.
    ///
    /// `query` pairs are percent-encoded.
    pub fn endpoint(&self, path: &str, query: &[(String, String)]) -> Url {
        let mut url = self.0.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, path.trim_start_matches('/')));
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NodeAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validates a node address.
pub(crate) fn validate_address(address: &str) -> Result<(), ValidationError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ValidationError::Field {
            field: "address".to_string(),
            message: "Address cannot be empty".to_string(),
        });
    }

    if address.len() > MAX_LENGTH {
        return Err(ValidationError::Format(format!(
            "Address exceeds maximum length of {} characters",
            MAX_LENGTH
        )));
    }

    let url = Url::parse(address)
        .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(ValidationError::ConstraintViolation(format!(
            "Invalid scheme. Must be one of: {}",
            ALLOWED_SCHEMES.join(", ")
        )));
    }

    if url.host_str().is_none() {
        return Err(ValidationError::ConstraintViolation(
            "Address must include a host".to_string(),
        ));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(ValidationError::ConstraintViolation(
            "Address cannot carry a query string or fragment".to_string(),
        ));
    }

    Ok(())
}
