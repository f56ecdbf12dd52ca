//! Request and response shapes of a node's management API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application-level success code used by node agents.
pub const CODE_OK: i64 = 200;
/// Code used for every locally detected failure (transport, HTTP, decoding).
pub const CODE_FAILURE: i64 = 500;
/// Code used when the caller cancelled the request.
pub const CODE_CANCELLED: i64 = 499;

/// The uniform `{code, msg, data}` envelope every node call resolves to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl AgentResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            code: CODE_OK,
            msg: "success".to_string(),
            data,
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_FAILURE,
            msg: msg.into(),
            data: Value::Null,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: CODE_CANCELLED,
            msg: "request cancelled".to_string(),
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}

/// One call to a node: method, API path, optional query pairs and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl AgentRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}
