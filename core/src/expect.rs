//! First stage of the response pipeline: decoding the raw response.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::http::HttpResponse;

type DecodeFn = Arc<dyn Fn(&HttpResponse) -> Result<Value> + Send + Sync>;

/// How a raw response is turned into the value handed to `transformData`.
#[derive(Clone, Default)]
pub enum ResponseExpect {
    /// Require a 2xx status and parse the body as JSON. An empty body is `null`.
    #[default]
    Json,
    /// Require a 2xx status and return the body as a JSON string.
    Text,
    /// Never fail on status; return `{status, headers, body}`.
    Raw,
    Custom(DecodeFn),
}

impl ResponseExpect {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&HttpResponse) -> Result<Value> + Send + Sync + 'static,
    {
        ResponseExpect::Custom(Arc::new(f))
    }

    pub fn decode(&self, response: &HttpResponse) -> Result<Value> {
        match self {
            ResponseExpect::Json => {
                check_status(response)?;
                if response.body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Value::Null);
                }
                response.json()
            }
            ResponseExpect::Text => {
                check_status(response)?;
                Ok(Value::String(response.text()))
            }
            ResponseExpect::Raw => {
                let headers: serde_json::Map<String, Value> = response
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), Value::String(v.to_string())))
                    .collect();
                Ok(json!({
                    "status": response.status,
                    "headers": headers,
                    "body": response.text(),
                }))
            }
            ResponseExpect::Custom(f) => f(response),
        }
    }
}

impl fmt::Debug for ResponseExpect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseExpect::Json => f.write_str("Json"),
            ResponseExpect::Text => f.write_str("Text"),
            ResponseExpect::Raw => f.write_str("Raw"),
            ResponseExpect::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Map non-success status codes to `Error::HttpStatus`.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(Error::HttpStatus {
        status: response.status,
        body: response.text(),
    })
}
