//! # Transport Boundary
//!
//! The engine never talks to the network directly. It is handed a [`Fetch`]
//! implementation and only interprets the `(status, content type, body)`
//! triple that comes back.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::ConsolidatorError;

/// Raw result of fetching one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// The numeric HTTP status code.
    pub status_code: u16,
    /// The `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
    /// The undecoded response body.
    pub body: String,
}

impl FetchResponse {
    /// A `200 application/json` response, mostly useful for scripted transports.
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }
}

/// Capability to fetch the data living at a path.
///
/// Any `Err` returned here is treated as a transport failure: it is reported
/// once and the poll loop for that path stops.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<FetchResponse, ConsolidatorError>> + Send;
}

impl<T: Fetch> Fetch for Arc<T> {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<FetchResponse, ConsolidatorError>> + Send {
        (**self).fetch(path)
    }
}

/// True for `application/json`, `text/json` and any `+json` structured suffix.
pub fn is_structured_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence == "text/json" || essence.ends_with("+json")
}

/// Turns a raw response into a JSON value, or the error to report for it.
///
/// The content type is checked first, then the status code, then the body.
pub fn decode_response(response: &FetchResponse) -> Result<Value, ConsolidatorError> {
    if let Some(content_type) = &response.content_type {
        if !is_structured_content_type(content_type) {
            return Err(ConsolidatorError::UnsupportedContentType(content_type.clone()));
        }
    }

    if !(200..300).contains(&response.status_code) {
        return Err(ConsolidatorError::HttpStatus {
            status: response.status_code,
            body: response.body.clone(),
        });
    }

    serde_json::from_str(&response.body).map_err(|e| ConsolidatorError::MalformedBody(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_content_types() {
        assert!(is_structured_content_type("application/json"));
        assert!(is_structured_content_type("Application/JSON; charset=utf-8"));
        assert!(is_structured_content_type("application/vnd.api+json"));
        assert!(is_structured_content_type("text/json"));
        assert!(!is_structured_content_type("text/html"));
        assert!(!is_structured_content_type("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_decode_valid_json() {
        let value = decode_response(&FetchResponse::json(r#"{"x": [1, 2]}"#)).unwrap();
        assert_eq!(value, json!({"x": [1, 2]}));
    }

    #[test]
    fn test_missing_content_type_is_accepted() {
        let response = FetchResponse { status_code: 200, content_type: None, body: "[]".into() };
        assert_eq!(decode_response(&response).unwrap(), json!([]));
    }

    #[test]
    fn test_decode_errors() {
        let html = FetchResponse {
            status_code: 200,
            content_type: Some("text/html".into()),
            body: "<p>".into(),
        };
        assert_eq!(
            decode_response(&html).unwrap_err(),
            ConsolidatorError::UnsupportedContentType("text/html".into())
        );

        let missing = FetchResponse { status_code: 404, ..FetchResponse::json("{}") };
        assert!(matches!(
            decode_response(&missing).unwrap_err(),
            ConsolidatorError::HttpStatus { status: 404, .. }
        ));

        let broken = FetchResponse::json("{not json");
        assert!(matches!(decode_response(&broken).unwrap_err(), ConsolidatorError::MalformedBody(_)));
    }
}
