//! DynamoDB error bodies.
//!
//! Errors come back as JSON with a `__type` field holding the
//! fully-qualified error type name, e.g.
//! `com.amazonaws.dynamodb.v20120810#ResourceNotFoundException`.

use std::fmt;

use serde::Deserialize;

/// A parsed DynamoDB error response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DynamoDBErrorBody {
    /// Fully-qualified error type.
    #[serde(rename = "__type", default)]
    pub error_type: String,
    /// Human-readable message. DynamoDB uses both `message` and `Message`.
    #[serde(alias = "Message", default)]
    pub message: String,
}

impl DynamoDBErrorBody {
    /// Parse an error body, tolerating bodies that are not JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockswap_dynamodb_model::DynamoDBErrorBody;
    ///
    /// let body = br#"{"__type":"com.amazonaws.dynamodb.v20120810#ResourceNotFoundException","message":"gone"}"#;
    /// let err = DynamoDBErrorBody::parse(body);
    /// assert_eq!(err.code(), "ResourceNotFoundException");
    /// ```
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self {
            error_type: String::new(),
            message: String::from_utf8_lossy(body).into_owned(),
        })
    }

    /// The short error code, without the namespace prefix.
    #[must_use]
    pub fn code(&self) -> &str {
        self.error_type
            .rsplit_once('#')
            .map_or(self.error_type.as_str(), |(_, code)| code)
    }
}

impl fmt::Display for DynamoDBErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}
