//! DynamoDB operations issued by the metadata client.

use std::fmt;

/// Target service prefix for the `X-Amz-Target` header.
pub const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// Content type of every DynamoDB JSON request.
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Read operations the metadata client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamoDBOperation {
    /// Get an item by primary key.
    GetItem,
    /// Query items by key condition.
    Query,
}

impl DynamoDBOperation {
    /// Returns the AWS operation name string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetItem => "GetItem",
            Self::Query => "Query",
        }
    }

    /// Value of the `X-Amz-Target` header for this operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockswap_dynamodb_model::DynamoDBOperation;
    ///
    /// assert_eq!(DynamoDBOperation::Query.target(), "DynamoDB_20120810.Query");
    /// ```
    #[must_use]
    pub fn target(&self) -> String {
        format!("{TARGET_PREFIX}.{}", self.as_str())
    }
}

impl fmt::Display for DynamoDBOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
