//! Request bodies for the DynamoDB read operations.

use std::collections::HashMap;

use serde::Serialize;

use crate::attribute_value::{AttributeValue, Item};

/// Input for the `GetItem` operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemInput {
    /// The name of the table containing the item.
    pub table_name: String,

    /// The primary key of the item to retrieve.
    pub key: Item,

    /// Strongly consistent read when `true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,

    /// Attributes to retrieve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
}

impl GetItemInput {
    /// Point lookup of a string-keyed item.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockswap_dynamodb_model::GetItemInput;
    ///
    /// let input = GetItemInput::by_string_key("blocks", "multihash", "zQm");
    /// let json = serde_json::to_string(&input).unwrap();
    /// assert_eq!(json, r#"{"TableName":"blocks","Key":{"multihash":{"S":"zQm"}}}"#);
    /// ```
    #[must_use]
    pub fn by_string_key(table: &str, key_name: &str, value: &str) -> Self {
        Self {
            table_name: table.to_owned(),
            key: HashMap::from([(key_name.to_owned(), AttributeValue::S(value.to_owned()))]),
            ..Self::default()
        }
    }
}

/// Input for the `Query` operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryInput {
    /// The name of the table to query.
    pub table_name: String,

    /// The name of a secondary index to query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    /// The condition selecting the items to retrieve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_condition_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,

    /// Maximum number of items to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl QueryInput {
    /// Equality query on a string attribute, returning at most `limit` items.
    ///
    /// The attribute name goes through a `#key` placeholder so reserved words
    /// are safe to use as key names.
    #[must_use]
    pub fn by_string_key(table: &str, key_name: &str, value: &str, limit: Option<i32>) -> Self {
        Self {
            table_name: table.to_owned(),
            key_condition_expression: Some("#key = :value".to_owned()),
            expression_attribute_names: HashMap::from([("#key".to_owned(), key_name.to_owned())]),
            expression_attribute_values: HashMap::from([(
                ":value".to_owned(),
                AttributeValue::S(value.to_owned()),
            )]),
            limit,
            ..Self::default()
        }
    }
}
