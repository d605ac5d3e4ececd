//! Response bodies for the DynamoDB read operations.

use serde::Deserialize;

use crate::attribute_value::Item;

/// Output for the `GetItem` operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemOutput {
    /// The item, absent when no item has the requested key.
    #[serde(default)]
    pub item: Option<Item>,
}

/// Output for the `Query` operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryOutput {
    /// Matching items.
    #[serde(default)]
    pub items: Vec<Item>,

    /// Number of items returned.
    #[serde(default)]
    pub count: i32,
}
