//! DynamoDB JSON protocol types for the blockswap metadata client.
//!
//! Only the read path is modeled: `GetItem` and `Query` requests, their
//! responses, and the `__type`/`message` error body. Types are hand-written
//! since DynamoDB's JSON protocol maps directly onto serde derives.
// "DynamoDB" appears in virtually every doc comment in this crate.
#![allow(clippy::doc_markdown)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod operations;
pub mod output;

pub use attribute_value::{AttributeValue, Item};
pub use error::DynamoDBErrorBody;
pub use input::{GetItemInput, QueryInput};
pub use operations::DynamoDBOperation;
pub use output::{GetItemOutput, QueryOutput};
