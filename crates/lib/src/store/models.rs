//! Row types for the `messages` table.

use serde::Serialize;

/// Quoted message reference; present only when the envelope carried a quote block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRef {
    pub id: Option<i64>,
    pub author: Option<String>,
    pub text: Option<String>,
}

/// Fields extracted from a `receive` notification, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMessage {
    pub source: Option<String>,
    pub source_name: Option<String>,
    pub timestamp: Option<i64>,
    pub message: Option<String>,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub quote: Option<QuoteRef>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: i64,
    pub source: Option<String>,
    pub source_name: Option<String>,
    pub timestamp: Option<i64>,
    pub message: Option<String>,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub attachment_paths: Vec<String>,
    pub attachment_descriptions: String,
    pub processed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteRef>,
}
