//! `receive` notification payload and extraction of group messages from it.

use crate::store::{NewMessage, QuoteRef};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct ReceiveParams {
    #[serde(default)]
    envelope: Option<Envelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default, deserialize_with = "loose_string")]
    source: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    source_name: Option<String>,
    #[serde(default, deserialize_with = "loose_i64")]
    timestamp: Option<i64>,
    /// Kept raw so an empty object can be told apart from a content message.
    #[serde(default)]
    data_message: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataMessage {
    #[serde(default, deserialize_with = "loose_string")]
    message: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<AttachmentRef>>,
    #[serde(default)]
    group_info: Option<Value>,
    #[serde(default)]
    quote: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupInfo {
    #[serde(default, deserialize_with = "loose_string")]
    group_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    group_name: Option<String>,
}

/// Attachment as listed in a `dataMessage`; only `id` is needed to fetch it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    #[serde(default, deserialize_with = "loose_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub content_type: Option<String>,
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Optional scalars: a value of the wrong type reads as absent instead of
// rejecting the whole notification.
fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_string))
}

fn loose_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_i64))
}

fn quote_ref(quote: &Value) -> Option<QuoteRef> {
    let q = quote.as_object()?;
    Some(QuoteRef {
        id: q.get("id").and_then(value_i64),
        author: q.get("author").and_then(value_string),
        text: q.get("text").and_then(value_string),
    })
}

/// Why a notification produced no record. All of these are expected traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Receipts, typing indicators, sync messages.
    MissingContent,
    /// Direct message.
    NonGroup,
    /// Neither text nor attachments.
    Empty,
}

/// A group message ready to persist, plus the attachments to fetch for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub record: NewMessage,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Message(GroupMessage),
    Skipped(SkipReason),
}

fn is_blank(v: &Option<Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::Object(m)) => m.is_empty(),
        _ => false,
    }
}

/// Extract a group message from `receive` params.
///
/// Only structural mismatches (a non-object envelope, a non-list `attachments`) are
/// errors; optional scalar fields of the wrong type are read as absent.
pub fn extract_group_message(params: &Value) -> Result<Extracted, serde_json::Error> {
    let params: ReceiveParams = if params.is_null() {
        ReceiveParams::default()
    } else {
        ReceiveParams::deserialize(params)?
    };
    let Some(envelope) = params.envelope else {
        return Ok(Extracted::Skipped(SkipReason::MissingContent));
    };
    if is_blank(&envelope.data_message) {
        return Ok(Extracted::Skipped(SkipReason::MissingContent));
    }
    let data = DataMessage::deserialize(envelope.data_message.unwrap_or(Value::Null))?;

    if is_blank(&data.group_info) {
        return Ok(Extracted::Skipped(SkipReason::NonGroup));
    }
    let group = GroupInfo::deserialize(data.group_info.unwrap_or(Value::Null))?;

    let attachments = data.attachments.unwrap_or_default();
    let has_text = data.message.as_deref().is_some_and(|m| !m.is_empty());
    if !has_text && attachments.is_empty() {
        return Ok(Extracted::Skipped(SkipReason::Empty));
    }

    let quote = data.quote.as_ref().and_then(quote_ref);

    Ok(Extracted::Message(GroupMessage {
        record: NewMessage {
            source: envelope.source,
            source_name: envelope.source_name,
            timestamp: envelope.timestamp,
            message: data.message,
            group_id: group.group_id,
            group_name: group.group_name,
            quote,
        },
        attachments,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(data_message: Value) -> Value {
        json!({
            "account": "+15550000",
            "envelope": {
                "source": "+15550001",
                "sourceName": "Ada",
                "timestamp": 1700000000000i64,
                "dataMessage": data_message
            }
        })
    }

    #[test]
    fn group_text_message_is_extracted() {
        let p = params(json!({
            "message": "hello",
            "groupInfo": {"groupId": "G1", "groupName": "Team", "type": "DELIVER"}
        }));
        let Extracted::Message(m) = extract_group_message(&p).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(m.record.source.as_deref(), Some("+15550001"));
        assert_eq!(m.record.source_name.as_deref(), Some("Ada"));
        assert_eq!(m.record.timestamp, Some(1_700_000_000_000));
        assert_eq!(m.record.message.as_deref(), Some("hello"));
        assert_eq!(m.record.group_id.as_deref(), Some("G1"));
        assert_eq!(m.record.group_name.as_deref(), Some("Team"));
        assert!(m.record.quote.is_none());
        assert!(m.attachments.is_empty());
    }

    #[test]
    fn attachment_only_message_is_extracted() {
        let p = params(json!({
            "message": null,
            "attachments": [{"id": "a1", "contentType": "image/png", "size": 3}],
            "groupInfo": {"groupId": "G1", "groupName": "Team"}
        }));
        let Extracted::Message(m) = extract_group_message(&p).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(m.record.message, None);
        assert_eq!(m.attachments.len(), 1);
        assert_eq!(m.attachments[0].id.as_deref(), Some("a1"));
        assert_eq!(m.attachments[0].content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn quote_is_carried() {
        let p = params(json!({
            "message": "reply",
            "groupInfo": {"groupId": "G1"},
            "quote": {"id": 1699999999999i64, "author": "+15550002", "text": "original"}
        }));
        let Extracted::Message(m) = extract_group_message(&p).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(
            m.record.quote,
            Some(QuoteRef {
                id: Some(1_699_999_999_999),
                author: Some("+15550002".to_string()),
                text: Some("original".to_string()),
            })
        );
    }

    #[test]
    fn mistyped_optional_fields_read_as_absent() {
        let p = json!({
            "envelope": {
                "source": "+15550001",
                "sourceName": 7,
                "timestamp": "1700000000000",
                "dataMessage": {
                    "message": "hi",
                    "groupInfo": {"groupId": "G1", "groupName": ["Team"]},
                    "quote": {"id": "123", "author": null, "text": {"rich": true}}
                }
            }
        });
        let Extracted::Message(m) = extract_group_message(&p).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(m.record.source_name.as_deref(), Some("7"));
        assert_eq!(m.record.timestamp, Some(1_700_000_000_000));
        assert_eq!(m.record.group_id.as_deref(), Some("G1"));
        assert_eq!(m.record.group_name, None);
        assert_eq!(
            m.record.quote,
            Some(QuoteRef {
                id: Some(123),
                author: None,
                text: None,
            })
        );
    }

    #[test]
    fn non_object_quote_is_dropped() {
        let p = params(json!({"message": "hi", "groupInfo": {"groupId": "G1"}, "quote": "x"}));
        let Extracted::Message(m) = extract_group_message(&p).unwrap() else {
            panic!("expected message");
        };
        assert!(m.record.quote.is_none());
    }

    #[test]
    fn receipts_and_empty_payloads_are_missing_content() {
        let receipt = json!({"envelope": {"source": "+1", "receiptMessage": {"isDelivery": true}}});
        assert_eq!(
            extract_group_message(&receipt).unwrap(),
            Extracted::Skipped(SkipReason::MissingContent)
        );
        assert_eq!(
            extract_group_message(&params(json!({}))).unwrap(),
            Extracted::Skipped(SkipReason::MissingContent)
        );
        assert_eq!(
            extract_group_message(&Value::Null).unwrap(),
            Extracted::Skipped(SkipReason::MissingContent)
        );
    }

    #[test]
    fn direct_message_is_non_group() {
        let p = params(json!({"message": "hi"}));
        assert_eq!(
            extract_group_message(&p).unwrap(),
            Extracted::Skipped(SkipReason::NonGroup)
        );
    }

    #[test]
    fn no_text_no_attachments_is_empty() {
        let p = params(json!({"message": "", "attachments": [], "groupInfo": {"groupId": "G1"}}));
        assert_eq!(
            extract_group_message(&p).unwrap(),
            Extracted::Skipped(SkipReason::Empty)
        );
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let p = params(json!({"message": "hi", "groupInfo": {"groupId": "G1"}, "attachments": "nope"}));
        assert!(extract_group_message(&p).is_err());
    }
}
