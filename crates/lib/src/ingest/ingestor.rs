//! `receive` notification -> stored message + one `getAttachment` request per attachment.

use crate::ingest::envelope::{extract_group_message, Extracted, SkipReason};
use crate::rpc::{CorrelationTable, PendingAttachment, RpcRequest, Transport, TransportError};
use crate::store::Database;
use serde_json::Value;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed receive payload: {0}")]
    Extract(#[from] serde_json::Error),
    #[error("storing message: {0:#}")]
    Store(anyhow::Error),
    #[error("sending getAttachment: {0}")]
    Transport(#[from] TransportError),
}

impl IngestError {
    /// Store and transport failures end the loop; a bad payload only drops the notification.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::Extract(_))
    }
}

/// Result of ingesting one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Stored {
        message_id: i64,
        /// Request ids issued, in attachment order.
        requests: Vec<String>,
    },
    Skipped(SkipReason),
}

/// Persist a group message from `receive` params and request its attachments.
///
/// The insert is committed before any request is written; attachment paths are
/// filled in later by the resolver, one response at a time.
pub async fn ingest_receive<T>(
    params: &Value,
    store: &Database,
    transport: &mut T,
    pending: &mut CorrelationTable,
) -> Result<Ingested, IngestError>
where
    T: Transport + ?Sized,
{
    let msg = match extract_group_message(params)? {
        Extracted::Message(m) => m,
        Extracted::Skipped(reason) => {
            log::debug!("receive: no record ({:?})", reason);
            return Ok(Ingested::Skipped(reason));
        }
    };

    let message_id = store
        .insert_message(&msg.record)
        .map_err(IngestError::Store)?;
    log::info!(
        "saved message {} from {} in group {}",
        message_id,
        msg.record.source.as_deref().unwrap_or("?"),
        msg.record.group_name.as_deref().unwrap_or("?")
    );

    let group_id = msg.record.group_id.as_deref();
    let mut requests = Vec::with_capacity(msg.attachments.len());
    for attachment in &msg.attachments {
        let Some(attachment_id) = attachment.id.as_deref().filter(|id| !id.is_empty()) else {
            log::warn!("message {}: attachment without id, cannot fetch", message_id);
            continue;
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let request_id = pending.next_request_id(now_ms, attachment_id);
        let request = RpcRequest::get_attachment(request_id.clone(), attachment_id, group_id);
        log::debug!(
            "message {}: requesting attachment {} ({})",
            message_id,
            attachment_id,
            attachment.content_type.as_deref().unwrap_or("unknown type")
        );
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(line) = request.to_line() {
                log::debug!("sending rpc request: {}", line);
            }
        }
        transport.send(&request).await?;
        pending.insert(
            request_id.clone(),
            PendingAttachment {
                message_id,
                attachment_id: attachment_id.to_string(),
                issued_at: Instant::now(),
            },
        );
        requests.push(request_id);
    }

    Ok(Ingested::Stored {
        message_id,
        requests,
    })
}
