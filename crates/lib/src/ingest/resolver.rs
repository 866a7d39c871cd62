//! Complete a pending `getAttachment`: decode, write the file, link it to the message.

use crate::ingest::mime::{self, DEFAULT_CONTENT_TYPE};
use crate::rpc::{CorrelationTable, RpcError};
use crate::store::Database;
use base64::Engine;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("response for unknown request id {0}")]
    UnknownCorrelation(String),
    #[error("failed to download attachment {attachment_id}: {reason}")]
    FetchFailed {
        attachment_id: String,
        reason: String,
    },
    #[error("writing attachment to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("message {message_id} not found, attachment {} left unlinked", .path.display())]
    Orphaned { message_id: i64, path: PathBuf },
    #[error("updating attachment paths: {0:#}")]
    Store(anyhow::Error),
}

impl ResolveError {
    /// Only store failures are fatal; everything else leaves a gap and moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResolveError::Store(_))
    }
}

/// A successfully linked attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub message_id: i64,
    pub attachment_id: String,
    pub path: PathBuf,
    /// False when the path was already linked (same file fetched twice).
    pub appended: bool,
}

/// File name for a saved attachment.
///
/// An id that already contains a `.` is used verbatim; otherwise the extension for
/// `content_type` is appended (nothing if unknown). Only the final path component is
/// kept so the file always lands directly in the attachment directory.
pub fn attachment_file_name(attachment_id: &str, content_type: &str) -> Option<String> {
    let name = if attachment_id.contains('.') {
        attachment_id.to_string()
    } else {
        format!("{}{}", attachment_id, mime::extension_for(content_type))
    };
    Path::new(&name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Handle one response frame against the pending table.
pub async fn resolve_response(
    request_id: &str,
    result: Option<&Value>,
    error: Option<&RpcError>,
    pending: &mut CorrelationTable,
    store: &Database,
    attachment_dir: &Path,
) -> Result<Resolved, ResolveError> {
    let entry = pending
        .take(request_id)
        .ok_or_else(|| ResolveError::UnknownCorrelation(request_id.to_string()))?;
    let attachment_id = entry.attachment_id;
    let fetch_failed = |reason: String| ResolveError::FetchFailed {
        attachment_id: attachment_id.clone(),
        reason,
    };

    let Some(result) = result else {
        let reason = match error {
            Some(e) => format!("agent error {}: {}", e.code, e.message),
            None => "no result in response".to_string(),
        };
        return Err(fetch_failed(reason));
    };
    let Some(data) = result.get("data").and_then(Value::as_str) else {
        return Err(fetch_failed(format!(
            "no data in attachment response for request id {}",
            request_id
        )));
    };
    let content_type = result
        .get("contentType")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| fetch_failed(format!("invalid base64 payload: {}", e)))?;

    let file_name = attachment_file_name(&attachment_id, content_type)
        .ok_or_else(|| fetch_failed("attachment id is not a usable file name".to_string()))?;
    let path = attachment_dir.join(&file_name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|source| ResolveError::Write {
            path: path.clone(),
            source,
        })?;
    log::info!(
        "downloaded attachment {} to {} ({} bytes)",
        attachment_id,
        path.display(),
        bytes.len()
    );

    let message_id = entry.message_id;
    let Some(mut paths) = store
        .attachment_paths(message_id)
        .map_err(ResolveError::Store)?
    else {
        return Err(ResolveError::Orphaned { message_id, path });
    };
    let path_str = path.to_string_lossy().into_owned();
    let appended = !paths.contains(&path_str);
    if appended {
        paths.push(path_str);
        if !store
            .set_attachment_paths(message_id, &paths)
            .map_err(ResolveError::Store)?
        {
            return Err(ResolveError::Orphaned { message_id, path });
        }
        log::info!("updated message {} with attachment {}", message_id, path.display());
    } else {
        log::debug!("message {} already links {}", message_id, path.display());
    }

    Ok(Resolved {
        message_id,
        attachment_id,
        path,
        appended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_with_dot_is_used_verbatim() {
        assert_eq!(
            attachment_file_name("photo.png", "image/jpeg").as_deref(),
            Some("photo.png")
        );
    }

    #[test]
    fn extension_from_content_type() {
        assert_eq!(
            attachment_file_name("abc123", "image/png").as_deref(),
            Some("abc123.png")
        );
        assert_eq!(
            attachment_file_name("a1", "text/plain").as_deref(),
            Some("a1.txt")
        );
    }

    #[test]
    fn unknown_content_type_adds_nothing() {
        assert_eq!(
            attachment_file_name("abc123", "application/x-unknown").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn path_components_are_stripped() {
        assert_eq!(
            attachment_file_name("../../etc/passwd.txt", "text/plain").as_deref(),
            Some("passwd.txt")
        );
        assert_eq!(attachment_file_name("..", "text/plain"), None);
    }
}
