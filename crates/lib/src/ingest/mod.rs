//! Group message ingestion and attachment resolution.
//!
//! A `receive` notification becomes at most one stored message plus one `getAttachment`
//! request per attachment. Each matching response is decoded, written to the attachment
//! directory and appended to the message's path list.

mod envelope;
mod ingestor;
mod mime;
mod resolver;

pub use envelope::{extract_group_message, AttachmentRef, Extracted, GroupMessage, SkipReason};
pub use ingestor::{ingest_receive, IngestError, Ingested};
pub use mime::{extension_for, DEFAULT_CONTENT_TYPE};
pub use resolver::{attachment_file_name, resolve_response, ResolveError, Resolved};
