use crate::store::models::{MessageRow, NewMessage, QuoteRef};
use crate::store::Database;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row};

const MESSAGE_COLUMNS: &str = "id, source, sourceName, timestamp, message, groupId, groupName, \
     attachmentPaths, attachmentDescriptions, processedAt, quoteId, quoteAuthor, quoteText";

impl Database {
    /// Insert a message with an empty attachment list. Returns the assigned id.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<i64> {
        self.with_conn(|conn| {
            let quote = msg.quote.as_ref();
            conn.execute(
                "INSERT INTO messages (source, sourceName, timestamp, message, groupId, groupName, \
                 attachmentPaths, attachmentDescriptions, processedAt, quoteId, quoteAuthor, quoteText) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    msg.source,
                    msg.source_name,
                    msg.timestamp,
                    msg.message,
                    msg.group_id,
                    msg.group_name,
                    encode_paths(&[])?,
                    "",
                    None::<i64>,
                    quote.and_then(|q| q.id),
                    quote.and_then(|q| q.author.as_deref()),
                    quote.and_then(|q| q.text.as_deref()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Current attachment paths of a message; `None` if the message does not exist.
    pub fn attachment_paths(&self, id: i64) -> Result<Option<Vec<String>>> {
        self.with_conn(|conn| {
            let raw: Option<Option<String>> = conn
                .query_row(
                    "SELECT attachmentPaths FROM messages WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|s| decode_paths(s.as_deref())).transpose()
        })
    }

    /// Overwrite the attachment path list. Returns false if the message does not exist.
    pub fn set_attachment_paths(&self, id: i64, paths: &[String]) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET attachmentPaths = ?1 WHERE id = ?2",
                rusqlite::params![encode_paths(paths)?, id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Newest first.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages ORDER BY id DESC LIMIT ?1",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], read_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(finish_row).collect()
        })
    }
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    let raw = conn.query_row(&sql, [id], read_row).optional()?;
    raw.map(finish_row).transpose()
}

/// Row as read from SQLite, with the path list still serialized.
struct RawRow {
    row: MessageRow,
    paths: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    let quote_id: Option<i64> = row.get(10)?;
    let quote_author: Option<String> = row.get(11)?;
    let quote_text: Option<String> = row.get(12)?;
    let quote = if quote_id.is_some() || quote_author.is_some() || quote_text.is_some() {
        Some(QuoteRef {
            id: quote_id,
            author: quote_author,
            text: quote_text,
        })
    } else {
        None
    };
    Ok(RawRow {
        row: MessageRow {
            id: row.get(0)?,
            source: row.get(1)?,
            source_name: row.get(2)?,
            timestamp: row.get(3)?,
            message: row.get(4)?,
            group_id: row.get(5)?,
            group_name: row.get(6)?,
            attachment_paths: Vec::new(),
            attachment_descriptions: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            processed_at: row.get(9)?,
            quote,
        },
        paths: row.get(7)?,
    })
}

fn finish_row(raw: RawRow) -> Result<MessageRow> {
    let mut row = raw.row;
    row.attachment_paths = decode_paths(raw.paths.as_deref())?;
    Ok(row)
}

fn encode_paths(paths: &[String]) -> Result<String> {
    serde_json::to_string(paths).context("encoding attachment paths")
}

/// NULL and empty text decode to an empty list (rows written by older tools).
fn decode_paths(raw: Option<&str>) -> Result<Vec<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s).context("decoding attachment paths"),
    }
}
