use anyhow::Result;
use rusqlite::Connection;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            source                  TEXT,
            sourceName              TEXT,
            timestamp               INTEGER,
            message                 TEXT,
            groupId                 TEXT,
            groupName               TEXT,
            attachmentPaths         TEXT NOT NULL DEFAULT '[]',
            attachmentDescriptions  TEXT NOT NULL DEFAULT '',
            processedAt             INTEGER,
            quoteId                 INTEGER,
            quoteAuthor             TEXT,
            quoteText               TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(groupId, timestamp);
        ",
    )?;

    log::debug!("database migrations complete");
    Ok(())
}
