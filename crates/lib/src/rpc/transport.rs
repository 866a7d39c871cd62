//! Line-framed transport to the agent: receive one line, send one request.

use crate::rpc::protocol::RpcRequest;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bidirectional framed channel to the agent.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next complete line (without the trailing newline). `Ok(None)` on EOF.
    ///
    /// Must be cancel safe: the ingestion loop selects on it against shutdown and
    /// timers, and a dropped call must not lose bytes already read.
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError>;

    /// Write one request as a single JSON line and flush.
    async fn send(&mut self, request: &RpcRequest) -> Result<(), TransportError>;
}

/// Transport over any buffered reader / writer pair (child stdio, duplex pipes, sockets).
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    /// Bytes of the current line so far; survives a cancelled `recv_line`.
    buf: Vec<u8>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
        }
    }

    /// Shut down the write side so the peer sees EOF on its input.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }

    async fn send(&mut self, request: &RpcRequest) -> Result<(), TransportError> {
        let mut line = request.to_line()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let input: &[u8] = b"{\"a\":1}\r\n{\"b\":2}\n";
        let mut t = LineTransport::new(BufReader::new(input), Vec::new());
        assert_eq!(t.recv_line().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(t.recv_line().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(t.recv_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unterminated_last_line_is_returned() {
        let input: &[u8] = b"{\"a\":1}";
        let mut t = LineTransport::new(BufReader::new(input), Vec::new());
        assert_eq!(t.recv_line().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(t.recv_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_read_keeps_partial_line() {
        let (mut agent, ours) = tokio::io::duplex(64);
        let mut t = LineTransport::new(BufReader::new(ours), tokio::io::sink());

        agent.write_all(b"{\"a\":").await.unwrap();
        tokio::select! {
            line = t.recv_line() => panic!("line completed early: {:?}", line),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }

        agent.write_all(b"1}\n").await.unwrap();
        assert_eq!(t.recv_line().await.unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn send_writes_one_json_line() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut t = LineTransport::new(BufReader::new(tokio::io::empty()), client);
        t.send(&RpcRequest::get_attachment("r1", "a1", Some("G1")))
            .await
            .unwrap();
        t.close().await.unwrap();
        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        assert!(out.ends_with('\n'));
        assert_eq!(out.matches('\n').count(), 1);
        assert!(out.contains("\"method\":\"getAttachment\""));
    }
}
