//! Ingestion loop: one task reading frames from the agent and handling each to completion.
//!
//! The loop owns the transport, the store and the correlation table. Nothing else
//! touches them while it runs, so frames are processed strictly one at a time and
//! the read-modify-write of attachment paths needs no locking.

use crate::ingest::{self, Ingested, ResolveError, Resolved};
use crate::rpc::{decode_frame, CorrelationTable, Frame, Transport, METHOD_RECEIVE};
use crate::store::Database;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// How often stale pending requests are swept when expiry is enabled.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future completed.
    Shutdown,
    /// The agent closed its output.
    Eof,
}

/// Outcome of handling one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Blank line.
    Blank,
    Ingested(Ingested),
    Resolved(Resolved),
    /// Logged and discarded (bad JSON, unknown frame, failed or unknown response).
    Dropped,
}

pub struct Engine<T> {
    transport: T,
    store: Database,
    pending: CorrelationTable,
    attachment_dir: PathBuf,
    pending_ttl: Option<Duration>,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T, store: Database, attachment_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            store,
            pending: CorrelationTable::new(),
            attachment_dir: attachment_dir.into(),
            pending_ttl: None,
        }
    }

    /// Evict pending requests that have waited longer than `ttl`. `None` keeps them forever.
    pub fn with_pending_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Database {
        &self.store
    }

    pub fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn attachment_dir(&self) -> &Path {
        &self.attachment_dir
    }

    /// Read and handle frames until `shutdown` completes or the agent closes its output.
    ///
    /// A frame being handled is always finished before shutdown is observed. Returns an
    /// error only for fatal conditions: store failures and a broken transport.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<StopReason>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let sweeping = self.pending_ttl.is_some();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("shutdown requested, stopping ingestion loop");
                    return Ok(StopReason::Shutdown);
                }
                line = self.transport.recv_line() => {
                    match line.context("reading from agent")? {
                        Some(line) => {
                            self.handle_line(&line).await?;
                        }
                        None => {
                            log::info!("agent closed its output");
                            return Ok(StopReason::Eof);
                        }
                    }
                }
                _ = sweep.tick(), if sweeping => {
                    self.sweep_expired(Instant::now());
                }
            }
        }
    }

    /// Decode one line and dispatch it. Non-fatal problems are logged and reported as
    /// `Handled::Dropped`.
    pub async fn handle_line(&mut self, line: &str) -> Result<Handled> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Handled::Blank);
        }
        let frame = match decode_frame(line) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to parse frame ({}): {}", e, line);
                return Ok(Handled::Dropped);
            }
        };
        log::debug!("received frame: {}", line);

        match frame {
            Frame::Notification { method, params } if method == METHOD_RECEIVE => {
                match ingest::ingest_receive(
                    &params,
                    &self.store,
                    &mut self.transport,
                    &mut self.pending,
                )
                .await
                {
                    Ok(ingested) => Ok(Handled::Ingested(ingested)),
                    Err(e) if e.is_fatal() => Err(e.into()),
                    Err(e) => {
                        log::error!("error processing message: {}", e);
                        Ok(Handled::Dropped)
                    }
                }
            }
            Frame::Notification { method, .. } => {
                log::debug!("ignoring notification {}", method);
                Ok(Handled::Dropped)
            }
            Frame::Response { id, result, error } => {
                match ingest::resolve_response(
                    &id,
                    result.as_ref(),
                    error.as_ref(),
                    &mut self.pending,
                    &self.store,
                    &self.attachment_dir,
                )
                .await
                {
                    Ok(resolved) => Ok(Handled::Resolved(resolved)),
                    Err(e) if e.is_fatal() => Err(e.into()),
                    Err(e @ ResolveError::UnknownCorrelation(_)) => {
                        log::error!("{}", e);
                        Ok(Handled::Dropped)
                    }
                    Err(e) => {
                        log::error!("attachment not saved: {}", e);
                        Ok(Handled::Dropped)
                    }
                }
            }
            Frame::Unrecognized { raw } => {
                log::warn!("unknown message type: {}", raw);
                Ok(Handled::Dropped)
            }
        }
    }

    /// Evict pending requests older than the configured ttl. Returns how many were evicted.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.pending_ttl else {
            return 0;
        };
        let evicted = self.pending.expire(now, ttl);
        for (request_id, p) in &evicted {
            log::warn!(
                "no response for request {} within {}s; message {} will lack attachment {}",
                request_id,
                ttl.as_secs(),
                p.message_id,
                p.attachment_id
            );
        }
        evicted.len()
    }

    /// Tear down: discard outstanding requests and hand back the transport and store.
    pub fn into_parts(mut self) -> (T, Database) {
        let outstanding = self.pending.clear();
        if outstanding > 0 {
            log::info!("discarding {} pending attachment requests", outstanding);
        }
        (self.transport, self.store)
    }
}
