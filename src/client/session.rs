//! Per-connection read loop.
//!
//! # Responsibilities
//! - Own the socket halves, write buffer and subscription index
//! - Parse control lines and payloads, answer `PING`, run the auth check
//! - Enforce the auth deadline and the ping/stale timer
//! - Deregister through [`Client::close_connection`] on exit
//!
//! # Design Decisions
//! - Reads use `read` into an owned buffer so `select!` never loses bytes
//! - Replies are buffered and flushed once per read pass
//! - No pending-flush set of peer connections: messages are never routed to
//!   other clients, so the only buffer to flush is this connection's own

use std::collections::HashMap;
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

use crate::client::protocol::{self, ClientOp, ProtocolError, MAX_CONTROL_LINE};
use crate::client::Client;
use crate::server::auth::AuthGate;
use crate::server::stats::Stats;

const READ_CHUNK: usize = 4096;

/// Timer settings shared by every connection of a server.
#[derive(Debug, Clone)]
pub struct SessionTimers {
    /// Armed only when the server requires authentication.
    pub auth_timeout: Option<Duration>,
    pub ping_interval: Duration,
    pub max_pings_out: u32,
}

/// Server-wide, read-only inputs to every session.
#[derive(Debug)]
pub struct SessionContext {
    pub auth: Arc<AuthGate>,
    /// Server aggregate counters.
    pub stats: Arc<Stats>,
    pub max_payload: usize,
    pub write_buffer_size: usize,
    pub timers: SessionTimers,
}

/// Timers armed for one connection at creation time.
#[derive(Debug)]
pub struct ArmedTimers {
    auth_deadline: Option<Pin<Box<Sleep>>>,
    ping: Interval,
}

impl ArmedTimers {
    pub fn arm(timers: &SessionTimers) -> Self {
        let auth_deadline = timers.auth_timeout.map(|timeout| Box::pin(time::sleep(timeout)));

        let mut ping = time::interval_at(Instant::now() + timers.ping_interval, timers.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { auth_deadline, ping }
    }

    pub fn auth_armed(&self) -> bool {
        self.auth_deadline.is_some()
    }

    fn disarm_auth(&mut self) {
        self.auth_deadline = None;
    }
}

#[derive(Debug)]
struct Subscription {
    subject: String,
    queue: Option<String>,
    max: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct PendingPub {
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    ReadError,
    WriteError,
    Forced,
    AuthTimeout,
    Stale,
    ProtocolViolation,
}

/// The task that owns one connection's socket and private state.
pub struct Session {
    client: Arc<Client>,
    ctx: Arc<SessionContext>,
    reader: OwnedReadHalf,
    writer: BufWriter<OwnedWriteHalf>,
    timers: ArmedTimers,
    read_buf: Vec<u8>,
    pending_pub: Option<PendingPub>,
    subs: HashMap<String, Subscription>,
    authorized: bool,
    verbose: bool,
    pings_out: u32,
}

impl Session {
    pub fn new(
        client: Arc<Client>,
        ctx: Arc<SessionContext>,
        stream: TcpStream,
        timers: ArmedTimers,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        let writer = BufWriter::with_capacity(ctx.write_buffer_size, writer);
        let authorized = !ctx.auth.is_required();
        Self {
            client,
            ctx,
            reader,
            writer,
            timers,
            read_buf: Vec::with_capacity(READ_CHUNK),
            pending_pub: None,
            subs: HashMap::new(),
            authorized,
            verbose: true,
            pings_out: 0,
        }
    }

    /// Run until the connection ends, then release the socket and deregister.
    pub async fn run(mut self) {
        let mut close_rx = self.client.close_signal();
        let mut chunk = vec![0u8; READ_CHUNK];

        let reason = loop {
            tokio::select! {
                _ = closed(&mut close_rx) => break CloseReason::Forced,
                _ = deadline(&mut self.timers.auth_deadline) => {
                    tracing::debug!(connection_id = %self.client.id(), "Authorization timeout");
                    let _ = self.send_err("Authorization Timeout").await;
                    break CloseReason::AuthTimeout;
                }
                _ = self.timers.ping.tick() => {
                    if let Some(reason) = self.on_ping_timer().await {
                        break reason;
                    }
                }
                read = self.reader.read(&mut chunk) => match read {
                    Ok(0) => break CloseReason::ClientClosed,
                    Ok(n) => {
                        self.read_buf.extend_from_slice(&chunk[..n]);
                        let flow = self.process_buffer().await;
                        if self.writer.flush().await.is_err() {
                            break CloseReason::WriteError;
                        }
                        if flow == Flow::Close {
                            break CloseReason::ProtocolViolation;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %self.client.id(), error = %e, "Client read error");
                        break CloseReason::ReadError;
                    }
                },
            }
        };

        let _ = self.writer.flush().await;
        let _ = self.writer.shutdown().await;
        tracing::trace!(connection_id = %self.client.id(), reason = ?reason, "Session finished");
        self.client.close_connection();
    }

    async fn on_ping_timer(&mut self) -> Option<CloseReason> {
        if self.pings_out >= self.ctx.timers.max_pings_out {
            tracing::debug!(connection_id = %self.client.id(), "Stale client connection");
            let _ = self.send_err("Stale Connection").await;
            return Some(CloseReason::Stale);
        }
        self.pings_out += 1;
        if self.write(protocol::PING).await.is_err() || self.writer.flush().await.is_err() {
            return Some(CloseReason::WriteError);
        }
        None
    }

    /// Consume every complete operation in the read buffer.
    async fn process_buffer(&mut self) -> Flow {
        loop {
            if let Some(pending) = self.pending_pub {
                let needed = pending.size + 2;
                if self.read_buf.len() < needed {
                    return Flow::Continue;
                }
                let frame: Vec<u8> = self.read_buf.drain(..needed).collect();
                self.pending_pub = None;
                if !frame.ends_with(b"\r\n") {
                    return self.reject(ProtocolError::UnterminatedPayload).await;
                }
                if self.on_payload(pending.size).await == Flow::Close {
                    return Flow::Close;
                }
                continue;
            }

            let Some(end) = self.read_buf.iter().position(|b| *b == b'\n') else {
                if self.read_buf.len() > MAX_CONTROL_LINE {
                    return self.reject(ProtocolError::ControlLineTooLong).await;
                }
                return Flow::Continue;
            };

            let line: Vec<u8> = self.read_buf.drain(..=end).collect();
            let parsed = match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => protocol::parse_op(text),
                Err(_) => Err(ProtocolError::InvalidEncoding),
            };

            let flow = match parsed {
                Ok(op) => self.on_op(op).await,
                Err(e) => self.reject(e).await,
            };
            if flow == Flow::Close {
                return Flow::Close;
            }
        }
    }

    async fn on_op(&mut self, op: ClientOp) -> Flow {
        if !self.authorized && !matches!(op, ClientOp::Connect(_) | ClientOp::Ping | ClientOp::Pong) {
            return self.violation("Authorization Violation").await;
        }

        match op {
            ClientOp::Connect(options) => {
                self.verbose = options.verbose;
                let credentials = options.credentials;
                if !self.authorized {
                    if !self.ctx.auth.check(&credentials) {
                        tracing::debug!(connection_id = %self.client.id(), "Authorization failed");
                        return self.violation("Authorization Violation").await;
                    }
                    self.authorized = true;
                    self.timers.disarm_auth();
                }
                self.client.record_credentials(credentials);
                self.ok().await
            }
            ClientOp::Ping => self.reply(protocol::PONG).await,
            ClientOp::Pong => {
                self.pings_out = 0;
                Flow::Continue
            }
            ClientOp::Sub { subject, queue, sid } => {
                self.subs.insert(sid, Subscription { subject, queue, max: None });
                self.client.set_subscription_count(self.subs.len());
                self.ok().await
            }
            ClientOp::Unsub { sid, max } => {
                match max {
                    Some(max) => {
                        if let Some(sub) = self.subs.get_mut(&sid) {
                            sub.max = Some(max);
                        }
                    }
                    None => {
                        if let Some(sub) = self.subs.remove(&sid) {
                            tracing::trace!(
                                connection_id = %self.client.id(),
                                subject = %sub.subject,
                                queue = ?sub.queue,
                                "Unsubscribed"
                            );
                        }
                    }
                }
                self.client.set_subscription_count(self.subs.len());
                self.ok().await
            }
            ClientOp::Pub { size, .. } => {
                if size > self.ctx.max_payload {
                    return self
                        .reject(ProtocolError::MaxPayload {
                            size,
                            max: self.ctx.max_payload,
                        })
                        .await;
                }
                self.pending_pub = Some(PendingPub { size });
                Flow::Continue
            }
        }
    }

    async fn on_payload(&mut self, size: usize) -> Flow {
        self.client.stats().record_inbound(size);
        self.ctx.stats.record_inbound(size);
        self.ok().await
    }

    async fn ok(&mut self) -> Flow {
        if self.verbose {
            self.reply(protocol::OK).await
        } else {
            Flow::Continue
        }
    }

    async fn reply(&mut self, bytes: &[u8]) -> Flow {
        match self.write(bytes).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Close,
        }
    }

    async fn reject(&mut self, err: ProtocolError) -> Flow {
        tracing::debug!(connection_id = %self.client.id(), error = %err, "Protocol error");
        self.violation(err.client_message()).await
    }

    async fn violation(&mut self, message: &str) -> Flow {
        let _ = self.send_err(message).await;
        Flow::Close
    }

    async fn send_err(&mut self, message: &str) -> std::io::Result<()> {
        self.write(&protocol::err_line(message)).await?;
        self.writer.flush().await
    }

    /// Buffer one outbound frame and count it.
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.client.stats().record_outbound(bytes.len());
        self.ctx.stats.record_outbound(bytes.len());
        Ok(())
    }
}

async fn closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn deadline(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
