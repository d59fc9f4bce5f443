//! In-process transport used to drive the real-time provider without a network.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{Connection, TokenSource, Transport};
use crate::MarketDataError;

type Inbound = Result<String, MarketDataError>;

/// Transport that hands out pre-queued connections.
///
/// Every `connect` call is recorded. Once the queue is empty, further
/// attempts fail with a transport error.
#[derive(Default)]
pub struct MemoryTransport {
    queued: Mutex<VecDeque<Result<MemoryConnection, MarketDataError>>>,
    attempts: Mutex<Vec<Instant>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection and returns the feed-side peer.
    pub fn push_connection(&self) -> MemoryPeer {
        let (connection, peer) = memory_pair();
        self.lock_queue().push_back(Ok(connection));
        peer
    }

    /// Queues a failing connect attempt.
    pub fn push_failure(&self, error: MarketDataError) {
        self.lock_queue().push_back(Err(error));
    }

    /// Runtime instants of every connect attempt so far.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .expect("memory transport lock is not poisoned")
            .clone()
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Result<MemoryConnection, MarketDataError>>> {
        self.queued
            .lock()
            .expect("memory transport lock is not poisoned")
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, MarketDataError>> {
        self.attempts
            .lock()
            .expect("memory transport lock is not poisoned")
            .push(Instant::now());
        let next = self.lock_queue().pop_front();
        Box::pin(async move {
            match next {
                Some(Ok(connection)) => Ok(Box::new(connection) as Box<dyn Connection>),
                Some(Err(error)) => Err(error),
                None => Err(MarketDataError::Transport(String::from(
                    "no connection available",
                ))),
            }
        })
    }
}

fn memory_pair() -> (MemoryConnection, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    (
        MemoryConnection {
            inbound: inbound_rx,
            outbound: outbound_tx,
        },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        },
    )
}

/// Provider side of an in-process connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection for MemoryConnection {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), MarketDataError>> {
        let sent = self
            .outbound
            .send(text)
            .map_err(|_| MarketDataError::Transport(String::from("peer is gone")));
        Box::pin(async move { sent })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Inbound>> {
        Box::pin(self.inbound.recv())
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        self.inbound.close();
        Box::pin(async {})
    }
}

/// Feed side of an in-process connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Delivers a text frame to the provider.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(text.into())).is_ok())
    }

    /// Fails the connection with `error`.
    pub fn fail(&self, error: MarketDataError) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Closes the connection from the feed side.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next frame the provider sent.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Frames the provider already sent, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Token source returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenSource for StaticTokenSource {
    fn acquire(&self) -> BoxFuture<'_, Result<String, MarketDataError>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }
}
