// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory connector for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use fh_core::Credentials;
use tokio::sync::mpsc;

use super::{Connector, Link, LinkError, LinkEvent};
use crate::frame::{Frame, FrameMeta};
use crate::push::PushEvent;

struct FakeInner {
    servers_tx: mpsc::UnboundedSender<FakeServer>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeServer>>,
    failures: Mutex<VecDeque<LinkError>>,
    opened: Mutex<Vec<Credentials>>,
}

/// Fake connector. Each successful `open` hands the server end of the new
/// link to [`FakeConnector::accept`].
#[derive(Clone)]
pub struct FakeConnector {
    inner: Arc<FakeInner>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(FakeInner {
                servers_tx,
                servers_rx: tokio::sync::Mutex::new(servers_rx),
                failures: Mutex::new(VecDeque::new()),
                opened: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make the next `open` fail with `error`
    pub fn fail_next(&self, error: LinkError) {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Wait for the next link to be opened
    pub async fn accept(&self) -> FakeServer {
        let mut rx = self.inner.servers_rx.lock().await;
        match rx.recv().await {
            Some(server) => server,
            None => unreachable!("connector owns the sender"),
        }
    }

    /// Credentials of every attempted open, failed ones included
    pub fn opened(&self) -> Vec<Credentials> {
        self.inner
            .opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened().len()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, credentials: &Credentials) -> Result<Link, LinkError> {
        self.inner
            .opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(credentials.clone());
        let failure = self
            .inner
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.inner.servers_tx.send(FakeServer {
            from_client: out_rx,
            to_client: in_tx,
            server_seq: 0,
        });
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Server end of a fake link
pub struct FakeServer {
    from_client: mpsc::UnboundedReceiver<Bytes>,
    to_client: mpsc::UnboundedSender<LinkEvent>,
    server_seq: u64,
}

impl FakeServer {
    /// Next frame from the client, or `None` once the client hung up
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        let bytes = self.from_client.recv().await?;
        Frame::decode(&bytes).ok()
    }

    /// Receive the login request and accept it
    pub async fn accept_login(&mut self) -> FrameMeta {
        let login = self.recv_frame().await;
        let Some(login) = login else {
            unreachable!("client hung up before logging in");
        };
        self.reply(&login.meta, b"{}");
        login.meta
    }

    pub fn reply(&mut self, request: &FrameMeta, body: &[u8]) {
        self.server_seq += 1;
        let frame = Frame::response_to(request, self.server_seq, Bytes::copy_from_slice(body));
        self.send_frame(&frame);
    }

    pub fn reply_error(&mut self, request: &FrameMeta, code: i64, message: &str) {
        self.server_seq += 1;
        let frame = Frame::error_to(request, self.server_seq, code, message);
        self.send_frame(&frame);
    }

    pub fn push(&mut self, tag: &str, payload: &[u8]) {
        self.server_seq += 1;
        if let Ok(body) = PushEvent::encode(tag, payload) {
            let frame = Frame::notify(self.server_seq, body);
            self.send_frame(&frame);
        }
    }

    pub fn send_raw(&self, bytes: Bytes) {
        let _ = self.to_client.send(LinkEvent::Frame(bytes));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(LinkEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub fn fail(&self, message: &str) {
        let _ = self.to_client.send(LinkEvent::Failed {
            message: message.to_string(),
        });
    }

    fn send_frame(&self, frame: &Frame) {
        if let Ok(bytes) = frame.encode() {
            self.send_raw(bytes);
        }
    }
}
