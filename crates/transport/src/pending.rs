// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outstanding requests keyed by client sequence number

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::CallError;
use crate::transport::Reply;

pub(crate) type ReplySink = oneshot::Sender<Result<Reply, CallError>>;

pub(crate) struct PendingCall {
    pub method: String,
    pub sink: ReplySink,
}

#[derive(Default)]
pub(crate) struct PendingCalls {
    calls: HashMap<u64, PendingCall>,
}

impl PendingCalls {
    /// Register a call. A sequence number is never reused while its call is
    /// outstanding, so an existing entry is a bug upstream.
    pub fn insert(&mut self, seq: u64, call: PendingCall) {
        if let Some(previous) = self.calls.insert(seq, call) {
            tracing::error!(seq, method = %previous.method, "sequence reused while pending");
            let _ = previous.sink.send(Err(CallError::Discarded {
                method: previous.method,
            }));
        }
    }

    pub fn take(&mut self, seq: u64) -> Option<PendingCall> {
        self.calls.remove(&seq)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Reject every outstanding call, returning their sequence numbers
    pub fn fail_all(&mut self, error: impl Fn(&str) -> CallError) -> Vec<u64> {
        let mut seqs = Vec::with_capacity(self.calls.len());
        for (seq, call) in self.calls.drain() {
            let _ = call.sink.send(Err(error(&call.method)));
            seqs.push(seq);
        }
        seqs
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
