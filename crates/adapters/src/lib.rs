// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: execution units, notifications, config sources

pub mod notify;
pub mod source;
pub mod traced;
pub mod unit;

pub use notify::{
    NoOpNotifyAdapter, Notice, NotifyAdapter, NotifyError, WebhookConfig, WebhookNotifyAdapter,
};
pub use source::{ConfigSource, HttpConfigSource, HttpSourceConfig, SourceError};
pub use traced::{TracedConfigSource, TracedNotifyAdapter, TracedUnitFactory};
pub use unit::{
    attach, attach_stdio, ExecutionUnitFactory, LaunchError, ProcessConfig, ProcessUnitFactory,
    StdioUnit, ThreadUnitFactory, UnitEndpoint, UnitEntry, UnitExit, UnitFactory, UnitHandle,
    UnitKind, UnitSpec,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use source::FakeConfigSource;
#[cfg(any(test, feature = "test-support"))]
pub use unit::{FakeUnit, FakeUnitFactory};

#[cfg(test)]
mod test_http;
