// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fh-core: shared building blocks for the fieldhand runtime
//!
//! This crate provides:
//! - A clock abstraction so timing logic can be driven by tests
//! - The account, credential, and config snapshot model
//! - The control-channel envelope spoken between the engine and its units
//! - A namespaced task scheduler with overlap control and introspection
//! - A three-state circuit breaker for fragile dependencies

pub mod account;
pub mod breaker;
pub mod clock;
pub mod control;
pub mod scheduler;

pub use account::{Account, ConfigSnapshot, Credentials};
pub use breaker::{BreakerConfig, BreakerError, BreakerState, BreakerStatus, CircuitBreaker};
pub use clock::{epoch_ms, Clock, FakeClock, SystemClock};
pub use control::{
    decode_line, encode_line, ControlError, ControlMessage, LogEntry, LogLevel, UnitMessage,
};
pub use scheduler::{
    NamespaceSnapshot, RecurringOptions, RegistrySnapshot, Scheduler, SchedulerError,
    SchedulerRegistry, TaskKind, TaskSnapshot,
};
