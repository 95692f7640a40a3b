// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fieldhand daemon: settings, control socket, lifecycle, and host jobs
//!
//! The `fhd` binary is a thin shell over these modules.

pub mod client;
pub mod jobs;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod settings;
pub mod units;
pub mod wiring;

pub use protocol::{Request, Response};
pub use settings::Settings;
