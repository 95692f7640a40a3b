// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread execution units: one OS thread with a private current-thread runtime

use super::{channel_pair, ExecutionUnitFactory, LaunchError, UnitEntry, UnitHandle};
use super::{UnitEndpoint, UnitExit, UnitKind, UnitSpec};
use async_trait::async_trait;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs each unit on a dedicated thread.
///
/// A panic inside the unit is caught at the thread boundary and reported as a
/// failed exit, so it does not take the host down with it.
#[derive(Clone)]
pub struct ThreadUnitFactory {
    entry: UnitEntry,
}

impl ThreadUnitFactory {
    pub fn new(entry: UnitEntry) -> Self {
        Self { entry }
    }
}

#[async_trait]
impl ExecutionUnitFactory for ThreadUnitFactory {
    fn kind(&self) -> UnitKind {
        UnitKind::Thread
    }

    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError> {
        let (handle, endpoint, exit_tx) = channel_pair(UnitKind::Thread, None);
        let entry = self.entry.clone();
        let name = format!("unit-{}", spec.account_id());

        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let exit = run_isolated(entry, spec, endpoint);
                let _ = exit_tx.send(exit);
            })
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        Ok(handle)
    }
}

fn run_isolated(entry: UnitEntry, spec: UnitSpec, endpoint: UnitEndpoint) -> UnitExit {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return UnitExit::failed(format!("runtime: {}", e)),
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(entry(spec, endpoint))
    }));

    match outcome {
        Ok(Ok(())) => UnitExit::clean(),
        Ok(Err(e)) => UnitExit::failed(e),
        Err(payload) => UnitExit::failed(format!("panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
