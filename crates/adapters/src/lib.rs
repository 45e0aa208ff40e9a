// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! simtail-adapters: the process/device I/O boundary — the Producer
//! Supervisor (subprocess spawn, reconnect backoff) and the
//! `TargetResolver` device collaborator (§4.1, §6).

pub mod subprocess;
pub mod supervisor;
pub mod target;

pub use supervisor::{
    CommandProducerSpawner, ProducerProcess, ProducerSpawner, ProducerSupervisor, Severity,
    Shutdown, SupervisorEvent, SupervisorStats,
};
pub use target::{AppInfo, Device, SimctlTargetResolver, TargetError, TargetResolver};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    pub use crate::supervisor::fake::{FakeProducerSpawner, ScriptStep};
    pub use crate::target::fake::FakeTargetResolver;
}
