// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! simtail-storage: the `PatternStore` collaborator (§6, §9) — durable
//! state that the core pipeline consumes only through `is_known`/`record`.
//! Format ownership lives here, not in `simtail-core`.

pub mod pattern_store;

pub use pattern_store::{InMemoryPatternStore, JsonlPatternStore, PatternRecord, PatternStore, StorageError};
