// Copyright 2026 Liveprobe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Liveprobe library — resilient observation and interaction for live web views.
//!
//! The view under test mutates outside our control, so every handle is a
//! short-lived borrow and every read is advisory. The engine in [`probe`]
//! absorbs stale references locally, retries interactions with fresh lookups,
//! and detects signal changes within bounded windows; [`view`] is the
//! capability seam to the actual browser (or a deterministic fake).

#![allow(clippy::new_without_default)]

pub mod cli;
pub mod probe;
pub mod signal;
pub mod site;
pub mod view;
