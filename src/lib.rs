// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

//! Forager — resilient acquisition of defended web content.
//!
//! Forager fetches the public HTML of sites that actively resist automation
//! (WAF challenges, browser fingerprinting, TLS quirks, rate limiting). It
//! chains three fetch strategies — pooled stealth browser, private stealth
//! browser, plain HTTP with a dual-TLS policy — under per-domain adaptive
//! timeouts and one global deadline, and always returns a normalized result
//! instead of throwing.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod intelligence;
pub mod pool;
pub mod renderer;
pub mod stealth;

pub use acquisition::{AcquisitionRequest, AcquisitionResult, FetchStrategy, StrategyKind};
pub use config::{Config, Mode};
pub use engine::Engine;
pub use error::{ErrorKind, FetchError};
