//! # Integration Tests
//!
//! Cross-crate scenarios run against the in-memory store and the native
//! sandbox:
//! - graph, timing and seek properties
//! - checkpoint and interpolation round trips
//! - concurrency, speed and timeout scenarios
//! - engine -> driver -> dispatcher end to end

#[cfg(test)]
mod support;

#[cfg(test)]
mod properties;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod e2e;
