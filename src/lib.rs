//! Bundlesmith - deterministic, cache-accelerated content bundle builder
//!
//! This library provides functionality to:
//! - Resolve the objects every asset and scene depends on
//! - Pack objects into bundles from an explicit or an automatic layout
//! - Serialize and archive bundles with byte-identical output for identical input
//! - Skip unchanged work through a content-addressed build cache

pub mod build;
pub mod cli;
pub mod config;
pub mod content;
