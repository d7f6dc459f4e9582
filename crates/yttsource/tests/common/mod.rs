//! Shared test utilities for yttsource integration tests.
//!
//! This module provides:
//! - `FakeCluster`, an in-memory stand-in for the Kubernetes API
//! - `RecordingFetcher`, an artifact fetcher serving canned tarballs
//! - `TestHarness` wiring both into a reconciler
//! - Builders for YttSources, backends and tarballs

pub mod builders;
pub mod cluster;
pub mod fetcher;
pub mod harness;

pub use builders::*;
pub use cluster::FakeCluster;
pub use fetcher::RecordingFetcher;
pub use harness::TestHarness;
