//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Redis testcontainer setup
//! - Spy StorageBackends for recording calls and injecting failures

#![allow(dead_code)]

pub mod containers;
pub mod spy;

pub use containers::*;
pub use spy::*;
