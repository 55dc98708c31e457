//! Archway Core - Domain logic and business rules
//!
//! This crate contains the pure core of the archiver:
//! - **Path templates** - placeholder matching and substitution between the
//!   watched source hierarchy and the remote archive hierarchy
//! - **Domain types** - `SyncBatch`, `TransferResult`
//! - **Error taxonomy** - `ConfigError`, `WatchError`, `ResolveError`, `SyncError`
//! - **Configuration** - typed YAML configuration with startup validation
//! - **Port definitions** - traits implemented by the outer crates
//!   (`BatchDispatcher`, `FaultReporter`)
//!
//! # Architecture
//!
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that the watch, sync and daemon crates implement or consume,
//! so the event-tree logic can be exercised without touching the OS watch
//! facility or an SSH connection.

pub mod config;
pub mod domain;
pub mod ports;
