//! drivetree Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Entry`, `EntryKind`, `Href`, `ResourceId`, `Checksum`, `Resolution`
//! - **Port definitions** - Traits for adapters: `ITransport`, `IRemoteFeed`, `ILocalFileSystem`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//! - **Logging** - tracing subscriber setup driven by the `logging` section
//!
//! # Architecture
//!
//! The domain module holds plain values with no I/O. Ports define the trait
//! interfaces that adapter crates implement (`drivetree-http` for the wire,
//! `drivetree-sync` for the local filesystem). The resource tree and the
//! reconciliation engine in `drivetree-sync` depend only on these ports.

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
