//! Shard Explorer - a read-only explorer for a sharded, epoch-based chain
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Chain Data
//! - [`block`] - Block headers and bodies as persisted
//! - [`transaction`] - Transactions and their display views
//! - [`committee`] - Committees and epoch-scoped committee resolution
//! - [`address`] - Account identities and the bech32 display codec
//!
//! ## Schedule
//! - [`sharding`] - Epoch schedule and per-shard endpoint layout
//!
//! ## Explorer
//! - [`bitmap`] - Commit bitmap decoding into signer lists
//! - [`scanner`] - Sentinel-extended block window scans
//! - [`paginate`] - Page slicing of assembled results
//! - [`explorer`] - Query validation and answering
//! - [`api`] - HTTP surface
//!
//! ## Storage & Configuration
//! - [`persistence`] - Key-value storage (SQLite, in-memory)
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Chain Data
// ============================================================================
pub mod address;
pub mod block;
pub mod committee;
pub mod transaction;

// ============================================================================
// Schedule
// ============================================================================
pub mod sharding;

// ============================================================================
// Explorer
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod bitmap;
pub mod explorer;
pub mod paginate;
pub mod scanner;

// ============================================================================
// Storage & Configuration
// ============================================================================
pub mod config;
pub mod error;
pub mod persistence;
