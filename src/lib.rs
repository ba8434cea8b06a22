//! # Datavol Library
//!
//! Lifecycle and data movement for per-service *data containers*: storage
//! containers whose only job is to hold persistent data for a service.
//! The `datavol` binary is a thin wrapper over this crate.
//!
//! ## Quick Example
//!
//! ```
//! use datavol::filesystem::ContainerFs;
//! use datavol::naming;
//!
//! // Data containers have one canonical name per service instance
//! assert_eq!(naming::data_container_name("eris", "ipfs", 1), "eris_data_ipfs_1");
//!
//! // The in-memory container filesystem backs engine-free testing
//! let mut fs = ContainerFs::new();
//! fs.add_file("/data/x.txt", b"x").unwrap();
//! assert!(fs.exists("/data"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Manager (`manager`)**: [`DataManager`](manager::DataManager) resolves,
//!   provisions, imports into, exports from, and runs commands against data
//!   containers.
//! - **Engine (`engine`, `docker`, `memory`)**: the narrow contract the
//!   manager needs from a container runtime, the Docker CLI implementation,
//!   and an in-memory implementation with fault injection.
//! - **Definitions (`definitions`, `operations`)**: per-service data
//!   definitions and the operation/request records that flow through the
//!   manager.
//! - **Streaming (`pipe`, `archive`)**: a bounded in-process pipe with
//!   cancellation, and tar streaming of host directories.
//! - **Merge (`transfer`)**: flattening a staged export into its host
//!   destination.
//! - **Settings (`config`, `defaults`)**: YAML settings with built-in
//!   defaults.

pub mod archive;
pub mod config;
pub mod defaults;
pub mod definitions;
pub mod docker;
pub mod engine;
pub mod error;
pub mod filesystem;
pub mod manager;
pub mod memory;
pub mod naming;
pub mod operations;
pub mod output;
pub mod pipe;
pub mod transfer;

#[cfg(test)]
mod transfer_proptest;
