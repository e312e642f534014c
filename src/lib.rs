//! VaultKeeper Gateway Library
//!
//! This library provides the secure command-execution gateway the
//! VaultKeeper desktop client uses to drive the Azure CLI: input validation,
//! allow-listing, bounded concurrent execution with timeouts, cross-platform
//! executable discovery, and output redaction.

pub mod config;
pub mod gateway;
