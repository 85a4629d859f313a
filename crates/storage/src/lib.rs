//! Shared storage primitives for the statechain client.
//!
//! This crate provides the common [`StorageError`] type used by the
//! wallet store trait in the `sdk` crate. The store trait itself lives
//! next to the domain types it persists (the `sdk` crate owns `Wallet`)
//! to avoid coupling this crate to the wallet model.
//!
//! # Design Principles
//!
//! - **No generic key-value trait.** Storage access is expressed through
//!   a domain-specific store trait with typed, meaningful methods.
//! - **Error type covers real failures.** Missing keys, key collisions,
//!   serialization faults -- not input validation.

mod error;

pub use error::StorageError;
