//! Transport layer for the statechain client.
//!
//! Two external services are reachable from here, both over HTTP with
//! JSON bodies:
//!
//! | Module | Trait | Concrete client | Description |
//! |--------|-------|-----------------|-------------|
//! | [`entity`] | `EntityClient` | `HttpEntityClient` | The statechain entity (protocol server) |
//! | [`esplora`] | `ChainClient` | `EsploraClient` | Esplora-compatible blockchain data source |
//!
//! Both services are expressed as traits so the SDK can be driven against
//! mocks in tests; the concrete clients here are thin `reqwest` wrappers
//! that attach response bodies to errors and never retry on their own.

pub mod entity;
pub mod error;
pub mod esplora;

pub use entity::{EntityClient, HttpEntityClient, ReceiverOutcome};
pub use error::TransportError;
pub use esplora::{ChainClient, EsploraClient, TxStatus, Utxo};
