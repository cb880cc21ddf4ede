//! Bank API client.
//!
//! Pure HTTP client implementing [`bc_core::LedgerGateway`] against the bank's
//! GraphQL endpoint.

mod client;
mod error;
mod types;

pub use client::LedgerClient;
pub use error::{LedgerError, Result};
