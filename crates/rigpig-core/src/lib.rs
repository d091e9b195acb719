//! rigpig core - shared records for the supervisor and its collaborators
//!
//! This crate provides the value records that flow from the update
//! producers through the supervisor into shared state. The supervisor
//! never interprets them; collaborators such as the API and console
//! read them back out.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod algo;
pub mod currency;
pub mod error;

// Re-exports for convenience
pub use algo::AlgoStat;
pub use currency::{CurrencyCode, CurrencyRate};
pub use error::{DomainError, DomainResult};
