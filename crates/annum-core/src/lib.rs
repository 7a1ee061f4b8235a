//! Core types and trait definitions for the Annum occasion tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the domain model, the [`store::EventStore`] abstraction, and the pure
//! occurrence and view logic layered on top of it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod category;
pub mod date;
pub mod error;
pub mod occurrence;
pub mod special_date;
pub mod store;
pub mod sync_status;
pub mod views;

pub use error::{DomainError, Error, Result};
