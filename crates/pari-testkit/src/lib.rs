//! pari-testkit
//!
//! In-process doubles for scenario tests: a [`MemoryLedgerStore`] that keeps
//! the same commit contract as the Postgres store, a [`ScriptedProvider`]
//! standing in for the payment provider, and webhook payload fixtures.

pub mod fixtures;
pub mod memory_store;
pub mod scripted_provider;

pub use fixtures::{captured_payment, signed};
pub use memory_store::MemoryLedgerStore;
pub use scripted_provider::ScriptedProvider;
