//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits, not on concrete implementations.

mod notifier;
mod provider;
mod queue;
mod store;

pub use notifier::Notifier;
pub use provider::{ItemDetails, ProviderAccount, ProviderClient, ProviderRegistry, TokenSet};
pub use queue::JobQueue;
pub use store::{ConnectionStore, UpsertSummary};
