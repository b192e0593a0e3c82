//! Core domain entities
//!
//! Pure data structures with validation and state-machine logic - no I/O.

pub mod activity;
mod bank_account;
pub mod connection;
pub mod job;
mod notification;
pub mod result;
mod transaction;

pub use activity::UserActivity;
pub use bank_account::{AccountStatus, BalanceUpdate, BankAccount};
pub use connection::{BankConnection, ConnectionStatus, Provider};
pub use job::{Job, JobEnvelope};
pub use notification::{Notification, NotificationType};
pub use result::{Error, ErrorKind, ProviderError, ProviderErrorCode, Result};
pub use transaction::{ProviderTransaction, Transaction};
