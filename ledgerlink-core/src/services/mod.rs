//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each job type
//! maps to one service method; `worker::JobRunner` does the dispatch.

pub mod account_sync;
pub mod expiration;
pub mod logging;
pub mod migration;
pub mod notification;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod setup;
pub mod sync;
pub mod token_refresh;
pub mod upsert;
pub mod worker;

pub use account_sync::{AccountSyncStatus, AccountSyncer, SyncAccountOutcome};
pub use expiration::{
    evaluate_disconnected, evaluate_expiry, DisconnectedAction, ExpirationService, ExpiryFinding,
    SweepReport,
};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use notification::NotificationService;
pub use recovery::{RecoveryOutcome, RecoveryService};
pub use registry::{JobDescriptor, JobRegistry};
pub use retry::{RetryDecision, RetryPolicy};
pub use setup::SetupService;
pub use sync::{SyncConnectionOutcome, SyncOrchestrator, SyncStatus};
pub use token_refresh::{RefreshOutcome, TokenRefreshService};
pub use upsert::TransactionUpserter;
pub use worker::{JobOutcome, JobReport, JobRunner, RunSummary};
