//! Site Watcher Library
//!
//! Checks a registry of domains and IP addresses for reachability and sends
//! SMS alerts through the sms24x7 gateway when an endpoint goes down or comes
//! back, suppressing repeat alerts for a cooldown window.

pub mod checker;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod lock_store;
pub mod models;
pub mod phone;
pub mod registry;
pub mod run_lock;
pub mod session;
pub mod transport;
pub mod watcher;

pub use checker::{Checker, ReachabilityChecker};
pub use config::Config;
pub use dispatcher::{AlertDispatcher, DispatchReport};
pub use errors::{ApiErrorKind, GatewayError, Result, WatcherError};
pub use gateway::{GatewayClient, SendReceipt, SmsSender};
pub use lock_store::{FileLockStore, LockStore, MemoryLockStore};
pub use models::{CheckResult, Endpoint, EndpointKind};
pub use registry::SiteRegistry;
pub use run_lock::RunLock;
pub use session::GatewaySession;
pub use watcher::{CycleSummary, Watcher};
