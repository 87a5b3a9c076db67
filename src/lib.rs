pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod http;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod storage;

pub use application::{AppError, LedgerService, TransferCoordinator};
pub use domain::*;
pub use storage::{LedgerStore, StoreOptions};
