// Application layer - use cases and orchestration over the ledger store.

mod coordinator;
mod directory;
pub mod error;
mod service;

pub use coordinator::*;
pub use directory::*;
pub use error::*;
pub use service::*;
