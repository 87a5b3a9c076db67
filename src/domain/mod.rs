mod account;
mod client;
mod integrity;
mod money;
pub mod timestamp;
mod transaction;
mod validation;

pub use account::*;
pub use client::*;
pub use integrity::*;
pub use money::*;
pub use transaction::*;
pub use validation::*;
