pub mod db;
pub mod error;

pub use db::{LogDb, PersistOutcome};
pub use error::StoreError;
