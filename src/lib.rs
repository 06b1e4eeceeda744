//! Record persistence for a detention-facility administration.
//!
//! Every entity lives in one named collection, stored as a JSON array in
//! SQLite. [`state::AppState`] wires the store, the typed repositories, the
//! audit log and the attachment store together; backup, restore and the raw
//! override console operate on whole collections.

pub mod attachments;
pub mod audit;
pub mod auth;
pub mod backup;
pub mod collections;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod id;
pub mod intake;
pub mod logging;
pub mod model;
pub mod recovery;
pub mod repo;
pub mod state;
pub mod store;
pub mod time;

pub use collections::CollectionName;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
pub use state::AppState;
