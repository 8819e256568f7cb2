pub mod db;
mod files;
pub mod models;
mod rate_limits;
mod settings;
mod tables;

pub use db::{Database, DatabaseError, PurgeStats};
pub use settings::keys as setting_keys;
pub use tables::*;
