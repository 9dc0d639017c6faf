#![allow(async_fn_in_trait)]
pub mod cache;
pub mod catalog;
pub mod download;
pub mod error;
pub mod naming;
pub mod progress;
pub mod search;
pub mod settings;
pub mod sync;

pub use error::{ConfigError, SyncError};
pub use settings::Settings;
