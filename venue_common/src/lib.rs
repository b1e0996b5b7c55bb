//!
//! Common types and utilities shared by the session core and its hosts.
//!
//! This crate aggregates:
//! - `error`: unified error type `VenueError` used across the workspace.
//! - `result`: handy `Result<T, VenueError>` alias.
//! - `instruments`: entity keys, sides, order types and order states.
//! - `records`: order, fill, position and fund records mirrored from the venue.
//! - `command`: order requests and login credentials.
//! - `config`: venue connection settings and their JSON loaders.
#![warn(missing_docs)]
pub mod command;
pub mod config;
pub mod error;
pub mod instruments;
pub mod records;
pub mod result;

pub use command::{Credentials, OrderRequest};
pub use config::VenueConfig;
pub use error::VenueError;
pub use instruments::EntityKey;
pub use result::Result;
