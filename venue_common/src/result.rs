//! Result type alias shared across the workspace.
//!
//! This module defines a convenient alias that defaults the error type to the
//! common `VenueError`, so functions can simply return `Result<T>`.
use crate::error::VenueError;

/// Workspace-wide `Result` alias with `VenueError` as the default error.
pub type Result<T, E = VenueError> = std::result::Result<T, E>;
