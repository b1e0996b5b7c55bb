//! Error types shared by the session core and its hosts.
//!
//! The `VenueError` enum unifies venue-level failures (connection loss, rejected
//! handshake steps, rejected commands) with the infrastructure failures underneath
//! them (I/O, serialization, poisoned locks), so every crate propagates a single
//! error type.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type for the venue workspace.
#[derive(Error, Debug)]
pub enum VenueError {
    /// Transport loss or a failure to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The venue refused the authenticate step of the handshake.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The venue refused the login step of the handshake.
    #[error("Login failed: {0}")]
    Login(String),

    /// A sweep query failed; scoped to that query only.
    #[error("Failed to query {kind}: {message}")]
    Query {
        /// Which query failed (orders, fills, positions, funds).
        kind: String,
        /// Venue-provided failure text.
        message: String,
    },

    /// The gateway synchronously rejected a submit/cancel/password request.
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// The gateway rejected an upstream quote subscription.
    #[error("Quote subscription rejected for [{entity}]: {message}")]
    SubscriptionRejected {
        /// Entity code that could not be subscribed.
        entity: String,
        /// Venue-provided failure text.
        message: String,
    },

    /// Operation requires a Ready session.
    #[error("API not ready yet.")]
    NotReady,

    /// A wait for the same handshake/query step is already outstanding.
    #[error("A wait for step {0} is already armed")]
    WaitAlreadyArmed(String),

    /// A blocking wait hit its configured deadline.
    #[error("Timed out waiting for {0}")]
    WaitTimedOut(String),

    /// A position key received an update under a policy it was not pinned to.
    #[error("Position {key} is pinned to {pinned} updates, got a {requested} update")]
    PositionPolicyMismatch {
        /// Position key code.
        key: String,
        /// Policy the key was first updated with.
        pinned: String,
        /// Policy of the rejected update.
        requested: String,
    },

    /// Requested quote field is not in the field table.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Order request failed local validation.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Entity key text could not be parsed.
    #[error("Parse entity error: {0}")]
    ParseEntity(String),

    /// Configuration is missing or inconsistent.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error originating from files or the persistence sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for VenueError {
    fn from(err: PoisonError<T>) -> Self {
        VenueError::MutexLock(err.to_string())
    }
}

