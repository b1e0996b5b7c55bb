//!
//! Session core for one trading-venue gateway connection.
//!
//! The gateway SDK is consumed through the `gateway` capability traits; events it
//! raises on its own threads are routed into:
//! - `bridge`: single-use waits the caller blocks on during the handshake and sweep.
//! - `session`: the lifecycle state machine and the one-time reference sweep.
//! - `caches`: orders, fills, positions and funds, fed by sweeps and pushes alike.
//! - `quotes`: field topics multiplexed onto one upstream subscription per entity.
//! - `commands`: order submit/cancel with execution-report correlation.
//!
//! `alerts` carries asynchronous failures to the host, `sink` persists fills and
//! positions, and `host` wraps it all in `#ERR:`-style synchronous functions.
#![warn(missing_docs)]
pub mod alerts;
pub mod bridge;
pub mod caches;
pub mod commands;
mod dispatch;
pub mod gateway;
pub mod host;
pub mod link;
pub mod quotes;
pub mod session;
pub mod sink;

pub use alerts::{Alert, AlertSource};
pub use gateway::{Connector, EventHandler, Gateway, GatewayEvent};
pub use host::{HostSurface, HostValue};
pub use session::{SessionController, SessionState};
