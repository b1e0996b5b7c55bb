//! Session lifecycle: handshake, reference sweep, logout and fault handling.
//!
//! A `SessionController` owns everything one venue connection needs. Gateway
//! events reach it through a single `EventRouter` created with the controller;
//! every reconnect opens a new gateway connection bound to that same router.
//!
//! States move strictly forward through the handshake:
//! `Disconnected -> Connecting -> Authenticating -> LoggingIn -> Ready`.
//! Any failure along the way, and any disconnect at any time, lands in `Faulted`.
//! Caches survive every reset; only the connection is thrown away.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;
use crossbeam_channel::Receiver;
use log::{error, info, warn};
use serde::Serialize;
use strum_macros::Display;
use venue_common::command::Credentials;
use venue_common::records::QueryKind;
use venue_common::{Result, VenueConfig, VenueError};

use crate::alerts::{Alert, AlertSource, Notifier};
use crate::bridge::{EventBridge, Outcome, Step};
use crate::caches::ReferenceCaches;
use crate::commands::CommandCoordinator;
use crate::dispatch::EventRouter;
use crate::gateway::{Connector, EventHandler, Gateway, GatewayResult};
use crate::link::GatewayLink;
use crate::quotes::QuoteMultiplexer;
use crate::sink::PersistenceSink;

/// Connectivity state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SessionState {
    /// Not connected; initial state and the state after logout.
    Disconnected,
    /// Transport connect in flight.
    Connecting,
    /// Authenticate request in flight.
    Authenticating,
    /// Login request in flight.
    LoggingIn,
    /// Logged in; commands, queries and quotes are available.
    Ready,
    /// A handshake step failed or the connection dropped.
    Faulted,
}

struct Status {
    state: SessionState,
    last_error: Option<String>,
}

/// State shared between the controller (caller thread) and the router (gateway threads).
pub(crate) struct SessionShared {
    pub(crate) config: VenueConfig,
    credentials: RwLock<Credentials>,
    status: Mutex<Status>,
    connected: AtomicBool,
    swept: AtomicBool,
    // Set for the whole of one `login`, handshake and sweep included.
    logging_in: AtomicBool,
    // Connection still in its handshake, not yet published through `link`.
    handshaking: Mutex<Option<Arc<dyn Gateway>>>,
    pub(crate) bridge: EventBridge,
    pub(crate) link: Arc<GatewayLink>,
    pub(crate) caches: ReferenceCaches,
    pub(crate) quotes: QuoteMultiplexer,
    pub(crate) commands: CommandCoordinator,
    pub(crate) notifier: Notifier,
}

impl SessionShared {
    pub(crate) fn state(&self) -> SessionState {
        match self.status.lock() {
            Ok(status) => status.state,
            Err(e) => {
                error!("Session status lock poisoned: {}", e);
                SessionState::Faulted
            }
        }
    }

    fn set_state(&self, state: SessionState) -> Result<()> {
        let mut status = self.status.lock()?;
        if status.state != state {
            info!("[{}] {} -> {}", self.config.name, status.state, state);
            status.state = state;
        }
        Ok(())
    }

    /// Whether pushed data should be applied to caches and topics.
    pub(crate) fn accepts_events(&self) -> bool {
        !matches!(self.state(), SessionState::Faulted | SessionState::Disconnected)
    }

    /// Move to `Faulted`, drop connectivity and free the connection.
    ///
    /// Commands still waiting for an execution report are forgotten.
    pub(crate) fn fault(&self, reason: &str) {
        match self.status.lock() {
            Ok(mut status) => {
                if status.state != SessionState::Faulted {
                    info!("[{}] {} -> {}", self.config.name, status.state, SessionState::Faulted);
                }
                status.state = SessionState::Faulted;
                status.last_error = Some(String::from(reason));
            }
            Err(e) => error!("Session status lock poisoned while faulting: {}", e),
        }
        self.connected.store(false, Ordering::SeqCst);
        self.release_handshake();
        self.link.release();
        self.quotes.on_session_lost();
        self.commands.discard_pending();
    }

    fn release_handshake(&self) {
        let taken = match self.handshaking.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                error!("Handshake slot lock poisoned: {}", e);
                None
            }
        };
        if let Some(gateway) = taken {
            gateway.release();
        }
    }

    // Publish the connection unless a disconnect already faulted the handshake.
    fn promote_ready(&self, gateway: Arc<dyn Gateway>) -> Result<()> {
        let mut status = self.status.lock()?;
        if status.state == SessionState::Faulted {
            let reason = status.last_error.clone().unwrap_or_default();
            return Err(VenueError::Connection(reason));
        }
        self.handshaking.lock()?.take();
        self.link.install(gateway)?;
        self.connected.store(true, Ordering::SeqCst);
        info!("[{}] {} -> {}", self.config.name, status.state, SessionState::Ready);
        status.state = SessionState::Ready;
        status.last_error = None;
        Ok(())
    }
}

/// Owns one venue session and its dependents.
pub struct SessionController {
    shared: Arc<SessionShared>,
    router: Arc<EventRouter>,
    connector: Arc<dyn Connector>,
    alerts: Receiver<Alert>,
}

impl SessionController {
    /// Controller for `config`, opening connections through `connector`.
    pub fn new(config: VenueConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::build(config, connector, None)
    }

    /// Same as `new`, also forwarding fills and positions to `sink` for `as_of`.
    pub fn with_sink(
        config: VenueConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn PersistenceSink>,
        as_of: NaiveDate,
    ) -> Result<Self> {
        Self::build(config, connector, Some((sink, as_of)))
    }

    fn build(
        config: VenueConfig,
        connector: Arc<dyn Connector>,
        sink: Option<(Arc<dyn PersistenceSink>, NaiveDate)>,
    ) -> Result<Self> {
        config.validate()?;
        let (notifier, alerts) = Notifier::channel(&config.name);
        let link = Arc::new(GatewayLink::new());

        let mut caches = ReferenceCaches::new(notifier.clone());
        if let Some((sink, as_of)) = sink {
            caches = caches.with_sink(sink, config.account(), as_of);
        }
        let quotes = QuoteMultiplexer::new(config.market_depth, Arc::clone(&link), notifier.clone());
        let commands = CommandCoordinator::new(Arc::clone(&link), notifier.clone());

        let shared = Arc::new(SessionShared {
            credentials: RwLock::new(config.credentials.clone()),
            config,
            status: Mutex::new(Status {
                state: SessionState::Disconnected,
                last_error: None,
            }),
            connected: AtomicBool::new(false),
            swept: AtomicBool::new(false),
            logging_in: AtomicBool::new(false),
            handshaking: Mutex::new(None),
            bridge: EventBridge::new(),
            link,
            caches,
            quotes,
            commands,
            notifier,
        });
        let router = Arc::new(EventRouter::new(Arc::clone(&shared)));
        Ok(SessionController {
            shared,
            router,
            connector,
            alerts,
        })
    }

    /// Venue name from the config.
    pub fn venue(&self) -> &str {
        &self.shared.config.name
    }

    /// Account orders are booked to.
    pub fn account(&self) -> &str {
        self.shared.config.account()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Reason of the last fault, cleared on the next successful login.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .status
            .lock()
            .ok()
            .and_then(|status| status.last_error.clone())
    }

    /// Whether the session is logged in on a live connection.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Receiving end of the alert channel. Every clone sees each alert once.
    pub fn alerts(&self) -> Receiver<Alert> {
        self.alerts.clone()
    }

    /// Reference caches mirrored from the venue.
    pub fn caches(&self) -> &ReferenceCaches {
        &self.shared.caches
    }

    /// Quote topic multiplexer.
    pub fn quotes(&self) -> &QuoteMultiplexer {
        &self.shared.quotes
    }

    /// Order submit/cancel.
    pub fn commands(&self) -> &CommandCoordinator {
        &self.shared.commands
    }

    /// Run the handshake to Ready, then the one-time reference sweep.
    ///
    /// Already Ready is a no-op. A login racing another one on the same session
    /// fails with `WaitAlreadyArmed` before touching any state, and leaves the
    /// other untouched.
    pub fn login(&self) -> Result<()> {
        if self.state() == SessionState::Ready {
            info!("[{}] Already logged in", self.venue());
            return Ok(());
        }
        let Some(_guard) = LoginGuard::acquire(&self.shared.logging_in) else {
            warn!("[{}] Login already in progress", self.venue());
            return Err(VenueError::WaitAlreadyArmed(String::from("login")));
        };
        let connect_wait = self.shared.bridge.arm(Step::Connect)?;

        if let Err(e) = self.handshake(connect_wait) {
            error!("[{}] Login failed: {}", self.venue(), e);
            self.shared.fault(&e.to_string());
            return Err(e);
        }
        info!("[{}] API is ready.", self.venue());

        if let Err(e) = self.shared.quotes.resubscribe_all() {
            warn!("[{}] Quote resubscription skipped: {}", self.venue(), e);
        }
        self.sweep()
    }

    fn handshake(&self, connect_wait: crate::bridge::PendingWait<'_>) -> Result<()> {
        let shared = &self.shared;
        let config = &shared.config;
        let deadline = config.wait_timeout();

        shared.set_state(SessionState::Connecting)?;
        let handler: Arc<dyn EventHandler> = self.router.clone();
        let gateway = self
            .connector
            .open(handler)
            .map_err(|e| VenueError::Connection(format!("Failed to create API: {}", e)))?;
        *shared.handshaking.lock()? = Some(Arc::clone(&gateway));

        rejected_as(gateway.set_host(&config.host.ip, config.host.port), VenueError::Connection)?;
        rejected_as(gateway.connect(&config.host.address()), VenueError::Connection)?;
        completed(Step::Connect, connect_wait.block(deadline), VenueError::Connection)?;

        let credentials = shared.credentials.read()?.clone();
        if config.profile.requires_authenticate {
            shared.set_state(SessionState::Authenticating)?;
            let wait = shared.bridge.arm(Step::Authenticate)?;
            rejected_as(gateway.authenticate(&credentials), VenueError::Authentication)?;
            completed(Step::Authenticate, wait.block(deadline), VenueError::Authentication)?;
        }

        shared.set_state(SessionState::LoggingIn)?;
        let wait = shared.bridge.arm(Step::Login)?;
        rejected_as(gateway.login(&credentials), VenueError::Login)?;
        completed(Step::Login, wait.block(deadline), VenueError::Login)?;

        shared.promote_ready(gateway)
    }

    /// Issue the orders, fills, positions and funds queries and wait for each.
    ///
    /// Runs once per session lifetime; later calls return immediately. A failed
    /// query is alerted and skipped; only a disconnect ends the sweep with an error.
    pub fn sweep(&self) -> Result<()> {
        let shared = &self.shared;
        let gateway = shared.link.current()?;
        if shared.swept.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let deadline = shared.config.wait_timeout();
        info!("[{}] Querying reference data", self.venue());

        let kinds = [QueryKind::Orders, QueryKind::Fills, QueryKind::Positions, QueryKind::Funds];
        let mut waits = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let wait = shared.bridge.arm(Step::Sweep(kind))?;
            let issued = match kind {
                QueryKind::Orders => gateway.query_orders(),
                QueryKind::Fills => gateway.query_fills(),
                QueryKind::Positions => gateway.query_positions(),
                QueryKind::Funds => gateway.query_funds(),
            };
            match issued {
                Ok(request_id) => waits.push((kind, request_id, wait)),
                Err(e) => shared.notifier.alert(AlertSource::Query, query_failure(kind, e.to_string())),
            }
        }

        for (kind, request_id, wait) in waits {
            match wait.block(deadline) {
                Outcome::Completed => info!("[{}] {} query {} complete", self.venue(), kind, request_id),
                Outcome::Failed(message) => shared.notifier.alert(AlertSource::Query, query_failure(kind, message)),
                Outcome::TimedOut => shared.notifier.alert(
                    AlertSource::Query,
                    format!("Timed out waiting for {} query {}", kind, request_id),
                ),
                Outcome::Disconnected(reason) => return Err(VenueError::Connection(reason)),
            }
        }
        Ok(())
    }

    /// Log out and drop the connection. Caches and the quote registry are kept.
    pub fn logout(&self) -> Result<()> {
        let gateway = match self.shared.link.current() {
            Ok(gateway) => gateway,
            Err(VenueError::NotReady) => {
                return match self.state() {
                    SessionState::Disconnected => Ok(()),
                    // The connection is already gone; only the state is left to reset.
                    SessionState::Faulted => self.shared.set_state(SessionState::Disconnected),
                    _ => Err(VenueError::NotReady),
                };
            }
            Err(e) => return Err(e),
        };
        let result = rejected_as(gateway.logout(), VenueError::Connection);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.link.release();
        self.shared.quotes.on_session_lost();
        self.shared.commands.discard_pending();
        self.shared.set_state(SessionState::Disconnected)?;
        info!("[{}] API is logged out.", self.venue());
        result
    }

    /// Change the login password. On success later logins use `new_password`.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let gateway = self.shared.link.current()?;
        if new_password.is_empty() {
            return Err(VenueError::CommandRejected(String::from("new password is empty")));
        }
        let wait = self.shared.bridge.arm(Step::ChangePassword)?;
        rejected_as(gateway.change_password(old_password, new_password), VenueError::CommandRejected)?;
        completed(
            Step::ChangePassword,
            wait.block(self.shared.config.wait_timeout()),
            VenueError::CommandRejected,
        )?;
        self.shared.credentials.write()?.password = String::from(new_password);
        info!("[{}] Password changed", self.venue());
        Ok(())
    }

    /// Credentials the next login will use.
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(self.shared.credentials.read()?.clone())
    }
}

struct LoginGuard<'a>(&'a AtomicBool);

impl<'a> LoginGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(LoginGuard(flag))
        }
    }
}

impl Drop for LoginGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn query_failure(kind: QueryKind, message: String) -> String {
    VenueError::Query {
        kind: kind.to_string(),
        message,
    }
    .to_string()
}

fn rejected_as<T>(result: GatewayResult<T>, kind: fn(String) -> VenueError) -> Result<T> {
    result.map_err(|e| kind(e.to_string()))
}

fn completed(step: Step, outcome: Outcome, kind: fn(String) -> VenueError) -> Result<()> {
    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed(message) => Err(kind(message)),
        Outcome::Disconnected(reason) => Err(VenueError::Connection(reason)),
        Outcome::TimedOut => Err(VenueError::WaitTimedOut(step.to_string())),
    }
}
