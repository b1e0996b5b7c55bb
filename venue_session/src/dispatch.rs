//! Routes gateway events to the bridge, caches, quotes and commands.
use std::sync::Arc;

use log::{debug, error, warn};
use venue_common::records::QueryKind;

use crate::bridge::{Outcome, Step};
use crate::gateway::{ApiError, EventHandler, GatewayEvent, QueryResponse};
use crate::session::SessionShared;

/// The one event handler of a session, shared by all of its connections.
pub(crate) struct EventRouter {
    shared: Arc<SessionShared>,
}

impl EventRouter {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        EventRouter { shared }
    }

    fn signal(&self, step: Step, error: Option<&ApiError>) {
        let outcome = match error {
            None => Outcome::Completed,
            Some(e) => Outcome::Failed(e.to_string()),
        };
        if !self.shared.bridge.signal(step, outcome) {
            debug!("No wait armed for {}", step);
        }
    }

    fn on_disconnected(&self, reason: i32) {
        if self.shared.state() == crate::session::SessionState::Disconnected {
            debug!("Disconnect {} after logout ignored", reason);
            return;
        }
        let message = format!("API disconnected: reason code is {}", reason);
        error!("[{}] {}", self.shared.config.name, message);
        self.shared.fault(&message);
        let released = self.shared.bridge.signal_all(Outcome::Disconnected(message));
        if released > 0 {
            debug!("Released {} pending waits after disconnect", released);
        }
    }

    fn on_login_response(&self, error: Option<&ApiError>) {
        let profile = &self.shared.config.profile;
        match error {
            Some(e) if profile.is_login_failure(e.code) => self.signal(Step::Login, Some(e)),
            Some(e) => {
                warn!("[{}] Login notice ignored: {}", self.shared.config.name, e);
                if !profile.awaits_ready {
                    self.signal(Step::Login, None);
                }
            }
            None if !profile.awaits_ready => self.signal(Step::Login, None),
            None => debug!("Login accepted, waiting for ready"),
        }
    }

    // Every record goes through the same path as a live push; the last one
    // releases the sweep wait.
    fn on_query_response<T>(&self, kind: QueryKind, response: QueryResponse<T>, apply: impl FnOnce(T)) {
        if let Some(e) = &response.error {
            error!("[{}] {} query {} failed: {}", self.shared.config.name, kind, response.request_id, e);
            self.signal(Step::Sweep(kind), Some(e));
            return;
        }
        if let Some(record) = response.record {
            apply(record);
        }
        if response.is_last {
            self.signal(Step::Sweep(kind), None);
        }
    }

    fn route_data(&self, event: GatewayEvent) {
        let shared = &self.shared;
        let caches = &shared.caches;
        match event {
            GatewayEvent::OrderQueryResponse(response) => {
                self.on_query_response(QueryKind::Orders, response, |order| {
                    if order.state.is_outstanding() {
                        caches.apply_order(order);
                    } else {
                        debug!("Order {} is {}; not outstanding", order.order_id, order.state);
                    }
                })
            }
            GatewayEvent::FillQueryResponse(response) => {
                self.on_query_response(QueryKind::Fills, response, |fill| {
                    caches.apply_fill(fill);
                })
            }
            GatewayEvent::PositionQueryResponse(response) => {
                self.on_query_response(QueryKind::Positions, response, |report| caches.apply_position(report))
            }
            GatewayEvent::FundQueryResponse(response) => {
                self.on_query_response(QueryKind::Funds, response, |snapshot| caches.apply_fund(snapshot))
            }
            GatewayEvent::PushOrder(order) => caches.apply_order(order),
            GatewayEvent::PushFill(fill) => {
                caches.apply_fill(fill);
            }
            GatewayEvent::PushPosition(report) => caches.apply_position(report),
            GatewayEvent::PushFund(snapshot) => caches.apply_fund(snapshot),
            GatewayEvent::Quote(tick) => {
                if let Err(e) = shared.quotes.on_quote(&tick) {
                    error!("Failed to apply quote for {}: {}", tick.entity, e);
                }
            }
            GatewayEvent::SubscribeQuoteResponse { entity, error } => {
                if let Err(e) = shared.quotes.on_subscribe_response(&entity, error.as_ref()) {
                    error!("Failed to apply subscribe response for {}: {}", entity, e);
                }
            }
            GatewayEvent::ExecutionReport(report) => {
                if let Err(e) = shared.commands.on_execution_report(&report) {
                    error!("Failed to route execution report {}: {}", report.correlation_id, e);
                }
                if report.error.is_none() {
                    if let Some(order) = report.order {
                        caches.apply_order(order);
                    }
                }
            }
            other => debug!("Unhandled event {}", other.name()),
        }
    }
}

impl EventHandler for EventRouter {
    fn on_event(&self, event: GatewayEvent) {
        debug!("[{}] event {}", self.shared.config.name, event.name());
        match event {
            GatewayEvent::Connected => self.signal(Step::Connect, None),
            GatewayEvent::Disconnected { reason } => self.on_disconnected(reason),
            GatewayEvent::AuthenticateResponse { error } => self.signal(Step::Authenticate, error.as_ref()),
            GatewayEvent::LoginResponse { error } => self.on_login_response(error.as_ref()),
            GatewayEvent::Ready => {
                if self.shared.config.profile.awaits_ready {
                    self.signal(Step::Login, None);
                }
            }
            GatewayEvent::ChangePasswordResponse { error } => self.signal(Step::ChangePassword, error.as_ref()),
            data => {
                if self.shared.accepts_events() {
                    self.route_data(data);
                } else {
                    warn!(
                        "[{}] {} discarded while {}",
                        self.shared.config.name,
                        data.name(),
                        self.shared.state()
                    );
                }
            }
        }
    }
}
