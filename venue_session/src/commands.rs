//! Order submit and cancel.
//!
//! Each command is one synchronous gateway call: a reject comes straight back to
//! the caller as `CommandRejected`. The exchange's verdict arrives later as an
//! execution report, correlated by request id; a rejection there goes to the alert
//! channel only. The correlation table is created on the first command and shared
//! by every later one.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, info, warn};
use venue_common::{OrderRequest, Result, VenueError};

use crate::alerts::{AlertSource, Notifier};
use crate::gateway::{ExecutionReport, RequestId};
use crate::link::GatewayLink;

#[derive(Debug, Clone)]
enum PendingCommand {
    Submit { entity: String },
    Cancel { order_id: String },
}

#[derive(Default)]
struct ExecutionHandlers {
    pending: Mutex<HashMap<RequestId, PendingCommand>>,
}

/// Submits and cancels orders on the Ready connection.
pub struct CommandCoordinator {
    link: Arc<GatewayLink>,
    notifier: Notifier,
    handlers: OnceLock<ExecutionHandlers>,
}

impl CommandCoordinator {
    /// Coordinator sending through `link` and alerting through `notifier`.
    pub fn new(link: Arc<GatewayLink>, notifier: Notifier) -> Self {
        CommandCoordinator {
            link,
            notifier,
            handlers: OnceLock::new(),
        }
    }

    fn handlers(&self) -> &ExecutionHandlers {
        self.handlers.get_or_init(|| {
            debug!("Execution report handlers registered");
            ExecutionHandlers::default()
        })
    }

    /// Validate and submit a new order. Returns the gateway request id.
    pub fn submit(&self, order: &OrderRequest) -> Result<RequestId> {
        let gateway = self.link.current()?;
        order.validate()?;
        // Held across the call so the report cannot overtake the bookkeeping.
        let mut pending = self.handlers().pending.lock()?;

        let request_id = gateway.insert_order(order).map_err(|e| {
            VenueError::CommandRejected(format!("Failed to send order for [{}]: {}", order.entity, e))
        })?;
        pending.insert(
            request_id,
            PendingCommand::Submit {
                entity: order.entity.to_string(),
            },
        );
        drop(pending);
        info!(
            "Order sent: {} {} {} @ {} (request {})",
            order.side, order.quantity, order.entity, order.price, request_id
        );
        Ok(request_id)
    }

    /// Cancel an order by its venue order number. Returns the gateway request id.
    pub fn cancel(&self, order_id: &str) -> Result<RequestId> {
        let gateway = self.link.current()?;
        if order_id.trim().is_empty() {
            return Err(VenueError::InvalidOrder(String::from("order number is empty")));
        }
        let mut pending = self.handlers().pending.lock()?;

        let request_id = gateway
            .cancel_order(order_id)
            .map_err(|e| VenueError::CommandRejected(format!("Failed to cancel order {}: {}", order_id, e)))?;
        pending.insert(
            request_id,
            PendingCommand::Cancel {
                order_id: String::from(order_id),
            },
        );
        drop(pending);
        info!("Cancel sent for order {} (request {})", order_id, request_id);
        Ok(request_id)
    }

    /// Route one execution report. Rejections become alerts.
    pub fn on_execution_report(&self, report: &ExecutionReport) -> Result<()> {
        let Some(handlers) = self.handlers.get() else {
            debug!("Execution report {} before any command; ignored", report.correlation_id);
            return Ok(());
        };
        let pending = handlers.pending.lock()?.remove(&report.correlation_id);

        match (&report.error, pending) {
            (None, Some(command)) => debug!("Request {} accepted: {:?}", report.correlation_id, command),
            (None, None) => debug!("Execution report {} has no pending command", report.correlation_id),
            (Some(e), Some(PendingCommand::Submit { entity })) => self
                .notifier
                .alert(AlertSource::Command, format!("Failed to send order for [{}]: {}", entity, e)),
            (Some(e), Some(PendingCommand::Cancel { order_id })) => self
                .notifier
                .alert(AlertSource::Command, format!("Failed to cancel order {}: {}", order_id, e)),
            (Some(e), None) => {
                let subject = report
                    .order
                    .as_ref()
                    .map(|o| format!("[{}]", o.entity))
                    .unwrap_or_else(|| format!("request {}", report.correlation_id));
                self.notifier
                    .alert(AlertSource::Command, format!("Order command for {} failed: {}", subject, e))
            }
        }
        Ok(())
    }

    /// Forget every command still waiting for its execution report. Used once the
    /// connection that would carry those reports is gone.
    pub fn discard_pending(&self) {
        let Some(handlers) = self.handlers.get() else {
            return;
        };
        match handlers.pending.lock() {
            Ok(mut pending) => {
                if !pending.is_empty() {
                    warn!("Discarding {} commands without execution report", pending.len());
                    pending.clear();
                }
            }
            Err(e) => warn!("Pending command lock poisoned: {}", e),
        }
    }

    /// Commands still waiting for their execution report.
    pub fn pending_count(&self) -> Result<usize> {
        match self.handlers.get() {
            Some(handlers) => Ok(handlers.pending.lock()?.len()),
            None => Ok(0),
        }
    }
}
