//! Side notification channel for failures nobody is waiting on.
//!
//! Asynchronous rejections (execution reports, failed sweep queries, refused quote
//! subscriptions) cannot be returned to the call that caused them. They are logged
//! and pushed to an unbounded channel the host drains at its own pace.
use std::fmt;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use serde::Serialize;
use strum_macros::Display;

/// Component that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum AlertSource {
    /// Reference-data sweep query.
    Query,
    /// Upstream quote subscription.
    Subscription,
    /// Order submit/cancel.
    Command,
    /// Persistence sink.
    Persistence,
}

/// One user-visible failure notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Venue the alert belongs to.
    pub venue: String,
    /// Component that raised it.
    pub source: AlertSource,
    /// Host-facing message, `#ERR:`-prefixed like synchronous failures.
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.venue, self.message)
    }
}

/// Cloneable sending half of the alert channel.
#[derive(Clone)]
pub struct Notifier {
    venue: String,
    tx: Sender<Alert>,
}

impl Notifier {
    /// Create a notifier for `venue` and the receiver the host drains.
    pub fn channel(venue: &str) -> (Self, Receiver<Alert>) {
        let (tx, rx) = unbounded();
        (
            Notifier {
                venue: String::from(venue),
                tx,
            },
            rx,
        )
    }

    /// Log and publish an alert. A host that stopped listening only loses the copy.
    pub fn alert(&self, source: AlertSource, message: impl Into<String>) {
        let alert = Alert {
            venue: self.venue.clone(),
            source,
            message: format!("#ERR: {}", message.into()),
        };
        warn!("{} alert: {}", source, alert);
        if self.tx.send(alert).is_err() {
            debug!("Alert receiver dropped; alert only logged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alerts_are_prefixed_and_delivered() {
        let (notifier, rx) = Notifier::channel("sim");
        notifier.alert(AlertSource::Command, "Failed to send order: error code is 7");
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.source, AlertSource::Command);
        assert_eq!(alert.message, "#ERR: Failed to send order: error code is 7");
        assert_eq!(alert.to_string(), "[sim] #ERR: Failed to send order: error code is 7");
    }

    #[test]
    fn alert_without_receiver_does_not_panic() {
        let (notifier, rx) = Notifier::channel("sim");
        drop(rx);
        notifier.alert(AlertSource::Query, "lost");
    }
}
