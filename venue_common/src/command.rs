//! Requests sent through the gateway on behalf of the host.
//!
//! An `OrderRequest` is validated locally before it reaches the gateway, which then
//! gives an immediate accept/reject. `Credentials` carry the login material a
//! handshake needs; the password never appears in `Debug` output.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VenueError;
use crate::instruments::{EntityKey, OrderType, PositionEffect, Side};

/// New order payload handed to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Account the order is booked to.
    pub account: String,
    /// Contract to trade.
    pub entity: EntityKey,
    /// First leg contract; the whole contract for an outright order.
    pub first_leg: String,
    /// Second leg contract when `entity` is a spread (`A/B`).
    pub second_leg: Option<String>,
    /// Market or limit.
    pub order_type: OrderType,
    /// Buy or sell.
    pub side: Side,
    /// Open/cover flag, applied to both legs of a spread.
    pub effect: PositionEffect,
    /// Limit price; ignored for market orders.
    pub price: f64,
    /// Unsigned order quantity.
    pub quantity: u32,
}

impl OrderRequest {
    /// Builds a request from host-style arguments, where the side is given by the
    /// sign-free `is_buy` flag and the quantity may arrive signed.
    pub fn new(
        account: &str,
        entity: EntityKey,
        is_market: bool,
        is_buy: bool,
        effect: PositionEffect,
        price: f64,
        quantity: i64,
    ) -> Self {
        let (first_leg, second_leg) = entity.legs();
        let (first_leg, second_leg) = (String::from(first_leg), second_leg.map(String::from));
        OrderRequest {
            account: String::from(account),
            entity,
            first_leg,
            second_leg,
            order_type: if is_market { OrderType::Market } else { OrderType::Limit },
            side: if is_buy { Side::Buy } else { Side::Sell },
            effect,
            price,
            quantity: u32::try_from(quantity.unsigned_abs()).unwrap_or(u32::MAX),
        }
    }

    /// Rejects requests the venue could never accept.
    pub fn validate(&self) -> Result<(), VenueError> {
        if self.quantity == 0 {
            return Err(VenueError::InvalidOrder(String::from("quantity must be non-zero")));
        }
        if self.order_type == OrderType::Limit && !(self.price.is_finite() && self.price > 0.0) {
            return Err(VenueError::InvalidOrder(format!(
                "limit price must be positive, got {}",
                self.price
            )));
        }
        if self.entity.exchange.is_empty() || self.entity.contract.is_empty() {
            return Err(VenueError::InvalidOrder(format!(
                "incomplete contract [{}]",
                self.entity
            )));
        }
        if self.first_leg.is_empty() || self.second_leg.as_deref().is_some_and(str::is_empty) {
            return Err(VenueError::InvalidOrder(format!(
                "spread [{}] is missing a leg",
                self.entity
            )));
        }
        Ok(())
    }
}

/// Login material for one venue account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Venue user/account number.
    pub user_id: String,
    /// Login password.
    pub password: String,
    /// Broker id, for venues routed through a broker front.
    #[serde(default)]
    pub broker_id: Option<String>,
    /// Registered application id.
    #[serde(default)]
    pub app_id: Option<String>,
    /// Application authorization code.
    #[serde(default)]
    pub auth_code: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("broker_id", &self.broker_id)
            .field("app_id", &self.app_id)
            .field("auth_code", &self.auth_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i64, price: f64, is_market: bool) -> OrderRequest {
        OrderRequest::new(
            "1001",
            EntityKey::new("CME", "ES", "2412"),
            is_market,
            false,
            PositionEffect::Open,
            price,
            quantity,
        )
    }

    #[test]
    fn signed_quantity_is_made_absolute() {
        let req = request(-3, 4500.25, false);
        assert_eq!(req.quantity, 3);
        assert_eq!(req.side, Side::Sell);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_quantity_and_bad_limit_price() {
        assert!(matches!(request(0, 1.0, false).validate(), Err(VenueError::InvalidOrder(_))));
        assert!(matches!(request(1, 0.0, false).validate(), Err(VenueError::InvalidOrder(_))));
        assert!(request(1, 0.0, true).validate().is_ok());
    }

    #[test]
    fn spread_order_carries_both_legs() {
        let spread = OrderRequest::new(
            "1001",
            EntityKey::new("DCE", "m", "2501/2505"),
            false,
            true,
            PositionEffect::Open,
            12.5,
            2,
        );
        assert_eq!(spread.first_leg, "2501");
        assert_eq!(spread.second_leg.as_deref(), Some("2505"));
        assert!(spread.validate().is_ok());

        let outright = request(1, 4500.0, false);
        assert_eq!(outright.first_leg, "2412");
        assert_eq!(outright.second_leg, None);

        let broken = OrderRequest::new(
            "1001",
            EntityKey::new("DCE", "m", "2501/"),
            true,
            true,
            PositionEffect::Open,
            0.0,
            1,
        );
        assert!(matches!(broken.validate(), Err(VenueError::InvalidOrder(_))));
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials {
            user_id: String::from("1001"),
            password: String::from("hunter2"),
            broker_id: None,
            app_id: None,
            auth_code: Some(String::from("secret")),
        };
        let text = format!("{:?}", creds);
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("secret"));
        assert!(text.contains("1001"));
    }
}
