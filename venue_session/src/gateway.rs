//! Capability interface of a venue gateway SDK.
//!
//! The session core never sees a wire protocol. A `Connector` opens one
//! `Gateway` connection bound to the session's single `EventHandler`; every
//! gateway operation answers synchronously with an accept (request id) or a
//! reject (`ApiError`), and everything else arrives later as a `GatewayEvent`
//! on the gateway's own threads.
use std::fmt;
use std::sync::Arc;

use venue_common::command::Credentials;
use venue_common::instruments::EntityKey;
use venue_common::records::{FillRecord, FundSnapshot, OrderRecord, PositionReport};
use venue_common::OrderRequest;

/// Request correlation id assigned by the gateway.
pub type RequestId = u32;

/// Venue error code plus optional text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Venue-specific error code; never zero.
    pub code: i32,
    /// Venue-provided message, possibly empty.
    pub message: String,
}

impl ApiError {
    /// Error with a code and message.
    pub fn new(code: i32, message: &str) -> Self {
        ApiError {
            code,
            message: String::from(message),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "error code is {}", self.code)
        } else {
            write!(f, "error code is {} ({})", self.code, self.message)
        }
    }
}

/// Immediate answer of a gateway operation.
pub type GatewayResult<T = RequestId> = Result<T, ApiError>;

/// One market data push for an entity.
///
/// Book levels beyond what the venue reports read as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuoteTick {
    /// Entity the tick belongs to.
    pub entity: EntityKey,
    /// Venue-formatted exchange time.
    pub timestamp: String,
    /// Last traded price.
    pub last_price: f64,
    /// Last traded quantity.
    pub last_qty: u64,
    /// Cumulative traded volume.
    pub volume: u64,
    /// Implied bid price (spreads).
    pub implied_bid_price: f64,
    /// Implied bid quantity (spreads).
    pub implied_bid_qty: u64,
    /// Implied ask price (spreads).
    pub implied_ask_price: f64,
    /// Implied ask quantity (spreads).
    pub implied_ask_qty: u64,
    /// Bid prices, best first.
    pub bid_prices: Vec<f64>,
    /// Bid quantities, best first.
    pub bid_qtys: Vec<u64>,
    /// Ask prices, best first.
    pub ask_prices: Vec<f64>,
    /// Ask quantities, best first.
    pub ask_qtys: Vec<u64>,
}

/// One streamed element of a sweep query response.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    /// Request id returned when the query was issued.
    pub request_id: RequestId,
    /// Set when the query failed; ends the query.
    pub error: Option<ApiError>,
    /// Last element of the stream.
    pub is_last: bool,
    /// Record carried by this element; empty results carry none.
    pub record: Option<T>,
}

/// Asynchronous outcome of a submitted or cancelled order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Request id returned by `insert_order`/`cancel_order`.
    pub correlation_id: RequestId,
    /// Exchange-level rejection, if any.
    pub error: Option<ApiError>,
    /// Order as known to the venue after the action.
    pub order: Option<OrderRecord>,
}

/// Everything a gateway reports asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Transport connected to the front.
    Connected,
    /// Transport lost; fatal for the connection.
    Disconnected {
        /// Venue reason code.
        reason: i32,
    },
    /// Answer to `authenticate`.
    AuthenticateResponse {
        /// Failure, if any.
        error: Option<ApiError>,
    },
    /// Answer to `login`.
    LoginResponse {
        /// Failure or notice, if any.
        error: Option<ApiError>,
    },
    /// Venue finished initializing the logged-in session.
    Ready,
    /// Answer to `change_password`.
    ChangePasswordResponse {
        /// Failure, if any.
        error: Option<ApiError>,
    },
    /// Streamed answer to `query_orders`.
    OrderQueryResponse(QueryResponse<OrderRecord>),
    /// Streamed answer to `query_fills`.
    FillQueryResponse(QueryResponse<FillRecord>),
    /// Streamed answer to `query_positions`.
    PositionQueryResponse(QueryResponse<PositionReport>),
    /// Streamed answer to `query_funds`.
    FundQueryResponse(QueryResponse<FundSnapshot>),
    /// Live order update.
    PushOrder(OrderRecord),
    /// Live fill.
    PushFill(FillRecord),
    /// Live position lot or summary.
    PushPosition(PositionReport),
    /// Live fund update.
    PushFund(FundSnapshot),
    /// Answer to `subscribe_quote`.
    SubscribeQuoteResponse {
        /// Entity the subscription was for.
        entity: EntityKey,
        /// Failure, if any.
        error: Option<ApiError>,
    },
    /// Market data push.
    Quote(QuoteTick),
    /// Exchange-level outcome of a submit/cancel.
    ExecutionReport(ExecutionReport),
}

impl GatewayEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Connected => "connected",
            GatewayEvent::Disconnected { .. } => "disconnected",
            GatewayEvent::AuthenticateResponse { .. } => "authenticate-response",
            GatewayEvent::LoginResponse { .. } => "login-response",
            GatewayEvent::Ready => "ready",
            GatewayEvent::ChangePasswordResponse { .. } => "change-password-response",
            GatewayEvent::OrderQueryResponse(_) => "order-query-response",
            GatewayEvent::FillQueryResponse(_) => "fill-query-response",
            GatewayEvent::PositionQueryResponse(_) => "position-query-response",
            GatewayEvent::FundQueryResponse(_) => "fund-query-response",
            GatewayEvent::PushOrder(_) => "push-order",
            GatewayEvent::PushFill(_) => "push-fill",
            GatewayEvent::PushPosition(_) => "push-position",
            GatewayEvent::PushFund(_) => "push-fund",
            GatewayEvent::SubscribeQuoteResponse { .. } => "subscribe-quote-response",
            GatewayEvent::Quote(_) => "quote",
            GatewayEvent::ExecutionReport(_) => "execution-report",
        }
    }
}

/// Receiver of gateway events. Called concurrently from gateway threads.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: GatewayEvent);
}

/// One live connection to a venue gateway.
pub trait Gateway: Send + Sync {
    /// Point the connection at a front.
    fn set_host(&self, ip: &str, port: u16) -> GatewayResult<()>;
    /// Start connecting; completion arrives as `Connected`.
    fn connect(&self, address: &str) -> GatewayResult<()>;
    /// Send the authenticate request.
    fn authenticate(&self, credentials: &Credentials) -> GatewayResult;
    /// Send the login request.
    fn login(&self, credentials: &Credentials) -> GatewayResult;
    /// Log out of the venue.
    fn logout(&self) -> GatewayResult<()>;
    /// Request a password change.
    fn change_password(&self, old_password: &str, new_password: &str) -> GatewayResult;
    /// Start streaming quotes for an entity.
    fn subscribe_quote(&self, entity: &EntityKey) -> GatewayResult;
    /// Stop streaming quotes for an entity.
    fn unsubscribe_quote(&self, entity: &EntityKey) -> GatewayResult;
    /// Query outstanding orders.
    fn query_orders(&self) -> GatewayResult;
    /// Query fills.
    fn query_fills(&self) -> GatewayResult;
    /// Query positions.
    fn query_positions(&self) -> GatewayResult;
    /// Query funds.
    fn query_funds(&self) -> GatewayResult;
    /// Submit a new order.
    fn insert_order(&self, order: &OrderRequest) -> GatewayResult;
    /// Cancel an order by venue order number.
    fn cancel_order(&self, order_id: &str) -> GatewayResult;
    /// Free SDK resources. Must be idempotent; no events follow.
    fn release(&self);
}

/// Factory of gateway connections.
///
/// Each login opens a fresh connection; the handler passed in is the same object
/// for every connection of a session.
pub trait Connector: Send + Sync {
    /// Create a connection whose events go to `handler`.
    fn open(&self, handler: Arc<dyn EventHandler>) -> GatewayResult<Arc<dyn Gateway>>;
}
