//! In-process simulated venue.
//!
//! Every connection runs two threads: one delivers events to the session's handler
//! in order, the other walks the price of each subscribed entity every 500 ms and
//! pushes a quote tick. Orders fill immediately at the last price; cancels are
//! always refused asynchronously since nothing rests on the book.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::{Sender, unbounded};
use log::{debug, info};
use rand::Rng;
use venue_common::command::Credentials;
use venue_common::instruments::{EntityKey, OrderState, OrderType, Side};
use venue_common::records::{FillRecord, FundSnapshot, OrderRecord, PositionPolicy, PositionReport};
use venue_common::OrderRequest;
use venue_session::gateway::{
    ApiError, Connector, EventHandler, ExecutionReport, Gateway, GatewayEvent, GatewayResult,
    QueryResponse, QuoteTick, RequestId,
};

const INITIAL_PRICE: f64 = 100.0;
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Opens simulated connections.
pub struct SimConnector {
    policy: PositionPolicy,
    depth: usize,
}

impl SimConnector {
    /// Connector reporting positions under `policy` with `depth` book levels.
    pub fn new(policy: PositionPolicy, depth: usize) -> Self {
        SimConnector { policy, depth }
    }
}

impl Connector for SimConnector {
    fn open(&self, handler: Arc<dyn EventHandler>) -> GatewayResult<Arc<dyn Gateway>> {
        Ok(Arc::new(SimGateway::start(handler, self.policy, self.depth)))
    }
}

#[derive(Default)]
struct Book {
    prices: HashMap<EntityKey, f64>,
    positions: HashMap<EntityKey, i64>,
}

/// One simulated connection.
pub struct SimGateway {
    outbox: Sender<GatewayEvent>,
    book: Arc<Mutex<Book>>,
    released: Arc<AtomicBool>,
    next_id: AtomicU32,
    policy: PositionPolicy,
}

/// Next price of a small random walk around `current_price`.
fn next_price(current_price: f64) -> f64 {
    let mut rng = rand::rng();
    let change: f64 = rng.random_range(-0.01..0.01);
    let new_price = current_price * (1.0 + change);
    (new_price.max(0.01) * 100.0).round() / 100.0
}

fn generate_tick(entity: &EntityKey, last_price: f64, depth: usize) -> QuoteTick {
    let mut rng = rand::rng();
    let levels = 1..=depth;
    QuoteTick {
        entity: entity.clone(),
        timestamp: now(),
        last_price,
        last_qty: rng.random_range(1..20),
        volume: 1000 + rng.random_range(0..5000),
        bid_prices: levels.clone().map(|l| last_price - 0.01 * l as f64).collect(),
        bid_qtys: levels.clone().map(|_| rng.random_range(1..100)).collect(),
        ask_prices: levels.clone().map(|l| last_price + 0.01 * l as f64).collect(),
        ask_qtys: levels.map(|_| rng.random_range(1..100)).collect(),
        ..QuoteTick::default()
    }
}

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

impl SimGateway {
    fn start(handler: Arc<dyn EventHandler>, policy: PositionPolicy, depth: usize) -> Self {
        let (outbox, inbox) = unbounded::<GatewayEvent>();
        let released = Arc::new(AtomicBool::new(false));
        let book = Arc::new(Mutex::new(Book::default()));

        let delivery_released = Arc::clone(&released);
        thread::spawn(move || {
            for event in inbox {
                if delivery_released.load(Ordering::SeqCst) {
                    break;
                }
                handler.on_event(event);
            }
            debug!("Simulated delivery thread stopped");
        });

        let generator_released = Arc::clone(&released);
        let generator_book = Arc::clone(&book);
        let generator_outbox = outbox.clone();
        thread::spawn(move || {
            info!("Market generator started (Thread ID: {:?})", thread::current().id());
            while !generator_released.load(Ordering::SeqCst) {
                let ticks: Vec<QuoteTick> = match generator_book.lock() {
                    Ok(mut book) => book
                        .prices
                        .iter_mut()
                        .map(|(entity, price)| {
                            *price = next_price(*price);
                            generate_tick(entity, *price, depth)
                        })
                        .collect(),
                    Err(_) => break,
                };
                for tick in ticks {
                    if generator_outbox.send(GatewayEvent::Quote(tick)).is_err() {
                        return;
                    }
                }
                thread::sleep(TICK_INTERVAL);
            }
        });

        SimGateway {
            outbox,
            book,
            released,
            next_id: AtomicU32::new(1),
            policy,
        }
    }

    fn emit(&self, event: GatewayEvent) {
        if self.outbox.send(event).is_err() {
            debug!("Simulated delivery thread gone; event dropped");
        }
    }

    fn request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn empty_query<T>(&self, wrap: fn(QueryResponse<T>) -> GatewayEvent) -> RequestId {
        let request_id = self.request_id();
        self.emit(wrap(QueryResponse {
            request_id,
            error: None,
            is_last: true,
            record: None,
        }));
        request_id
    }

    fn book_error() -> ApiError {
        ApiError::new(-1, "simulated book unavailable")
    }
}

impl Gateway for SimGateway {
    fn set_host(&self, ip: &str, port: u16) -> GatewayResult<()> {
        debug!("Simulated front {}:{}", ip, port);
        Ok(())
    }

    fn connect(&self, address: &str) -> GatewayResult<()> {
        info!("Simulated venue connecting to {}", address);
        self.emit(GatewayEvent::Connected);
        Ok(())
    }

    fn authenticate(&self, _credentials: &Credentials) -> GatewayResult {
        self.emit(GatewayEvent::AuthenticateResponse { error: None });
        Ok(self.request_id())
    }

    fn login(&self, credentials: &Credentials) -> GatewayResult {
        if credentials.user_id.is_empty() {
            return Err(ApiError::new(1, "empty user id"));
        }
        self.emit(GatewayEvent::LoginResponse { error: None });
        self.emit(GatewayEvent::Ready);
        Ok(self.request_id())
    }

    fn logout(&self) -> GatewayResult<()> {
        Ok(())
    }

    fn change_password(&self, _old_password: &str, _new_password: &str) -> GatewayResult {
        self.emit(GatewayEvent::ChangePasswordResponse { error: None });
        Ok(self.request_id())
    }

    fn subscribe_quote(&self, entity: &EntityKey) -> GatewayResult {
        let mut book = self.book.lock().map_err(|_| Self::book_error())?;
        book.prices.entry(entity.clone()).or_insert(INITIAL_PRICE);
        self.emit(GatewayEvent::SubscribeQuoteResponse {
            entity: entity.clone(),
            error: None,
        });
        Ok(self.request_id())
    }

    fn unsubscribe_quote(&self, entity: &EntityKey) -> GatewayResult {
        let mut book = self.book.lock().map_err(|_| Self::book_error())?;
        book.prices.remove(entity);
        Ok(self.request_id())
    }

    fn query_orders(&self) -> GatewayResult {
        Ok(self.empty_query(GatewayEvent::OrderQueryResponse))
    }

    fn query_fills(&self) -> GatewayResult {
        Ok(self.empty_query(GatewayEvent::FillQueryResponse))
    }

    fn query_positions(&self) -> GatewayResult {
        Ok(self.empty_query(GatewayEvent::PositionQueryResponse))
    }

    fn query_funds(&self) -> GatewayResult {
        let request_id = self.request_id();
        self.emit(GatewayEvent::FundQueryResponse(QueryResponse {
            request_id,
            error: None,
            is_last: true,
            record: Some(FundSnapshot {
                balance: 1_000_000.0,
                equity: 1_000_000.0,
                available: 1_000_000.0,
                market_equity: 0.0,
            }),
        }));
        Ok(request_id)
    }

    fn insert_order(&self, order: &OrderRequest) -> GatewayResult {
        if let Some(second_leg) = &order.second_leg {
            debug!("Simulated spread order {} / {}", order.first_leg, second_leg);
        }
        let mut book = self.book.lock().map_err(|_| Self::book_error())?;
        let price = match order.order_type {
            OrderType::Market => *book.prices.get(&order.entity).unwrap_or(&INITIAL_PRICE),
            OrderType::Limit => order.price,
        };
        let net = book.positions.entry(order.entity.clone()).or_insert(0);
        *net += order.side.multiplier() * i64::from(order.quantity);
        let net = *net;
        drop(book);

        let request_id = self.request_id();
        let order_id = format!("SIM{:06}", request_id);
        let time = now();
        self.emit(GatewayEvent::ExecutionReport(ExecutionReport {
            correlation_id: request_id,
            error: None,
            order: Some(OrderRecord {
                order_id: order_id.clone(),
                entity: order.entity.clone(),
                order_type: order.order_type,
                side: order.side,
                price: order.price,
                quantity: order.quantity,
                state: OrderState::Finished,
                inserted_at: time.clone(),
                updated_at: time.clone(),
                matched_quantity: order.quantity,
            }),
        }));
        self.emit(GatewayEvent::PushFill(FillRecord {
            fill_id: format!("M{}", order_id),
            order_id,
            entity: order.entity.clone(),
            side: order.side,
            price,
            quantity: order.quantity,
            timestamp: time,
        }));
        let report = match self.policy {
            PositionPolicy::Accumulate => PositionReport {
                entity: order.entity.clone(),
                side: order.side,
                quantity: order.quantity,
                policy: self.policy,
            },
            PositionPolicy::Replace => PositionReport {
                entity: order.entity.clone(),
                side: if net < 0 { Side::Sell } else { Side::Buy },
                quantity: u32::try_from(net.unsigned_abs()).unwrap_or(u32::MAX),
                policy: self.policy,
            },
        };
        self.emit(GatewayEvent::PushPosition(report));
        Ok(request_id)
    }

    fn cancel_order(&self, order_id: &str) -> GatewayResult {
        let request_id = self.request_id();
        self.emit(GatewayEvent::ExecutionReport(ExecutionReport {
            correlation_id: request_id,
            error: Some(ApiError::new(60, &format!("order {} is not cancelable", order_id))),
            order: None,
        }));
        Ok(request_id)
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            info!("Simulated connection released");
        }
    }
}
