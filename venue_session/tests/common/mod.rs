#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use venue_common::command::Credentials;
use venue_common::config::load_config_from_str;
use venue_common::instruments::{EntityKey, OrderState, Side};
use venue_common::records::{FillRecord, FundSnapshot, OrderRecord, PositionPolicy, PositionReport};
use venue_common::{OrderRequest, VenueConfig};
use venue_session::gateway::{
    ApiError, Connector, EventHandler, ExecutionReport, Gateway, GatewayEvent, GatewayResult,
    QueryResponse, QuoteTick, RequestId,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the scripted venue answers. Shared by every connection of a connector.
#[derive(Default, Clone)]
pub struct Script {
    pub silent_connect: bool,
    pub silent_auth: bool,
    pub silent_queries: bool,
    pub silent_execution: bool,
    pub auth_error: Option<ApiError>,
    pub login_error: Option<ApiError>,
    pub password_error: Option<ApiError>,
    pub subscribe_error: Option<ApiError>,
    pub fills_error: Option<ApiError>,
    pub reject_insert: Option<ApiError>,
    pub reject_execution: Option<ApiError>,
    pub orders: Vec<OrderRecord>,
    pub fills: Vec<FillRecord>,
    pub positions: Vec<PositionReport>,
    pub funds: Option<FundSnapshot>,
}

/// One connection of the scripted venue. Events are delivered in order from a
/// dedicated thread, after the call that caused them has returned.
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<String>>>,
    outbox: Sender<GatewayEvent>,
    released: Arc<AtomicBool>,
    next_id: AtomicU32,
}

impl ScriptedGateway {
    fn new(script: Arc<Mutex<Script>>, calls: Arc<Mutex<Vec<String>>>, handler: Arc<dyn EventHandler>) -> Self {
        let (outbox, inbox) = unbounded::<GatewayEvent>();
        let released = Arc::new(AtomicBool::new(false));
        let delivery_released = Arc::clone(&released);
        thread::spawn(move || {
            for event in inbox {
                if delivery_released.load(Ordering::SeqCst) {
                    break;
                }
                handler.on_event(event);
            }
        });
        ScriptedGateway {
            script,
            calls,
            outbox,
            released,
            next_id: AtomicU32::new(1),
        }
    }

    /// Deliver an event as if the venue pushed it.
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.outbox.send(event);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }

    fn request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn stream<T: Clone>(
        &self,
        records: &[T],
        error: Option<ApiError>,
        wrap: fn(QueryResponse<T>) -> GatewayEvent,
    ) -> RequestId {
        let request_id = self.request_id();
        if self.script().silent_queries {
            return request_id;
        }
        if error.is_some() {
            self.emit(wrap(QueryResponse {
                request_id,
                error,
                is_last: true,
                record: None,
            }));
            return request_id;
        }
        if records.is_empty() {
            self.emit(wrap(QueryResponse {
                request_id,
                error: None,
                is_last: true,
                record: None,
            }));
        }
        for (i, record) in records.iter().enumerate() {
            self.emit(wrap(QueryResponse {
                request_id,
                error: None,
                is_last: i + 1 == records.len(),
                record: Some(record.clone()),
            }));
        }
        request_id
    }
}

impl Gateway for ScriptedGateway {
    fn set_host(&self, ip: &str, port: u16) -> GatewayResult<()> {
        self.record(format!("set_host {}:{}", ip, port));
        Ok(())
    }

    fn connect(&self, address: &str) -> GatewayResult<()> {
        self.record(format!("connect {}", address));
        if !self.script().silent_connect {
            self.emit(GatewayEvent::Connected);
        }
        Ok(())
    }

    fn authenticate(&self, _credentials: &Credentials) -> GatewayResult {
        self.record(String::from("authenticate"));
        let script = self.script();
        if !script.silent_auth {
            self.emit(GatewayEvent::AuthenticateResponse { error: script.auth_error });
        }
        Ok(self.request_id())
    }

    fn login(&self, credentials: &Credentials) -> GatewayResult {
        self.record(format!("login {}", credentials.password));
        let error = self.script().login_error;
        let failed = error.as_ref().is_some_and(|e| e.code != 10003);
        self.emit(GatewayEvent::LoginResponse { error });
        if !failed {
            self.emit(GatewayEvent::Ready);
        }
        Ok(self.request_id())
    }

    fn logout(&self) -> GatewayResult<()> {
        self.record(String::from("logout"));
        Ok(())
    }

    fn change_password(&self, _old_password: &str, new_password: &str) -> GatewayResult {
        self.record(format!("change_password {}", new_password));
        let error = self.script().password_error;
        self.emit(GatewayEvent::ChangePasswordResponse { error });
        Ok(self.request_id())
    }

    fn subscribe_quote(&self, entity: &EntityKey) -> GatewayResult {
        self.record(format!("subscribe {}", entity));
        let error = self.script().subscribe_error;
        self.emit(GatewayEvent::SubscribeQuoteResponse {
            entity: entity.clone(),
            error,
        });
        Ok(self.request_id())
    }

    fn unsubscribe_quote(&self, entity: &EntityKey) -> GatewayResult {
        self.record(format!("unsubscribe {}", entity));
        Ok(self.request_id())
    }

    fn query_orders(&self) -> GatewayResult {
        self.record(String::from("query orders"));
        let script = self.script();
        Ok(self.stream(&script.orders, None, GatewayEvent::OrderQueryResponse))
    }

    fn query_fills(&self) -> GatewayResult {
        self.record(String::from("query fills"));
        let script = self.script();
        Ok(self.stream(&script.fills, script.fills_error, GatewayEvent::FillQueryResponse))
    }

    fn query_positions(&self) -> GatewayResult {
        self.record(String::from("query positions"));
        let script = self.script();
        Ok(self.stream(&script.positions, None, GatewayEvent::PositionQueryResponse))
    }

    fn query_funds(&self) -> GatewayResult {
        self.record(String::from("query funds"));
        let funds: Vec<FundSnapshot> = self.script().funds.into_iter().collect();
        Ok(self.stream(&funds, None, GatewayEvent::FundQueryResponse))
    }

    fn insert_order(&self, order: &OrderRequest) -> GatewayResult {
        self.record(format!("insert {} {} {}", order.side, order.quantity, order.entity));
        let script = self.script();
        if let Some(e) = script.reject_insert {
            return Err(e);
        }
        let correlation_id = self.request_id();
        if script.silent_execution {
            return Ok(correlation_id);
        }
        let accepted = script.reject_execution.is_none();
        self.emit(GatewayEvent::ExecutionReport(ExecutionReport {
            correlation_id,
            error: script.reject_execution,
            order: Some(OrderRecord {
                order_id: format!("SIM{}", correlation_id),
                entity: order.entity.clone(),
                order_type: order.order_type,
                side: order.side,
                price: order.price,
                quantity: order.quantity,
                state: if accepted { OrderState::Queued } else { OrderState::Fail },
                inserted_at: String::from("09:30:00"),
                updated_at: String::from("09:30:00"),
                matched_quantity: 0,
            }),
        }));
        Ok(correlation_id)
    }

    fn cancel_order(&self, order_id: &str) -> GatewayResult {
        self.record(format!("cancel {}", order_id));
        let correlation_id = self.request_id();
        self.emit(GatewayEvent::ExecutionReport(ExecutionReport {
            correlation_id,
            error: self.script().reject_execution,
            order: None,
        }));
        Ok(correlation_id)
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Opens scripted connections and keeps every one for inspection.
#[derive(Default)]
pub struct ScriptedConnector {
    pub script: Arc<Mutex<Script>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    connections: Mutex<Vec<Arc<ScriptedGateway>>>,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(ScriptedConnector {
            script: Arc::new(Mutex::new(script)),
            ..ScriptedConnector::default()
        })
    }

    pub fn latest(&self) -> Arc<ScriptedGateway> {
        Arc::clone(self.connections.lock().unwrap().last().unwrap())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// The session's handler, for injecting events outside any connection.
    pub fn handler(&self) -> Arc<dyn EventHandler> {
        Arc::clone(self.handler.lock().unwrap().as_ref().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, handler: Arc<dyn EventHandler>) -> GatewayResult<Arc<dyn Gateway>> {
        *self.handler.lock().unwrap() = Some(Arc::clone(&handler));
        let gateway = Arc::new(ScriptedGateway::new(
            Arc::clone(&self.script),
            Arc::clone(&self.calls),
            handler,
        ));
        self.connections.lock().unwrap().push(Arc::clone(&gateway));
        Ok(gateway)
    }
}

pub fn config(requires_authenticate: bool, awaits_ready: bool, policy: PositionPolicy) -> VenueConfig {
    load_config_from_str(&format!(
        r#"{{
            "name": "scripted",
            "host": {{ "ip": "127.0.0.1", "port": 7100 }},
            "credentials": {{ "user_id": "T1001", "password": "secret" }},
            "profile": {{
                "requires_authenticate": {},
                "awaits_ready": {},
                "ignored_login_codes": [10003]
            }},
            "position_policy": "{}",
            "market_depth": 2,
            "wait_timeout_ms": 5000
        }}"#,
        requires_authenticate, awaits_ready, policy
    ))
    .unwrap()
}

pub fn es() -> EntityKey {
    EntityKey::new("CME", "ES", "2412")
}

pub fn nq() -> EntityKey {
    EntityKey::new("CME", "NQ", "2412")
}

pub fn order(order_id: &str, state: OrderState) -> OrderRecord {
    OrderRecord {
        order_id: String::from(order_id),
        entity: es(),
        order_type: venue_common::instruments::OrderType::Limit,
        side: Side::Buy,
        price: 4500.0,
        quantity: 2,
        state,
        inserted_at: String::from("09:00:00"),
        updated_at: String::from("09:00:01"),
        matched_quantity: 0,
    }
}

pub fn fill(fill_id: &str) -> FillRecord {
    FillRecord {
        fill_id: String::from(fill_id),
        order_id: String::from("O1"),
        entity: es(),
        side: Side::Buy,
        price: 4500.25,
        quantity: 1,
        timestamp: String::from("09:00:02"),
    }
}

pub fn position(side: Side, quantity: u32, policy: PositionPolicy) -> PositionReport {
    PositionReport {
        entity: es(),
        side,
        quantity,
        policy,
    }
}

pub fn tick(entity: EntityKey, last_price: f64, volume: u64) -> QuoteTick {
    QuoteTick {
        entity,
        timestamp: String::from("09:30:00.000"),
        last_price,
        volume,
        bid_prices: vec![last_price - 0.25],
        bid_qtys: vec![10],
        ask_prices: vec![last_price + 0.25],
        ask_qtys: vec![12],
        ..QuoteTick::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
