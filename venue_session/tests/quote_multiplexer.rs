mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use venue_common::records::PositionPolicy;
use venue_session::gateway::{ApiError, GatewayEvent};
use venue_session::host::{Cell, HostSurface, HostValue};
use venue_session::quotes::{QuoteValue, SubscriptionState};
use venue_session::{AlertSource, SessionController, SessionState};

fn ready_session(script: Script) -> (Arc<SessionController>, Arc<ScriptedConnector>) {
    init_logger();
    let connector = ScriptedConnector::new(script);
    let session = SessionController::new(config(true, false, PositionPolicy::Accumulate), connector.clone()).unwrap();
    session.login().unwrap();
    (Arc::new(session), connector)
}

#[test]
fn second_topic_on_cached_entity_is_served_immediately() {
    let (session, connector) = ready_session(Script::default());
    let quotes = session.quotes();

    let last = quotes.register_topic(&es(), "LastPrice").unwrap();
    assert!(last.initial.is_none());
    connector.latest().emit(GatewayEvent::Quote(tick(es(), 4500.5, 321)));
    let update = last.updates.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(update.field, "LastPrice");
    assert_eq!(update.value, QuoteValue::Number(4500.5));

    let volume = quotes.register_topic(&es(), "Volume").unwrap();
    assert_eq!(volume.initial, Some(QuoteValue::Number(321.0)));
    assert_eq!(connector.count_calls("subscribe"), 1);
    assert_eq!(quotes.subscription_state(&es()).unwrap(), Some(SubscriptionState::Subscribed));
}

#[test]
fn every_topic_of_an_entity_sees_each_tick_in_order() {
    let (session, connector) = ready_session(Script::default());
    let quotes = session.quotes();
    let last = quotes.register_topic(&es(), "LastPrice").unwrap();
    let bid = quotes.register_topic(&es(), "BidPrice1").unwrap();
    let ask_qty = quotes.register_topic(&es(), "AskQty1").unwrap();

    let gateway = connector.latest();
    for i in 0..20 {
        gateway.emit(GatewayEvent::Quote(tick(es(), 100.0 + f64::from(i), 1)));
    }
    for i in 0..20 {
        let price = 100.0 + f64::from(i);
        let timeout = Duration::from_secs(2);
        assert_eq!(last.updates.recv_timeout(timeout).unwrap().value, QuoteValue::Number(price));
        assert_eq!(bid.updates.recv_timeout(timeout).unwrap().value, QuoteValue::Number(price - 0.25));
        assert_eq!(ask_qty.updates.recv_timeout(timeout).unwrap().value, QuoteValue::Number(12.0));
    }
    let cached = quotes.cached_values(&es()).unwrap().unwrap();
    assert_eq!(cached.len(), quotes.field_names().len());
}

#[test]
fn concurrent_registrations_coalesce_into_one_subscribe() {
    let (session, connector) = ready_session(Script::default());
    let fields = ["LastPrice", "Volume", "BidPrice1", "AskPrice1", "BidQty2", "AskQty2", "LastQty", "Timestamp"];

    let handles: Vec<_> = fields
        .iter()
        .map(|field| {
            let session = Arc::clone(&session);
            let field = String::from(*field);
            thread::spawn(move || session.quotes().register_topic(&es(), &field).unwrap())
        })
        .collect();
    let topics: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(topics.len(), fields.len());
    assert_eq!(connector.count_calls("subscribe"), 1);
    assert_eq!(session.quotes().registry().unwrap(), vec![es()]);
}

#[test]
fn rejected_subscription_alerts_and_leaves_the_registry() {
    let (session, _connector) = ready_session(Script {
        subscribe_error: Some(ApiError::new(404, "contract not found")),
        ..Script::default()
    });
    let alerts = session.alerts();
    let topic = session.quotes().register_topic(&nq(), "LastPrice").unwrap();

    let alert = alerts.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(alert.source, AlertSource::Subscription);
    assert!(alert.message.contains("contract not found"));
    assert!(wait_until(|| session.quotes().registry().unwrap().is_empty()));
    assert!(topic.updates.recv_timeout(Duration::from_secs(2)).is_err());
}

#[test]
fn topics_registered_before_login_subscribe_on_ready() {
    init_logger();
    let connector = ScriptedConnector::new(Script::default());
    let session = SessionController::new(config(true, false, PositionPolicy::Accumulate), connector.clone()).unwrap();

    let _a = session.quotes().register_topic(&es(), "LastPrice").unwrap();
    let _b = session.quotes().register_topic(&nq(), "LastPrice").unwrap();
    assert_eq!(
        session.quotes().subscription_state(&es()).unwrap(),
        Some(SubscriptionState::Unsubscribed)
    );

    session.login().unwrap();
    assert_eq!(connector.count_calls("subscribe"), 2);
}

#[test]
fn registrations_racing_a_reconnect_subscribe_each_entity_once() {
    for _ in 0..10 {
        let (session, connector) = ready_session(Script::default());
        let _es = session.quotes().register_topic(&es(), "LastPrice").unwrap();
        assert_eq!(connector.count_calls(&format!("subscribe {}", es())), 1);

        connector.latest().emit(GatewayEvent::Disconnected { reason: 2 });
        assert!(wait_until(|| session.state() == SessionState::Faulted));

        let relogin = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.login())
        };
        let racers: Vec<_> = ["Volume", "BidPrice1", "AskPrice1", "LastQty"]
            .iter()
            .flat_map(|field| [(es(), *field), (nq(), *field)])
            .map(|(entity, field)| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.quotes().register_topic(&entity, field).unwrap())
            })
            .collect();
        let _topics: Vec<_> = racers.into_iter().map(|h| h.join().unwrap()).collect();
        relogin.join().unwrap().unwrap();

        // One subscribe per entity on the new connection, whoever sent it.
        assert_eq!(connector.count_calls(&format!("subscribe {}", es())), 2);
        assert_eq!(connector.count_calls(&format!("subscribe {}", nq())), 1);
        for entity in [es(), nq()] {
            assert_ne!(
                session.quotes().subscription_state(&entity).unwrap(),
                Some(SubscriptionState::Unsubscribed)
            );
        }
    }
}

#[test]
fn dropping_the_last_topic_unsubscribes() {
    let (session, connector) = ready_session(Script::default());
    let quotes = session.quotes();
    let _topic = quotes.register_topic(&es(), "LastPrice").unwrap();
    assert!(quotes.unregister_topic(&es(), "LastPrice").unwrap());
    assert_eq!(connector.count_calls("unsubscribe"), 1);
    assert!(quotes.registry().unwrap().is_empty());

    let _again = quotes.register_topic(&es(), "LastPrice").unwrap();
    assert_eq!(connector.count_calls("subscribe"), 2);
}

#[test]
fn host_quote_functions() {
    let (session, connector) = ready_session(Script::default());
    let host = HostSurface::new(Arc::clone(&session));

    match host.quote_fields().unwrap() {
        HostValue::Table(table) => {
            assert_eq!(table.columns, vec![String::from("Field")]);
            assert_eq!(table.rows.len(), 8 + 4 * 2);
            assert_eq!(table.rows[1], vec![Cell::Text(String::from("LastPrice"))]);
        }
        other => panic!("unexpected {:?}", other),
    }

    let topic = host.quote_details("CME,ES,2412", "AskPrice1").unwrap();
    connector.latest().emit(GatewayEvent::Quote(tick(es(), 10.0, 1)));
    assert_eq!(
        topic.updates.recv_timeout(Duration::from_secs(2)).unwrap().value,
        QuoteValue::Number(10.25)
    );

    assert_eq!(host.quote_details("CME,ES,2412", "Nope").unwrap_err(), "#ERR: Invalid field: Nope");
    assert!(host.quote_details("CME", "LastPrice").unwrap_err().starts_with("#ERR: "));
}
