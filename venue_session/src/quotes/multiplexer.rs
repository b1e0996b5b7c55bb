//! Quote topics multiplexed onto upstream subscriptions.
//!
//! Many `(entity, field)` topics share one upstream subscription per entity. The
//! latest values of every tracked field are cached per entity, so a topic on an
//! entity that is already streaming starts with a value. The registry lists every
//! entity with live topics and is replayed after each reconnect.
//!
//! Locks are always taken in the order entities, topics, registry, and are never
//! held across a gateway call.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use serde::Serialize;
use strum_macros::Display;
use venue_common::instruments::EntityKey;
use venue_common::{Result, VenueError};

use crate::alerts::{AlertSource, Notifier};
use crate::gateway::{ApiError, QuoteTick};
use crate::link::GatewayLink;
use crate::quotes::fields::{FieldTable, QuoteValue};

/// Upstream subscription state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SubscriptionState {
    /// No upstream subscription on the current connection.
    Unsubscribed,
    /// Subscribe sent, no answer or tick yet.
    Subscribing,
    /// Upstream confirmed or already streaming.
    Subscribed,
}

/// One value pushed to a topic consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicUpdate {
    /// Entity the value belongs to.
    pub entity: EntityKey,
    /// Field name.
    pub field: String,
    /// New value.
    pub value: QuoteValue,
}

/// Handle returned to a host that registered a topic.
#[derive(Debug)]
pub struct TopicSubscription {
    /// Entity of the topic.
    pub entity: EntityKey,
    /// Field of the topic.
    pub field: String,
    /// Cached value at registration time, if the entity had been quoted before.
    pub initial: Option<QuoteValue>,
    /// Every later value for this topic.
    pub updates: Receiver<TopicUpdate>,
}

struct EntityQuotes {
    state: SubscriptionState,
    // Latest full field set, in field-table order.
    cache: Option<Vec<QuoteValue>>,
}

struct TopicEntry {
    field_index: usize,
    last_value: Option<QuoteValue>,
    consumers: Vec<Sender<TopicUpdate>>,
}

type TopicMap = HashMap<EntityKey, HashMap<String, TopicEntry>>;

/// Maps many field topics onto one upstream subscription per entity.
///
/// Locks are always taken in the order entities, topics, registry, and no gateway
/// call is made while any of them is held.
pub struct QuoteMultiplexer {
    fields: FieldTable,
    link: Arc<GatewayLink>,
    notifier: Notifier,
    entities: Mutex<HashMap<EntityKey, EntityQuotes>>,
    topics: Mutex<TopicMap>,
    registry: Mutex<Vec<EntityKey>>,
}

impl QuoteMultiplexer {
    /// Multiplexer tracking `depth` book levels, subscribing through `link`.
    pub fn new(depth: usize, link: Arc<GatewayLink>, notifier: Notifier) -> Self {
        QuoteMultiplexer {
            fields: FieldTable::new(depth),
            link,
            notifier,
            entities: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            registry: Mutex::new(Vec::new()),
        }
    }

    /// Tracked field names in cache-entry order.
    pub fn field_names(&self) -> &[String] {
        self.fields.names()
    }

    /// Register interest in one field of one entity.
    ///
    /// The first topic of an entity triggers one upstream subscribe when the session
    /// is Ready; otherwise the entity waits in the registry until the next Ready.
    pub fn register_topic(&self, entity: &EntityKey, field: &str) -> Result<TopicSubscription> {
        let field_index = self
            .fields
            .index_of(field)
            .ok_or_else(|| VenueError::InvalidField(String::from(field)))?;
        let (tx, rx) = unbounded();

        let (initial, subscribe_now) = {
            let mut entities = self.entities.lock()?;
            let quotes = entities.entry(entity.clone()).or_insert(EntityQuotes {
                state: SubscriptionState::Unsubscribed,
                cache: None,
            });
            let initial = quotes.cache.as_ref().map(|values| values[field_index].clone());
            let subscribe_now =
                quotes.state == SubscriptionState::Unsubscribed && self.link.is_installed();
            if subscribe_now {
                quotes.state = SubscriptionState::Subscribing;
            }

            let mut topics = self.topics.lock()?;
            let topic = topics
                .entry(entity.clone())
                .or_default()
                .entry(String::from(field))
                .or_insert(TopicEntry {
                    field_index,
                    last_value: None,
                    consumers: Vec::new(),
                });
            if topic.last_value.is_none() {
                topic.last_value = initial.clone();
            }
            topic.consumers.push(tx.clone());

            let mut registry = self.registry.lock()?;
            if !registry.contains(entity) {
                registry.push(entity.clone());
            }
            (initial, subscribe_now)
        };

        if initial.is_some() {
            debug!("Topic {}/{} served from cache", entity, field);
        }

        if subscribe_now {
            match self.link.current() {
                Ok(gateway) => {
                    if let Err(e) = gateway.subscribe_quote(entity) {
                        self.rollback_registration(entity, field, &tx)?;
                        self.notifier.alert(
                            AlertSource::Subscription,
                            format!("Failed to subscribe quote for [{}]: {}", entity, e),
                        );
                        return Err(VenueError::SubscriptionRejected {
                            entity: entity.to_string(),
                            message: e.to_string(),
                        });
                    }
                    info!("Subscribing quotes for {}", entity);
                }
                // Connection dropped after the check; the next Ready picks it up.
                Err(_) => self.set_state(entity, SubscriptionState::Unsubscribed)?,
            }
        }

        Ok(TopicSubscription {
            entity: entity.clone(),
            field: String::from(field),
            initial,
            updates: rx,
        })
    }

    fn rollback_registration(&self, entity: &EntityKey, field: &str, tx: &Sender<TopicUpdate>) -> Result<()> {
        let mut entities = self.entities.lock()?;
        if let Some(quotes) = entities.get_mut(entity) {
            quotes.state = SubscriptionState::Unsubscribed;
        }
        let mut topics = self.topics.lock()?;
        let entity_orphaned = match topics.get_mut(entity) {
            Some(fields) => {
                if let Some(topic) = fields.get_mut(field) {
                    topic.consumers.retain(|c| !c.same_channel(tx));
                    if topic.consumers.is_empty() {
                        fields.remove(field);
                    }
                }
                fields.is_empty()
            }
            None => true,
        };
        if entity_orphaned {
            topics.remove(entity);
            let mut registry = self.registry.lock()?;
            registry.retain(|k| k != entity);
        }
        Ok(())
    }

    fn set_state(&self, entity: &EntityKey, state: SubscriptionState) -> Result<()> {
        let mut entities = self.entities.lock()?;
        if let Some(quotes) = entities.get_mut(entity) {
            quotes.state = state;
        }
        Ok(())
    }

    /// Drop one topic. The last topic of an entity ends its upstream subscription.
    ///
    /// Returns whether the topic existed. Receivers of the dropped topic see their
    /// channel close.
    pub fn unregister_topic(&self, entity: &EntityKey, field: &str) -> Result<bool> {
        let unsubscribe = {
            let mut entities = self.entities.lock()?;
            let mut topics = self.topics.lock()?;
            let Some(fields) = topics.get_mut(entity) else {
                return Ok(false);
            };
            if fields.remove(field).is_none() {
                return Ok(false);
            }
            if !fields.is_empty() {
                return Ok(true);
            }
            topics.remove(entity);
            let mut registry = self.registry.lock()?;
            registry.retain(|k| k != entity);
            match entities.get_mut(entity) {
                Some(quotes) => {
                    let was_live = quotes.state != SubscriptionState::Unsubscribed;
                    quotes.state = SubscriptionState::Unsubscribed;
                    was_live
                }
                None => false,
            }
        };

        if unsubscribe {
            if let Ok(gateway) = self.link.current() {
                match gateway.unsubscribe_quote(entity) {
                    Ok(_) => info!("Unsubscribed quotes for {}", entity),
                    Err(e) => self.notifier.alert(
                        AlertSource::Subscription,
                        format!("Failed to unsubscribe quote for [{}]: {}", entity, e),
                    ),
                }
            }
        }
        Ok(true)
    }

    /// Apply one tick: replace the entity's cache entry, then notify its topics.
    ///
    /// Both happen under the entities lock so ticks of one entity are applied and
    /// delivered in arrival order.
    pub fn on_quote(&self, tick: &QuoteTick) -> Result<()> {
        let mut entities = self.entities.lock()?;
        let Some(quotes) = entities.get_mut(&tick.entity) else {
            debug!("Quote for untracked entity {} ignored", tick.entity);
            return Ok(());
        };
        let values = self.fields.extract(tick);
        if quotes.state == SubscriptionState::Subscribing {
            quotes.state = SubscriptionState::Subscribed;
        }

        let mut topics = self.topics.lock()?;
        if let Some(fields) = topics.get_mut(&tick.entity) {
            for (field, topic) in fields.iter_mut() {
                let value = values[topic.field_index].clone();
                topic.last_value = Some(value.clone());
                topic.consumers.retain(|tx| {
                    tx.send(TopicUpdate {
                        entity: tick.entity.clone(),
                        field: field.clone(),
                        value: value.clone(),
                    })
                    .is_ok()
                });
            }
        }
        quotes.cache = Some(values);
        Ok(())
    }

    /// Apply the venue's answer to a subscribe request.
    pub fn on_subscribe_response(&self, entity: &EntityKey, error: Option<&ApiError>) -> Result<()> {
        match error {
            None => {
                self.set_state(entity, SubscriptionState::Subscribed)?;
                info!("Quote subscription confirmed for {}", entity);
            }
            Some(e) => {
                {
                    let mut entities = self.entities.lock()?;
                    if let Some(quotes) = entities.get_mut(entity) {
                        quotes.state = SubscriptionState::Unsubscribed;
                    }
                    let mut topics = self.topics.lock()?;
                    topics.remove(entity);
                    let mut registry = self.registry.lock()?;
                    registry.retain(|k| k != entity);
                }
                self.notifier.alert(
                    AlertSource::Subscription,
                    format!("Failed to subscribe quote for [{}]: {}", entity, e),
                );
            }
        }
        Ok(())
    }

    /// Re-issue one subscribe per registry entity that has none on this connection.
    ///
    /// Entities are snapshotted and marked `Subscribing` under the lock, so a topic
    /// registered concurrently either lands in the snapshot or subscribes itself,
    /// never both. Returns the number of subscribe requests sent.
    pub fn resubscribe_all(&self) -> Result<usize> {
        let pending: Vec<EntityKey> = {
            let mut entities = self.entities.lock()?;
            let registry = self.registry.lock()?;
            registry
                .iter()
                .filter(|key| {
                    entities
                        .get_mut(*key)
                        .map(|quotes| {
                            let idle = quotes.state == SubscriptionState::Unsubscribed;
                            if idle {
                                quotes.state = SubscriptionState::Subscribing;
                            }
                            idle
                        })
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        let gateway = match self.link.current() {
            Ok(gateway) => gateway,
            Err(e) => {
                for entity in &pending {
                    self.set_state(entity, SubscriptionState::Unsubscribed)?;
                }
                return Err(e);
            }
        };

        let mut sent = 0;
        for entity in &pending {
            match gateway.subscribe_quote(entity) {
                Ok(_) => sent += 1,
                Err(e) => {
                    self.set_state(entity, SubscriptionState::Unsubscribed)?;
                    self.notifier.alert(
                        AlertSource::Subscription,
                        format!("Failed to resubscribe quote for [{}]: {}", entity, e),
                    );
                }
            }
        }
        if sent > 0 {
            info!("Resubscribed quotes for {} entities", sent);
        }
        Ok(sent)
    }

    /// The connection is gone: no entity has a live subscription any more.
    pub fn on_session_lost(&self) {
        match self.entities.lock() {
            Ok(mut entities) => {
                for quotes in entities.values_mut() {
                    quotes.state = SubscriptionState::Unsubscribed;
                }
            }
            Err(e) => warn!("Quote state lock poisoned on session loss: {}", e),
        }
    }

    /// Upstream state of `entity`, if it was ever registered.
    pub fn subscription_state(&self, entity: &EntityKey) -> Result<Option<SubscriptionState>> {
        let entities = self.entities.lock()?;
        Ok(entities.get(entity).map(|q| q.state))
    }

    /// Latest full field set of `entity`, in `field_names()` order.
    pub fn cached_values(&self, entity: &EntityKey) -> Result<Option<Vec<QuoteValue>>> {
        let entities = self.entities.lock()?;
        Ok(entities.get(entity).and_then(|q| q.cache.clone()))
    }

    /// Last value delivered to a topic.
    pub fn topic_value(&self, entity: &EntityKey, field: &str) -> Result<Option<QuoteValue>> {
        let topics = self.topics.lock()?;
        Ok(topics
            .get(entity)
            .and_then(|fields| fields.get(field))
            .and_then(|topic| topic.last_value.clone()))
    }

    /// Entities with requested upstream interest, in registration order.
    pub fn registry(&self) -> Result<Vec<EntityKey>> {
        let registry = self.registry.lock()?;
        Ok(registry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, GatewayResult};
    use std::sync::atomic::{AtomicU32, Ordering};
    use venue_common::OrderRequest;
    use venue_common::command::Credentials;

    #[derive(Default)]
    struct CountingGateway {
        subscribes: AtomicU32,
        unsubscribes: AtomicU32,
        reject: bool,
    }

    impl Gateway for CountingGateway {
        fn set_host(&self, _: &str, _: u16) -> GatewayResult<()> {
            Ok(())
        }
        fn connect(&self, _: &str) -> GatewayResult<()> {
            Ok(())
        }
        fn authenticate(&self, _: &Credentials) -> GatewayResult {
            Ok(1)
        }
        fn login(&self, _: &Credentials) -> GatewayResult {
            Ok(1)
        }
        fn logout(&self) -> GatewayResult<()> {
            Ok(())
        }
        fn change_password(&self, _: &str, _: &str) -> GatewayResult {
            Ok(1)
        }
        fn subscribe_quote(&self, _: &EntityKey) -> GatewayResult {
            if self.reject {
                return Err(ApiError::new(12, "no permission"));
            }
            Ok(self.subscribes.fetch_add(1, Ordering::SeqCst) + 1)
        }
        fn unsubscribe_quote(&self, _: &EntityKey) -> GatewayResult {
            Ok(self.unsubscribes.fetch_add(1, Ordering::SeqCst) + 1)
        }
        fn query_orders(&self) -> GatewayResult {
            Ok(1)
        }
        fn query_fills(&self) -> GatewayResult {
            Ok(1)
        }
        fn query_positions(&self) -> GatewayResult {
            Ok(1)
        }
        fn query_funds(&self) -> GatewayResult {
            Ok(1)
        }
        fn insert_order(&self, _: &OrderRequest) -> GatewayResult {
            Ok(1)
        }
        fn cancel_order(&self, _: &str) -> GatewayResult {
            Ok(1)
        }
        fn release(&self) {}
    }

    fn ready(gateway: Arc<CountingGateway>) -> (QuoteMultiplexer, Receiver<crate::alerts::Alert>) {
        let link = Arc::new(GatewayLink::new());
        link.install(gateway).unwrap();
        let (notifier, alerts) = Notifier::channel("test");
        (QuoteMultiplexer::new(2, link, notifier), alerts)
    }

    fn es() -> EntityKey {
        EntityKey::new("CME", "ES", "2412")
    }

    fn tick(price: f64) -> QuoteTick {
        QuoteTick {
            entity: es(),
            last_price: price,
            ..QuoteTick::default()
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        let (mux, _alerts) = ready(Arc::new(CountingGateway::default()));
        let err = mux.register_topic(&es(), "Bogus").unwrap_err();
        assert!(matches!(err, VenueError::InvalidField(_)));
        assert!(mux.registry().unwrap().is_empty());
    }

    #[test]
    fn topics_of_one_entity_share_one_subscribe() {
        let gateway = Arc::new(CountingGateway::default());
        let (mux, _alerts) = ready(gateway.clone());
        let last = mux.register_topic(&es(), "LastPrice").unwrap();
        let bid = mux.register_topic(&es(), "BidPrice1").unwrap();
        assert_eq!(gateway.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(
            mux.subscription_state(&es()).unwrap(),
            Some(SubscriptionState::Subscribing)
        );

        mux.on_quote(&tick(4501.25)).unwrap();
        assert_eq!(last.updates.try_recv().unwrap().value, QuoteValue::Number(4501.25));
        assert_eq!(bid.updates.try_recv().unwrap().value, QuoteValue::Number(0.0));
        assert_eq!(
            mux.subscription_state(&es()).unwrap(),
            Some(SubscriptionState::Subscribed)
        );
    }

    #[test]
    fn synchronous_subscribe_failure_rolls_back() {
        let gateway = Arc::new(CountingGateway {
            reject: true,
            ..CountingGateway::default()
        });
        let (mux, alerts) = ready(gateway);
        let err = mux.register_topic(&es(), "LastPrice").unwrap_err();
        assert!(matches!(err, VenueError::SubscriptionRejected { .. }));
        assert!(mux.registry().unwrap().is_empty());
        assert_eq!(
            mux.subscription_state(&es()).unwrap(),
            Some(SubscriptionState::Unsubscribed)
        );
        assert!(alerts.try_recv().unwrap().message.contains("no permission"));
    }

    #[test]
    fn last_topic_unsubscribes_upstream() {
        let gateway = Arc::new(CountingGateway::default());
        let (mux, _alerts) = ready(gateway.clone());
        let _a = mux.register_topic(&es(), "LastPrice").unwrap();
        let _b = mux.register_topic(&es(), "Volume").unwrap();

        assert!(mux.unregister_topic(&es(), "LastPrice").unwrap());
        assert_eq!(gateway.unsubscribes.load(Ordering::SeqCst), 0);
        assert!(mux.unregister_topic(&es(), "Volume").unwrap());
        assert_eq!(gateway.unsubscribes.load(Ordering::SeqCst), 1);
        assert!(mux.registry().unwrap().is_empty());
        assert!(!mux.unregister_topic(&es(), "Volume").unwrap());
    }

    #[test]
    fn dropped_consumers_are_pruned_on_next_tick() {
        let (mux, _alerts) = ready(Arc::new(CountingGateway::default()));
        let kept = mux.register_topic(&es(), "LastPrice").unwrap();
        drop(mux.register_topic(&es(), "LastPrice").unwrap());
        mux.on_quote(&tick(1.0)).unwrap();
        mux.on_quote(&tick(2.0)).unwrap();
        let values: Vec<QuoteValue> = kept.updates.try_iter().map(|u| u.value).collect();
        assert_eq!(values, vec![QuoteValue::Number(1.0), QuoteValue::Number(2.0)]);
        assert_eq!(mux.topic_value(&es(), "LastPrice").unwrap(), Some(QuoteValue::Number(2.0)));
    }

    #[test]
    fn registration_before_ready_waits_for_resubscribe() {
        let link = Arc::new(GatewayLink::new());
        let (notifier, _alerts) = Notifier::channel("test");
        let mux = QuoteMultiplexer::new(1, Arc::clone(&link), notifier);
        let _topic = mux.register_topic(&es(), "LastPrice").unwrap();
        assert_eq!(
            mux.subscription_state(&es()).unwrap(),
            Some(SubscriptionState::Unsubscribed)
        );

        let gateway = Arc::new(CountingGateway::default());
        link.install(gateway.clone()).unwrap();
        assert_eq!(mux.resubscribe_all().unwrap(), 1);
        assert_eq!(mux.resubscribe_all().unwrap(), 0);
        assert_eq!(gateway.subscribes.load(Ordering::SeqCst), 1);
    }
}
