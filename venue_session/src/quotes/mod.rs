//! Quote distribution: one upstream subscription per entity, many field topics.
pub mod fields;
pub mod multiplexer;

pub use fields::{FieldTable, QuoteValue};
pub use multiplexer::{QuoteMultiplexer, SubscriptionState, TopicSubscription, TopicUpdate};
