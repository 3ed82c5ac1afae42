//! Contracts shared by the Outbox and Inbox engines: the session/atomic
//! abstraction, the subscriber callback contract, partition key strategies,
//! and the message/cursor types that cross the boundary between them.

pub mod partition;
pub mod session;
pub mod subscriber;
pub mod types;

pub use partition::{PartitionKeyStrategy, StreamPartitionStrategy, UriPartitionStrategy};
pub use session::{nested_atomic, Session};
pub use subscriber::{FnSubscriber, Subscriber, SubscriberError};
pub use types::{
    CausalDependency, InboxMessage, InboxRecord, OutboxCursor, OutboxMessage, OutboxRecord,
    StreamId,
};
