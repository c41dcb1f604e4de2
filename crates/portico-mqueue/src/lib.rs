// Ordered per-subscription mailboxes with pluggable backing stores.
// A mailbox is an append-ordered log of opaque payloads keyed by a
// monotonically allocated sequence number, with discard-before-offset
// semantics. Allocation and population are separate steps so a caller can
// hand out the sequence number before the payload exists.
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

pub mod config;
pub mod mem;
pub mod redis;
pub mod retry;

pub use config::{new_mailbox, MailboxConfig, MailboxInitError, MailboxProvider};
pub use mem::MemMQueue;
pub use redis::{RedisClusterMQueue, RedisSingleMQueue};

pub type Result<T> = std::result::Result<T, MQueueError>;

#[derive(thiserror::Error, Debug)]
pub enum MQueueError {
    #[error("id {id} outside mailbox window [{offset}, {next})")]
    InvalidOffset { id: u64, offset: u64, next: u64 },
    #[error("element {0} is already present")]
    AlreadyPresent(u64),
    #[error("mailbox backing store unavailable: {0}")]
    BackendUnavailable(String),
}

/// A single mailbox entry: an opaque payload at a fixed sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub offset: u64,
    pub value: Bytes,
}

/// An ordered, gap-free run of elements answered from `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Elements {
    /// Echo of the offset the retrieve was issued at.
    pub offset: u64,
    pub elements: Vec<Element>,
}

/// Per-subscription ordered event mailbox.
///
/// All operations for one key are linearizable; operations on distinct keys
/// are independent. Mailboxes are created lazily on first use.
#[async_trait]
pub trait MQueue: Debug + Send + Sync {
    /// Allocate the next sequence number for `key`. Strictly increasing per
    /// key with no duplicates under concurrent callers.
    async fn next(&self, key: &str) -> Result<u64>;

    /// Place an element under its previously allocated sequence number.
    /// Fails with `InvalidOffset` outside the retained window and with
    /// `AlreadyPresent` when the slot is already populated.
    async fn insert(&self, key: &str, element: Element) -> Result<()>;

    /// Return up to `count` elements with ids >= `offset` in strictly
    /// increasing id order, stopping at the first id that has not been
    /// inserted yet. Ids below the mailbox floor are silently absent.
    async fn retrieve(&self, key: &str, offset: u64, count: usize) -> Result<Elements>;

    /// Raise the mailbox floor to `up_to` (clamped to the allocator) and
    /// delete elements below it. Idempotent.
    async fn discard(&self, key: &str, up_to: u64) -> Result<()>;

    /// Drop all state held for `key`. Idempotent.
    async fn remove(&self, key: &str) -> Result<()>;
}
