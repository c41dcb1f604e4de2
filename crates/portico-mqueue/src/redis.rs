//! Redis-backed mailboxes, single instance and cluster.
//!
//! # Purpose
//! Serves the mailbox contract against a Redis deployment so mailbox state
//! survives gateway restarts and can be shared by several gateway processes.
//!
//! # Key scheme
//! One subscription maps to three groups of keys, all carrying the
//! subscription inside a `{...}` hash tag so Redis Cluster routes every
//! operation for the subscription to the same slot:
//! - `{sub}:seq` — allocation counter, advanced with `INCR`
//! - `{sub}:floor` — oldest retained id, raised by discard
//! - `{sub}:el:<id>` — one element payload, written once with `SET NX`
//!
//! Transient store errors are retried with capped exponential backoff;
//! anything that survives the retry budget surfaces as `BackendUnavailable`.
use crate::retry::{retry, Attempt, RetryConfig};
use crate::{Element, Elements, MQueue, MQueueError, Result};
use bytes::Bytes;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{AsyncCommands, RedisError};
use std::fmt;

// Upper bound on keys deleted per DEL round trip during discard/remove.
const DELETE_BATCH: usize = 512;

fn seq_key(key: &str) -> String {
    format!("{{{key}}}:seq")
}

fn floor_key(key: &str) -> String {
    format!("{{{key}}}:floor")
}

fn element_key(key: &str, id: u64) -> String {
    format!("{{{key}}}:el:{id}")
}

// Accept both bare `host:port` endpoints and full redis:// URLs.
fn redis_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

fn connect_error(err: RedisError) -> MQueueError {
    MQueueError::BackendUnavailable(err.to_string())
}

enum OpError {
    Store(RedisError),
    Mailbox(MQueueError),
}

impl From<RedisError> for OpError {
    fn from(err: RedisError) -> Self {
        OpError::Store(err)
    }
}

fn is_transient(err: &RedisError) -> bool {
    err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || matches!(
            err.kind(),
            redis::ErrorKind::TryAgain
                | redis::ErrorKind::ClusterDown
                | redis::ErrorKind::MasterDown
        )
}

fn classify(err: OpError) -> Attempt<MQueueError> {
    match err {
        OpError::Mailbox(err) => Attempt::Abort(err),
        OpError::Store(err) if is_transient(&err) => {
            tracing::warn!(error = %err, "transient mailbox store error, retrying");
            Attempt::Retry(MQueueError::BackendUnavailable(err.to_string()))
        }
        OpError::Store(err) => Attempt::Abort(MQueueError::BackendUnavailable(err.to_string())),
    }
}

async fn window_op<C>(conn: &mut C, key: &str) -> std::result::Result<(u64, u64), OpError>
where
    C: ConnectionLike + Send,
{
    let floor: Option<u64> = conn.get(floor_key(key)).await?;
    let next: Option<u64> = conn.get(seq_key(key)).await?;
    Ok((floor.unwrap_or(0), next.unwrap_or(0)))
}

async fn next_op<C>(conn: &mut C, key: &str) -> std::result::Result<u64, OpError>
where
    C: ConnectionLike + Send,
{
    // A retried INCR whose first round trip was applied but not acknowledged
    // burns an id; the poll protocol tolerates the resulting gap.
    let allocated: u64 = conn.incr(seq_key(key), 1u64).await?;
    Ok(allocated - 1)
}

async fn insert_op<C>(
    conn: &mut C,
    key: &str,
    element: &Element,
) -> std::result::Result<(), OpError>
where
    C: ConnectionLike + Send,
{
    let (floor, next) = window_op(conn, key).await?;
    let id = element.offset;
    if id < floor || id >= next {
        return Err(OpError::Mailbox(MQueueError::InvalidOffset {
            id,
            offset: floor,
            next,
        }));
    }
    let stored: bool = conn
        .set_nx(element_key(key, id), element.value.as_ref())
        .await?;
    if !stored {
        return Err(OpError::Mailbox(MQueueError::AlreadyPresent(id)));
    }
    Ok(())
}

async fn retrieve_op<C>(
    conn: &mut C,
    key: &str,
    offset: u64,
    count: usize,
) -> std::result::Result<Elements, OpError>
where
    C: ConnectionLike + Send,
{
    let mut elements = Vec::new();
    if count == 0 {
        return Ok(Elements { offset, elements });
    }
    let (floor, next) = window_op(conn, key).await?;
    let start = offset.max(floor);
    if start >= next {
        return Ok(Elements { offset, elements });
    }
    let end = next.min(start.saturating_add(count as u64));
    let keys: Vec<String> = (start..end).map(|id| element_key(key, id)).collect();
    let values: Vec<Option<Vec<u8>>> = conn.mget(keys).await?;
    for (index, value) in values.into_iter().enumerate() {
        match value {
            Some(value) => elements.push(Element {
                offset: start + index as u64,
                value: Bytes::from(value),
            }),
            // A missing key is an id still in flight; stop at the gap.
            None => break,
        }
    }
    Ok(Elements { offset, elements })
}

async fn delete_batched<C>(conn: &mut C, keys: Vec<String>) -> std::result::Result<(), OpError>
where
    C: ConnectionLike + Send,
{
    for chunk in keys.chunks(DELETE_BATCH) {
        let _: () = conn.del(chunk.to_vec()).await?;
    }
    Ok(())
}

async fn discard_op<C>(conn: &mut C, key: &str, up_to: u64) -> std::result::Result<(), OpError>
where
    C: ConnectionLike + Send,
{
    let (floor, next) = window_op(conn, key).await?;
    // The floor never passes the allocator.
    let target = up_to.min(next).max(floor);
    if target == floor {
        return Ok(());
    }
    let keys: Vec<String> = (floor..target).map(|id| element_key(key, id)).collect();
    delete_batched(conn, keys).await?;
    let _: () = conn.set(floor_key(key), target).await?;
    Ok(())
}

async fn remove_op<C>(conn: &mut C, key: &str) -> std::result::Result<(), OpError>
where
    C: ConnectionLike + Send,
{
    let (floor, next) = window_op(conn, key).await?;
    let mut keys: Vec<String> = (floor..next).map(|id| element_key(key, id)).collect();
    keys.push(seq_key(key));
    keys.push(floor_key(key));
    delete_batched(conn, keys).await
}

// Shared mailbox logic over any clonable async Redis connection.
#[derive(Clone)]
struct RedisStore<C> {
    conn: C,
    retry: RetryConfig,
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    async fn next(&self, key: &str) -> Result<u64> {
        retry(&self.retry, || {
            let mut conn = self.conn.clone();
            async move { next_op(&mut conn, key).await.map_err(classify) }
        })
        .await
    }

    async fn insert(&self, key: &str, element: &Element) -> Result<()> {
        retry(&self.retry, || {
            let mut conn = self.conn.clone();
            async move { insert_op(&mut conn, key, element).await.map_err(classify) }
        })
        .await
    }

    async fn retrieve(&self, key: &str, offset: u64, count: usize) -> Result<Elements> {
        retry(&self.retry, || {
            let mut conn = self.conn.clone();
            async move {
                retrieve_op(&mut conn, key, offset, count)
                    .await
                    .map_err(classify)
            }
        })
        .await
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        retry(&self.retry, || {
            let mut conn = self.conn.clone();
            async move { discard_op(&mut conn, key, up_to).await.map_err(classify) }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        retry(&self.retry, || {
            let mut conn = self.conn.clone();
            async move { remove_op(&mut conn, key).await.map_err(classify) }
        })
        .await
    }
}

/// Mailbox backed by a single Redis instance.
pub struct RedisSingleMQueue {
    store: RedisStore<ConnectionManager>,
}

impl fmt::Debug for RedisSingleMQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedisSingleMQueue")
    }
}

impl RedisSingleMQueue {
    /// Connect to one Redis instance, e.g. `127.0.0.1:6379` or a full
    /// `redis://` URL.
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url(addr)).map_err(connect_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(connect_error)?;
        Ok(Self {
            store: RedisStore {
                conn,
                retry: RetryConfig::default(),
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.store.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl MQueue for RedisSingleMQueue {
    async fn next(&self, key: &str) -> Result<u64> {
        self.store.next(key).await
    }

    async fn insert(&self, key: &str, element: Element) -> Result<()> {
        self.store.insert(key, &element).await
    }

    async fn retrieve(&self, key: &str, offset: u64, count: usize) -> Result<Elements> {
        self.store.retrieve(key, offset, count).await
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        self.store.discard(key, up_to).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }
}

/// Mailbox backed by a Redis Cluster deployment.
///
/// The `{...}` hash tags in the key scheme pin every key of one subscription
/// to a single slot, so the per-key ordering guarantees carry over.
pub struct RedisClusterMQueue {
    store: RedisStore<ClusterConnection>,
}

impl fmt::Debug for RedisClusterMQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedisClusterMQueue")
    }
}

impl RedisClusterMQueue {
    pub async fn connect(addrs: &[String]) -> Result<Self> {
        let nodes: Vec<String> = addrs.iter().map(|addr| redis_url(addr)).collect();
        let client = ClusterClient::new(nodes).map_err(connect_error)?;
        let conn = client.get_async_connection().await.map_err(connect_error)?;
        Ok(Self {
            store: RedisStore {
                conn,
                retry: RetryConfig::default(),
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.store.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl MQueue for RedisClusterMQueue {
    async fn next(&self, key: &str) -> Result<u64> {
        self.store.next(key).await
    }

    async fn insert(&self, key: &str, element: Element) -> Result<()> {
        self.store.insert(key, &element).await
    }

    async fn retrieve(&self, key: &str, offset: u64, count: usize) -> Result<Elements> {
        self.store.retrieve(key, offset, count).await
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        self.store.discard(key, up_to).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_one_hash_tag_per_subscription() {
        assert_eq!(seq_key("alice.service"), "{alice.service}:seq");
        assert_eq!(floor_key("alice.service"), "{alice.service}:floor");
        assert_eq!(element_key("alice.service", 7), "{alice.service}:el:7");
    }

    #[test]
    fn redis_url_adds_missing_scheme() {
        assert_eq!(redis_url("127.0.0.1:6379"), "redis://127.0.0.1:6379");
        assert_eq!(
            redis_url("redis://127.0.0.1:6379"),
            "redis://127.0.0.1:6379"
        );
        assert_eq!(
            redis_url("rediss://cache.internal:6380"),
            "rediss://cache.internal:6380"
        );
    }

    #[test]
    fn io_errors_are_transient() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_transient(&err));
        let err = RedisError::from((redis::ErrorKind::TryAgain, "busy"));
        assert!(is_transient(&err));
    }

    #[test]
    fn protocol_errors_are_not_transient() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(!is_transient(&err));
    }

    #[test]
    fn mailbox_errors_abort_instead_of_retrying() {
        let attempt = classify(OpError::Mailbox(MQueueError::AlreadyPresent(3)));
        assert!(matches!(
            attempt,
            Attempt::Abort(MQueueError::AlreadyPresent(3))
        ));
    }
}
