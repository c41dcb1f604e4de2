//! In-memory mailbox backend.
//!
//! # Purpose
//! Serves mailboxes entirely in process memory for local development and
//! tests, and for deployments that can tolerate losing in-flight events on
//! restart.
//!
//! # Concurrency model
//! Every subscription key owns a dedicated worker task. All operations for a
//! key are funneled through the worker's bounded command channel and applied
//! one at a time, which makes the per-key history linearizable without any
//! per-operation locking. Distinct keys never coordinate.
use crate::{Element, Elements, MQueue, MQueueError, Result};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot, RwLock};

const COMMAND_QUEUE_DEPTH: usize = 256;

#[derive(Debug)]
enum Command {
    Next {
        reply: oneshot::Sender<u64>,
    },
    Insert {
        element: Element,
        reply: oneshot::Sender<Result<()>>,
    },
    Retrieve {
        offset: u64,
        count: usize,
        reply: oneshot::Sender<Elements>,
    },
    Discard {
        up_to: u64,
        reply: oneshot::Sender<()>,
    },
}

// Retained window for one subscription. Slot i holds the element with id
// floor + i; a slot stays None while its id is still in flight.
#[derive(Debug, Default)]
struct Window {
    floor: u64,
    next: u64,
    slots: VecDeque<Option<Bytes>>,
}

impl Window {
    fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        self.slots.push_back(None);
        id
    }

    fn insert(&mut self, element: Element) -> Result<()> {
        let id = element.offset;
        if id < self.floor || id >= self.next {
            return Err(MQueueError::InvalidOffset {
                id,
                offset: self.floor,
                next: self.next,
            });
        }
        let slot = &mut self.slots[(id - self.floor) as usize];
        if slot.is_some() {
            return Err(MQueueError::AlreadyPresent(id));
        }
        *slot = Some(element.value);
        Ok(())
    }

    fn retrieve(&self, offset: u64, count: usize) -> Elements {
        let mut elements = Vec::new();
        // Ids below the floor were discarded; they are absent, not errors.
        let mut id = offset.max(self.floor);
        while id < self.next && elements.len() < count {
            match &self.slots[(id - self.floor) as usize] {
                Some(value) => elements.push(Element {
                    offset: id,
                    value: value.clone(),
                }),
                // The first gap ends the run; ids past it are never returned
                // before the gap itself is filled.
                None => break,
            }
            id += 1;
        }
        Elements { offset, elements }
    }

    fn discard(&mut self, up_to: u64) {
        // The floor never passes the allocator.
        let floor = up_to.min(self.next).max(self.floor);
        for _ in self.floor..floor {
            self.slots.pop_front();
        }
        self.floor = floor;
    }
}

async fn run_worker(mut commands: mpsc::Receiver<Command>) {
    let mut window = Window::default();
    // Replies to callers that gave up waiting are dropped on the floor.
    while let Some(command) = commands.recv().await {
        match command {
            Command::Next { reply } => {
                let _ = reply.send(window.allocate());
            }
            Command::Insert { element, reply } => {
                let _ = reply.send(window.insert(element));
            }
            Command::Retrieve {
                offset,
                count,
                reply,
            } => {
                let _ = reply.send(window.retrieve(offset, count));
            }
            Command::Discard { up_to, reply } => {
                window.discard(up_to);
                let _ = reply.send(());
            }
        }
    }
}

fn spawn_worker() -> mpsc::Sender<Command> {
    let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    tokio::spawn(run_worker(receiver));
    sender
}

fn worker_stopped() -> MQueueError {
    MQueueError::BackendUnavailable("mailbox worker stopped before replying".to_string())
}

/// In-memory mailbox backend with one worker task per subscription key.
///
/// Workers are spawned lazily on first use and stop when [`MQueue::remove`]
/// drops the retained sender. State lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemMQueue {
    workers: RwLock<HashMap<String, mpsc::Sender<Command>>>,
}

impl MemMQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn worker(&self, key: &str) -> mpsc::Sender<Command> {
        if let Some(sender) = self.workers.read().await.get(key) {
            return sender.clone();
        }
        let mut guard = self.workers.write().await;
        guard.entry(key.to_string()).or_insert_with(spawn_worker).clone()
    }

    async fn dispatch(&self, key: &str, mut command: Command) -> Result<()> {
        // A worker can disappear between lookup and send when `remove` races
        // this operation; retry once against a fresh worker.
        for _ in 0..2 {
            let sender = self.worker(key).await;
            match sender.send(command).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    command = returned;
                    let mut guard = self.workers.write().await;
                    if let Some(current) = guard.get(key) {
                        if current.same_channel(&sender) {
                            guard.remove(key);
                        }
                    }
                }
            }
        }
        Err(worker_stopped())
    }
}

#[async_trait::async_trait]
impl MQueue for MemMQueue {
    async fn next(&self, key: &str) -> Result<u64> {
        let (reply, response) = oneshot::channel();
        self.dispatch(key, Command::Next { reply }).await?;
        response.await.map_err(|_| worker_stopped())
    }

    async fn insert(&self, key: &str, element: Element) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.dispatch(key, Command::Insert { element, reply }).await?;
        response.await.map_err(|_| worker_stopped())?
    }

    async fn retrieve(&self, key: &str, offset: u64, count: usize) -> Result<Elements> {
        let (reply, response) = oneshot::channel();
        self.dispatch(
            key,
            Command::Retrieve {
                offset,
                count,
                reply,
            },
        )
        .await?;
        response.await.map_err(|_| worker_stopped())
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.dispatch(key, Command::Discard { up_to, reply }).await?;
        response.await.map_err(|_| worker_stopped())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        // Dropping the retained sender stops the worker once in-flight
        // commands have drained.
        self.workers.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn element(id: u64, value: &'static [u8]) -> Element {
        Element {
            offset: id,
            value: Bytes::from_static(value),
        }
    }

    async fn filled(mqueue: &MemMQueue, key: &str, count: u64) {
        for _ in 0..count {
            let id = mqueue.next(key).await.expect("next");
            mqueue
                .insert(key, element(id, b"payload"))
                .await
                .expect("insert");
        }
    }

    #[tokio::test]
    async fn next_is_strictly_increasing_under_concurrency() {
        let mqueue = Arc::new(MemMQueue::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mqueue = Arc::clone(&mqueue);
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..64 {
                    ids.push(mqueue.next("sub").await.expect("next"));
                }
                ids
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            let ids = handle.await.expect("join");
            // Each task must observe its own ids in allocation order.
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            all.extend(ids);
        }
        all.sort_unstable();
        let expected: Vec<u64> = (0..8 * 64).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn retrieve_returns_inserted_elements_in_order() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 3).await;
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        assert_eq!(retrieved.offset, 0);
        let ids: Vec<u64> = retrieved.elements.iter().map(|e| e.offset).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn retrieve_stops_at_first_gap() {
        let mqueue = MemMQueue::new();
        for _ in 0..3 {
            mqueue.next("sub").await.expect("next");
        }
        mqueue.insert("sub", element(0, b"a")).await.expect("insert");
        mqueue.insert("sub", element(2, b"c")).await.expect("insert");
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        let ids: Vec<u64> = retrieved.elements.iter().map(|e| e.offset).collect();
        assert_eq!(ids, vec![0]);
        // Filling the gap exposes the rest of the run.
        mqueue.insert("sub", element(1, b"b")).await.expect("insert");
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        let ids: Vec<u64> = retrieved.elements.iter().map(|e| e.offset).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn retrieve_caps_at_count() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 5).await;
        let retrieved = mqueue.retrieve("sub", 0, 2).await.expect("retrieve");
        assert_eq!(retrieved.elements.len(), 2);
        assert_eq!(retrieved.elements[1].offset, 1);
    }

    #[tokio::test]
    async fn retrieve_ahead_of_tail_is_empty() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 2).await;
        let retrieved = mqueue.retrieve("sub", 10, 5).await.expect("retrieve");
        assert_eq!(retrieved.offset, 10);
        assert!(retrieved.elements.is_empty());
    }

    #[tokio::test]
    async fn discard_raises_floor_and_hides_older_ids() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 5).await;
        mqueue.discard("sub", 3).await.expect("discard");
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        let ids: Vec<u64> = retrieved.elements.iter().map(|e| e.offset).collect();
        assert_eq!(ids, vec![3, 4]);
        // Re-discarding at the same cursor changes nothing.
        mqueue.discard("sub", 3).await.expect("discard");
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        assert_eq!(retrieved.elements.len(), 2);
    }

    #[tokio::test]
    async fn discard_clamps_to_allocator() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 2).await;
        mqueue.discard("sub", 100).await.expect("discard");
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        assert!(retrieved.elements.is_empty());
        // The allocator keeps counting from where it was.
        assert_eq!(mqueue.next("sub").await.expect("next"), 2);
    }

    #[tokio::test]
    async fn insert_below_floor_is_rejected() {
        let mqueue = MemMQueue::new();
        for _ in 0..3 {
            mqueue.next("sub").await.expect("next");
        }
        mqueue.discard("sub", 2).await.expect("discard");
        let err = mqueue
            .insert("sub", element(1, b"late"))
            .await
            .expect_err("insert below floor");
        assert!(matches!(err, MQueueError::InvalidOffset { id: 1, .. }));
    }

    #[tokio::test]
    async fn insert_of_unallocated_id_is_rejected() {
        let mqueue = MemMQueue::new();
        mqueue.next("sub").await.expect("next");
        let err = mqueue
            .insert("sub", element(5, b"future"))
            .await
            .expect_err("insert past allocator");
        assert!(matches!(err, MQueueError::InvalidOffset { id: 5, .. }));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_and_keeps_first_value() {
        let mqueue = MemMQueue::new();
        let id = mqueue.next("sub").await.expect("next");
        mqueue.insert("sub", element(id, b"first")).await.expect("insert");
        let err = mqueue
            .insert("sub", element(id, b"second"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, MQueueError::AlreadyPresent(0)));
        let retrieved = mqueue.retrieve("sub", 0, 1).await.expect("retrieve");
        assert_eq!(retrieved.elements[0].value, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "a", 3).await;
        assert_eq!(mqueue.next("b").await.expect("next"), 0);
        mqueue.discard("a", 3).await.expect("discard");
        mqueue.insert("b", element(0, b"b0")).await.expect("insert");
        let retrieved = mqueue.retrieve("b", 0, 10).await.expect("retrieve");
        assert_eq!(retrieved.elements.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_all_state() {
        let mqueue = MemMQueue::new();
        filled(&mqueue, "sub", 3).await;
        mqueue.remove("sub").await.expect("remove");
        // A fresh worker starts from an empty window.
        let retrieved = mqueue.retrieve("sub", 0, 10).await.expect("retrieve");
        assert!(retrieved.elements.is_empty());
        assert_eq!(mqueue.next("sub").await.expect("next"), 0);
        // Removing a missing key is a no-op.
        mqueue.remove("missing").await.expect("remove");
    }
}
