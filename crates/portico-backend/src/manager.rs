//! Asynchronous request lifecycle management.
//!
//! # Purpose
//! Couples an inbound async request to the future event a client will poll
//! for: allocates the sequence number, runs the backend call on a detached
//! task, and publishes exactly one event per allocated id into the session
//! mailbox.
//!
//! # Cancellation
//! The HTTP request scope ends the moment the id is returned to the caller.
//! Backend work therefore runs on its own task root (`tokio::spawn`), never
//! as a child of the request, so finishing the response cannot cancel the
//! call whose event the client is about to poll for.
use crate::{
    BackendEvent, Client, DeployServiceRequest, Error, Events, ExecuteServiceRequest,
    PollServiceRequest, Result, RpcError,
};
use bytes::Bytes;
use portico_mqueue::{Element, MQueue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Topic under which all service events for one session are ordered.
const TOPIC: &str = "service";

/// Reserved subscription probed by health checks.
const HEALTH_KEY: &str = "gateway.health";

/// Server-side ceiling on events returned by a single poll.
pub const MAX_POLL_COUNT: usize = 128;

fn subscription_key(session_key: &str) -> String {
    format!("{session_key}.{TOPIC}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Deploy,
    Execute,
}

impl RequestKind {
    fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Deploy => "deploy",
            RequestKind::Execute => "execute",
        }
    }
}

/// Broker between the HTTP surface and the execution backend.
///
/// Shared across all request handlers; every method is safe to call from
/// concurrent tasks.
pub struct RequestManager {
    mqueue: Arc<dyn MQueue>,
    client: Arc<dyn Client>,
    // Termination bookkeeping only: events carry their kind inline, so
    // nothing ever consults this map to decode. Entries are dropped when the
    // event for their id is first delivered.
    outstanding: Arc<Mutex<HashMap<(String, u64), RequestKind>>>,
}

impl RequestManager {
    pub fn new(mqueue: Arc<dyn MQueue>, client: Arc<dyn Client>) -> Self {
        Self {
            mqueue,
            client,
            outstanding: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a deploy and return the id its event will be published under.
    /// Returns without waiting for backend work.
    pub async fn deploy_service_async(
        &self,
        session_key: &str,
        request: DeployServiceRequest,
    ) -> Result<u64> {
        let key = subscription_key(session_key);
        let id = self.mqueue.next(&key).await?;
        self.track(key.clone(), id, RequestKind::Deploy);
        let client = Arc::clone(&self.client);
        let mqueue = Arc::clone(&self.mqueue);
        tokio::spawn(async move {
            let event = match client.deploy_service(request).await {
                Ok(response) => BackendEvent::DeployServiceResponse {
                    id,
                    address: response.address,
                },
                Err(err) => BackendEvent::ErrorEvent {
                    id,
                    cause: RpcError::from(&err),
                },
            };
            publish_event(mqueue, key, event).await;
        });
        Ok(id)
    }

    /// Start an execution and return the id its event will be published
    /// under. Returns without waiting for backend work.
    pub async fn execute_service_async(
        &self,
        session_key: &str,
        request: ExecuteServiceRequest,
    ) -> Result<u64> {
        let key = subscription_key(session_key);
        let id = self.mqueue.next(&key).await?;
        self.track(key.clone(), id, RequestKind::Execute);
        let client = Arc::clone(&self.client);
        let mqueue = Arc::clone(&self.mqueue);
        tokio::spawn(async move {
            let event = match client.execute_service(request).await {
                Ok(response) => BackendEvent::ExecuteServiceResponse {
                    id,
                    address: response.address,
                    output: response.output,
                },
                Err(err) => BackendEvent::ErrorEvent {
                    id,
                    cause: RpcError::from(&err),
                },
            };
            publish_event(mqueue, key, event).await;
        });
        Ok(id)
    }

    /// Retrieve the ordered run of events at the client's cursor.
    pub async fn poll_service(
        &self,
        session_key: &str,
        request: PollServiceRequest,
    ) -> Result<Events> {
        let key = subscription_key(session_key);
        let count = request.count.min(MAX_POLL_COUNT);
        if request.discard_previous {
            self.mqueue.discard(&key, request.offset).await?;
        }
        let retrieved = self.mqueue.retrieve(&key, request.offset, count).await?;
        let mut events = Vec::with_capacity(retrieved.elements.len());
        for element in retrieved.elements {
            let event: BackendEvent = serde_json::from_slice(&element.value).map_err(|err| {
                Error::Internal(format!("malformed event at id {}: {err}", element.offset))
            })?;
            self.untrack(&key, event.id());
            events.push(event);
        }
        metrics::counter!("gateway_events_delivered_total").increment(events.len() as u64);
        Ok(Events {
            offset: retrieved.offset,
            events,
        })
    }

    /// Drop the session's mailbox and any outstanding bookkeeping for it.
    pub async fn remove_subscription(&self, session_key: &str) -> Result<()> {
        let key = subscription_key(session_key);
        self.mqueue.remove(&key).await?;
        let mut outstanding = self.outstanding.lock().expect("outstanding lock");
        outstanding.retain(|(subscription, _), _| subscription != &key);
        metrics::gauge!("gateway_outstanding_requests").set(outstanding.len() as f64);
        Ok(())
    }

    /// Probe mailbox reachability without touching any client subscription.
    pub async fn health_check(&self) -> Result<()> {
        // Count 1 so the probe reaches the backing store instead of
        // short-circuiting on an empty range.
        self.mqueue.retrieve(HEALTH_KEY, 0, 1).await?;
        Ok(())
    }

    /// Number of submitted requests whose events have not been delivered.
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.lock().expect("outstanding lock").len()
    }

    fn track(&self, key: String, id: u64, kind: RequestKind) {
        metrics::counter!("gateway_async_requests_total", "kind" => kind.as_str()).increment(1);
        let mut outstanding = self.outstanding.lock().expect("outstanding lock");
        outstanding.insert((key, id), kind);
        metrics::gauge!("gateway_outstanding_requests").set(outstanding.len() as f64);
    }

    fn untrack(&self, key: &str, id: u64) {
        let mut outstanding = self.outstanding.lock().expect("outstanding lock");
        if outstanding.remove(&(key.to_string(), id)).is_some() {
            metrics::gauge!("gateway_outstanding_requests").set(outstanding.len() as f64);
        }
    }
}

async fn publish_event(mqueue: Arc<dyn MQueue>, key: String, event: BackendEvent) {
    let id = event.id();
    let value = match serde_json::to_vec(&event) {
        Ok(value) => Bytes::from(value),
        Err(err) => {
            tracing::error!(error = %err, id, "failed to serialize backend event");
            return;
        }
    };
    if let Err(err) = mqueue.insert(&key, Element { offset: id, value }).await {
        // The allocated id stays as a gap; polls return the prefix before it.
        tracing::error!(error = %err, id, "failed to insert event into mailbox");
        metrics::counter!("gateway_event_insert_failures_total").increment(1);
    }
}
