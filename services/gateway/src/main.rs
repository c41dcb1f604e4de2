// Portico Gateway (HTTP)
// ----------------------
// This binary fronts a long-running execution backend with an asynchronous
// request/response broker. Clients submit deploy/execute requests, receive a
// monotonic id synchronously, and later poll their per-session mailbox for
// the result event at that id.
//
// Mailbox model:
// - Pluggable backing store selected by `PORTICO_MQUEUE_PROVIDER`:
//   in-process (`mem`, the dev default) or Redis (`redis-single` /
//   `redis-cluster`) for state that survives restarts and can be shared by
//   several gateway processes.
// - A provider selector that does not match the configured endpoints fails
//   startup rather than limping along against the wrong store.
//
// Execution backend:
// - The deploy/execute/lookup interface is consumed behind a trait; this
//   binary wires the in-process dev backend. Production deployments supply a
//   real client implementation.
use gateway::app::{build_router, AppState};
use gateway::auth::InsecureVerifier;
use gateway::config::GatewayConfig;
use gateway::observability;
use portico_backend::{Client, DevClient, RequestManager};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = observability::init_observability();

    let config = GatewayConfig::from_env_or_yaml()?;
    let mailbox = portico_mqueue::new_mailbox(&config.mailbox).await?;
    tracing::info!(provider = %config.mailbox.provider, "mailbox backend ready");

    let client: Arc<dyn Client> = Arc::new(DevClient::new());
    tracing::info!("using the in-process dev execution backend");

    let manager = Arc::new(RequestManager::new(mailbox, Arc::clone(&client)));
    let state = AppState {
        manager,
        client,
        verifier: Arc::new(InsecureVerifier),
    };

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    tracing::info!(addr = %config.bind_addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
