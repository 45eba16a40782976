//! Gateway server binary: wires every component (A-I) together and runs
//! until the process is signalled to stop.

use sms_gateway::config::GatewayConfig;
use sms_gateway::error::GatewayError;
use sms_gateway::gateway::carrier::inbound_router;
use sms_gateway::gateway::dedupe::{Deduper, DEFAULT_GRACE};
use sms_gateway::gateway::mm4_queue::InMemoryMm4Queue;
use sms_gateway::gateway::mm4_send::Mm4SendLoop;
use sms_gateway::gateway::record::RecordWriter;
use sms_gateway::gateway::router::Router;
use sms_gateway::gateway::session::{self, Authenticator, DirectoryAuthenticator};
use sms_gateway::gateway::store::{InMemoryMessageStore, MessageStore};
use sms_gateway::gateway::{Directory, Gateway};
use sms_gateway::model::MsgQueueItem;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const CHANNEL_DEPTH: usize = 512;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = run().await {
        tracing::error!(%err, "gatewayd exited with a fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), GatewayError> {
    let config = GatewayConfig::from_env().map_err(|e| {
        GatewayError::Validation(format!("configuration error: {e}"))
    })?;

    let directory = Arc::new(Directory::default());
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let mm4_queue = Arc::new(InMemoryMm4Queue::new());

    let (record_tx, record_rx) = mpsc::channel(CHANNEL_DEPTH);
    let gateway = Gateway::new(
        config.clone(),
        directory.clone(),
        store.clone(),
        mm4_queue.clone(),
        record_tx.clone(),
    );

    let (route_tx, route_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (dedupe_in_tx, mut dedupe_in_rx) = mpsc::channel::<MsgQueueItem>(CHANNEL_DEPTH);

    let record_writer = Arc::new(RecordWriter::new(store.clone()));
    tokio::spawn(record_writer.run(record_rx));

    let router = Arc::new(Router::new(
        directory.clone(),
        gateway.sessions.clone(),
        gateway.rate_limiter.clone(),
        mm4_queue.clone(),
        gateway.carrier_dispatcher.clone(),
        record_tx.clone(),
        route_tx.clone(),
        config.clone(),
    ));
    tokio::spawn(router.run(route_rx));

    let mm4_loop = Arc::new(Mm4SendLoop::new(
        mm4_queue.clone(),
        &config.mm4_smtp_host,
        config.mm4_smtp_port,
        format!("gateway@{}", config.server_id),
        record_tx.clone(),
    ));
    tokio::spawn(mm4_loop.run());

    // Inbound SMPP submissions are deduplicated before reaching the router;
    // every other inbound path (carrier callbacks) feeds the router channel
    // directly, matching the MM4-inbound shape in the data-flow diagram.
    let deduper = Arc::new(Deduper::new(route_tx.clone(), DEFAULT_GRACE));
    tokio::spawn(async move {
        while let Some(item) = dedupe_in_rx.recv().await {
            deduper.push(item).await;
        }
    });

    // Client seeding (the SQL-backed directory reload) is an external
    // collaborator per the persistence boundary; authentication reads
    // whatever `directory` currently holds rather than a fixed snapshot.
    let authenticator: Arc<dyn Authenticator> =
        Arc::new(DirectoryAuthenticator::new(directory.clone()));

    let inbound_app = inbound_router(config.api_key.clone(), route_tx.clone());
    let carrier_http_listen = config.carrier_http_listen;
    tokio::spawn(async move {
        match TcpListener::bind(carrier_http_listen).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, inbound_app).await {
                    tracing::error!(%err, "carrier inbound http server stopped");
                }
            }
            Err(err) => tracing::error!(%err, "failed to bind carrier inbound http listener"),
        }
    });

    tracing::info!(addr = %config.smpp_listen, "smpp listener starting");
    let listener = TcpListener::bind(config.smpp_listen).await?;

    loop {
        let (socket, peer) = listener.accept().await?;
        let sessions = gateway.sessions.clone();
        let authenticator = authenticator.clone();
        let dedupe_in_tx = dedupe_in_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = session::run_session(socket, sessions, authenticator, dedupe_in_tx).await {
                tracing::warn!(peer = %peer, %err, "session ended with error");
            }
        });
    }
}
