//! SMPP Session Manager (component E): one server-side session per TCP
//! connection, bind authentication, PDU dispatch, and sequence-tracked
//! `DeliverSM` acknowledgement.

use crate::connection::Connection;
use crate::datatypes::{
    BindReceiver, BindReceiverResponse, BindTransceiver, BindTransceiverResponse,
    BindTransmitter, BindTransmitterResponse, CommandStatus, DataCoding, DeliverSm,
    DeliverSmResponse, EnquireLink, EnquireLinkResponse, GenericNack, MessageId, SubmitSm,
    SubmitSmResponse, Unbind, UnbindResponse,
};
use crate::codec::Frame;
use crate::error::{GatewayError, GatewayResult};
use crate::model::{Encoding, MsgQueueItem, MsgType, SourceHandle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, RwLock};

pub const ENQUIRE_LINK_INTERVAL: Duration = Duration::from_secs(15);
pub const ENQUIRE_LINK_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const ACK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, system_id: &str, password: &str) -> bool;
}

/// In-memory credential check. Credentials are held decrypted in memory per
/// the data model; at-rest encryption is the external collaborator named
/// in §6, not this type's concern.
pub struct StaticAuthenticator {
    credentials: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, system_id: &str, password: &str) -> bool {
        self.credentials
            .get(system_id)
            .map(|expected| expected == password)
            .unwrap_or(false)
    }
}

/// Checks binds against the live client directory instead of a fixed
/// snapshot, so a reloaded client list takes effect without restarting
/// `gatewayd`.
pub struct DirectoryAuthenticator {
    directory: Arc<crate::gateway::Directory>,
}

impl DirectoryAuthenticator {
    pub fn new(directory: Arc<crate::gateway::Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(&self, system_id: &str, password: &str) -> bool {
        self.directory
            .clients_by_id
            .read()
            .await
            .values()
            .any(|client| client.username == system_id && client.password == password)
    }
}

enum SessionCommand {
    DeliverSegment {
        source_addr: String,
        dest_addr: String,
        text: String,
        data_coding: DataCoding,
        respond_to: oneshot::Sender<GatewayResult<()>>,
    },
}

/// A cheaply-cloneable reference to a running session, used by the router
/// to submit outbound deliveries without touching the session's internals.
#[derive(Clone)]
pub struct SessionHandle {
    pub username: String,
    pub peer_addr: SocketAddr,
    cmd_tx: mpsc::Sender<SessionCommand>,
    closed: Arc<Notify>,
}

impl SessionHandle {
    /// Close this session's connection task. Used when a newer bind for the
    /// same username replaces this one.
    pub fn close(&self) {
        self.closed.notify_waiters();
    }

    async fn send_segment(
        &self,
        source_addr: &str,
        dest_addr: &str,
        text: &str,
        data_coding: DataCoding,
    ) -> GatewayResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::DeliverSegment {
                source_addr: source_addr.to_string(),
                dest_addr: dest_addr.to_string(),
                text: text.to_string(),
                data_coding,
                respond_to: tx,
            })
            .await
            .map_err(|_| GatewayError::TransientTransport("session task gone".into()))?;
        rx.await
            .map_err(|_| GatewayError::TransientTransport("session task dropped response".into()))?
    }
}

/// Send a normalized message to `handle`, segment by segment, per §4.E:
/// each segment waits for its own ack before the next is sent.
pub async fn deliver_sms(
    handle: &SessionHandle,
    from: &str,
    to: &str,
    text: &str,
    encoding: Encoding,
    char_limit: usize,
    char_limit_utf16: usize,
) -> GatewayResult<u32> {
    let limit = match encoding {
        Encoding::Gsm7 | Encoding::Ascii => char_limit,
        Encoding::Ucs2 => char_limit_utf16,
    };
    let normalized = crate::gateway::normalize::normalize(text, limit, limit);
    let data_coding = match encoding {
        Encoding::Gsm7 => DataCoding::SmscDefault,
        Encoding::Ascii => DataCoding::Ascii,
        Encoding::Ucs2 => DataCoding::Ucs2,
    };

    for segment in &normalized.segments {
        handle
            .send_segment(from, to, segment, data_coding)
            .await?;
    }
    Ok(normalized.segments.len() as u32)
}

/// `(username → session)` map, per §4.E. Atomic bind/unbind/lookup/replace.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(username).cloned()
    }

    /// Register `handle`, closing and replacing any existing session for
    /// the same username. The old session's context is cancelled before
    /// the new one becomes visible to lookups.
    pub async fn close_old_and_insert(&self, username: String, handle: SessionHandle) {
        let old = self.sessions.write().await.insert(username, handle);
        if let Some(old) = old {
            old.close();
        }
    }

    pub async fn unbind(&self, username: &str) {
        self.sessions.write().await.remove(username);
    }
}

struct PendingAcks {
    waiters: HashMap<u32, oneshot::Sender<CommandStatus>>,
}

impl PendingAcks {
    fn new() -> Self {
        Self {
            waiters: HashMap::new(),
        }
    }

    fn register(&mut self, sequence_number: u32) -> oneshot::Receiver<CommandStatus> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(sequence_number, tx);
        rx
    }

    fn resolve(&mut self, sequence_number: u32, status: CommandStatus) {
        if let Some(tx) = self.waiters.remove(&sequence_number) {
            let _ = tx.send(status);
        }
    }

    fn deregister(&mut self, sequence_number: u32) {
        self.waiters.remove(&sequence_number);
    }
}

/// Runs one server-side SMPP session to completion: the open/bound state
/// machine, inbound PDU dispatch, outbound delivery commands, and the
/// periodic keepalive.
pub async fn run_session(
    socket: tokio::net::TcpStream,
    registry: Arc<SessionRegistry>,
    authenticator: Arc<dyn Authenticator>,
    router_tx: mpsc::Sender<MsgQueueItem>,
) -> GatewayResult<()> {
    let mut connection = Connection::new(socket);
    let peer_addr = connection.peer_addr().unwrap_or_else(|_| {
        "0.0.0.0:0"
            .parse()
            .expect("fallback address always parses")
    });

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(32);
    let closed = Arc::new(Notify::new());
    let next_sequence = AtomicU32::new(1);
    let mut pending = PendingAcks::new();
    let mut username: Option<String> = None;

    let mut enquire_link_timer = tokio::time::interval(ENQUIRE_LINK_INTERVAL);
    enquire_link_timer.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = closed.notified() => {
                tracing::info!(subsystem = "session", peer = %peer_addr, "session closed by registry replacement");
                break;
            }
            frame = connection.read_frame() => {
                let frame = match frame {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        tracing::info!(subsystem = "session", peer = %peer_addr, "peer closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(subsystem = "session", peer = %peer_addr, error = %e, "connection error");
                        break;
                    }
                };

                match frame {
                    Frame::BindTransceiver(bind) => {
                        username = handle_bind(
                            &mut connection,
                            &registry,
                            authenticator.as_ref(),
                            bind.system_id.as_str().unwrap_or("").to_string(),
                            bind.password.as_ref().and_then(|p| p.as_str().ok()).unwrap_or("").to_string(),
                            bind.sequence_number,
                            &cmd_tx,
                            &closed,
                            peer_addr,
                            BindKind::Transceiver,
                        ).await?;
                    }
                    Frame::BindReceiver(bind) => {
                        username = handle_bind(
                            &mut connection,
                            &registry,
                            authenticator.as_ref(),
                            bind.system_id.as_str().unwrap_or("").to_string(),
                            bind.password.as_ref().and_then(|p| p.as_str().ok()).unwrap_or("").to_string(),
                            bind.sequence_number,
                            &cmd_tx,
                            &closed,
                            peer_addr,
                            BindKind::Receiver,
                        ).await?;
                    }
                    Frame::BindTransmitter(bind) => {
                        username = handle_bind(
                            &mut connection,
                            &registry,
                            authenticator.as_ref(),
                            bind.system_id.as_str().unwrap_or("").to_string(),
                            bind.password.as_ref().and_then(|p| p.as_str().ok()).unwrap_or("").to_string(),
                            bind.sequence_number,
                            &cmd_tx,
                            &closed,
                            peer_addr,
                            BindKind::Transmitter,
                        ).await?;
                    }
                    Frame::SubmitSm(submit) => {
                        handle_submit_sm(&mut connection, &router_tx, username.as_deref(), *submit)
                            .await?;
                    }
                    Frame::DeliverSmResponse(resp) => {
                        pending.resolve(resp.sequence_number, resp.command_status);
                    }
                    Frame::DeliverSm(deliver) => {
                        let resp = DeliverSmResponse {
                            command_status: CommandStatus::Ok,
                            sequence_number: deliver.sequence_number,
                            message_id: MessageId::default(),
                        };
                        connection.write_frame(&Frame::DeliverSmResponse(resp)).await?;
                    }
                    Frame::EnquireLink(pdu) => {
                        let resp = EnquireLinkResponse { sequence_number: pdu.sequence_number };
                        connection.write_frame(&Frame::EnquireLinkResp(resp)).await?;
                    }
                    Frame::EnquireLinkResp(pdu) => {
                        pending.resolve(pdu.sequence_number, CommandStatus::Ok);
                    }
                    Frame::Unbind(pdu) => {
                        let resp = UnbindResponse {
                            command_status: CommandStatus::Ok,
                            sequence_number: pdu.sequence_number,
                        };
                        connection.write_frame(&Frame::UnbindResp(resp)).await?;
                        break;
                    }
                    Frame::GenericNack(pdu) => {
                        tracing::debug!(subsystem = "session", peer = %peer_addr, status = ?pdu.command_status, "received generic_nack");
                    }
                    Frame::UnbindResp(_) | Frame::BindReceiverResponse(_)
                        | Frame::BindTransceiverResponse(_) | Frame::BindTransmitterResponse(_)
                        | Frame::SubmitSmResp(_) | Frame::Outbind(_) | Frame::Unknown { .. } => {
                        tracing::warn!(subsystem = "session", peer = %peer_addr, "unexpected pdu for server role");
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { continue };
                match cmd {
                    SessionCommand::DeliverSegment { source_addr, dest_addr, text, data_coding, respond_to } => {
                        let result = send_deliver_sm(
                            &mut connection,
                            &next_sequence,
                            &mut pending,
                            &source_addr,
                            &dest_addr,
                            &text,
                            data_coding,
                        ).await;
                        let _ = respond_to.send(result);
                    }
                }
            }
            _ = enquire_link_timer.tick() => {
                if username.is_some() {
                    let seq = next_sequence.fetch_add(1, Ordering::Relaxed);
                    let rx = pending.register(seq);
                    if connection.write_frame(&Frame::EnquireLink(EnquireLink { sequence_number: seq })).await.is_err() {
                        break;
                    }
                    match tokio::time::timeout(ENQUIRE_LINK_RESPONSE_TIMEOUT, rx).await {
                        Ok(Ok(_)) => {}
                        _ => {
                            pending.deregister(seq);
                            tracing::warn!(subsystem = "session", peer = %peer_addr, "enquire_link timed out, closing session");
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(username) = username {
        registry.unbind(&username).await;
    }
    Ok(())
}

enum BindKind {
    Transceiver,
    Receiver,
    Transmitter,
}

#[allow(clippy::too_many_arguments)]
async fn handle_bind(
    connection: &mut Connection,
    registry: &Arc<SessionRegistry>,
    authenticator: &dyn Authenticator,
    system_id: String,
    password: String,
    sequence_number: u32,
    cmd_tx: &mpsc::Sender<SessionCommand>,
    closed: &Arc<Notify>,
    peer_addr: SocketAddr,
    kind: BindKind,
) -> GatewayResult<Option<String>> {
    let ok = authenticator.authenticate(&system_id, &password).await;
    let status = if ok {
        CommandStatus::Ok
    } else {
        CommandStatus::BindFailed
    };

    let response_frame = match kind {
        BindKind::Transceiver => Frame::BindTransceiverResponse(BindTransceiverResponse {
            command_status: status,
            sequence_number,
            system_id: crate::datatypes::SystemId::from(system_id.as_str()),
            sc_interface_version: None,
        }),
        BindKind::Receiver => Frame::BindReceiverResponse(BindReceiverResponse {
            command_status: status,
            sequence_number,
            system_id: crate::datatypes::SystemId::from(system_id.as_str()),
            sc_interface_version: None,
        }),
        BindKind::Transmitter => Frame::BindTransmitterResponse(BindTransmitterResponse {
            command_status: status,
            sequence_number,
            system_id: crate::datatypes::SystemId::from(system_id.as_str()),
            sc_interface_version: None,
        }),
    };
    connection.write_frame(&response_frame).await?;

    if !ok {
        tracing::warn!(subsystem = "session", peer = %peer_addr, system_id, "bind authentication failed");
        return Ok(None);
    }

    let handle = SessionHandle {
        username: system_id.clone(),
        peer_addr,
        cmd_tx: cmd_tx.clone(),
        closed: closed.clone(),
    };
    registry.close_old_and_insert(system_id.clone(), handle).await;
    tracing::info!(subsystem = "session", peer = %peer_addr, system_id, "session bound");
    Ok(Some(system_id))
}

async fn handle_submit_sm(
    connection: &mut Connection,
    router_tx: &mpsc::Sender<MsgQueueItem>,
    username: Option<&str>,
    submit: SubmitSm,
) -> GatewayResult<()> {
    // submit_sm is only a valid transition from the bound state; an unbound
    // peer gets rejected rather than processed.
    let Some(username) = username else {
        let resp = SubmitSmResponse {
            command_status: CommandStatus::IncorrectBindStatus,
            sequence_number: submit.sequence_number,
            message_id: MessageId::default(),
        };
        connection.write_frame(&Frame::SubmitSmResp(resp)).await?;
        return Ok(());
    };

    let message_id = MessageId::default();
    let resp = SubmitSmResponse {
        command_status: CommandStatus::Ok,
        sequence_number: submit.sequence_number,
        message_id,
    };
    connection.write_frame(&Frame::SubmitSmResp(resp)).await?;

    let from = submit.source_addr.as_str().unwrap_or("").to_string();
    let to = submit.destination_addr.as_str().unwrap_or("").to_string();
    let text = decode_short_message(submit.data_coding, submit.short_message.as_bytes());

    let item = MsgQueueItem {
        to,
        from: from.clone(),
        msg_type: MsgType::Sms,
        message: Some(text),
        files: Vec::new(),
        received_timestamp: chrono::Utc::now(),
        log_id: generate_log_id(),
        retry_count: 0,
        encoding: None,
        source_handle: Some(SourceHandle {
            username: username.to_string(),
            sequence_number: submit.sequence_number,
        }),
    };

    if router_tx.send(item).await.is_err() {
        tracing::warn!(subsystem = "session", "router channel closed, dropping submit_sm");
    }
    Ok(())
}

fn decode_short_message(data_coding: DataCoding, bytes: &[u8]) -> String {
    if data_coding.is_16bit() {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn generate_log_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

async fn send_deliver_sm(
    connection: &mut Connection,
    next_sequence: &AtomicU32,
    pending: &mut PendingAcks,
    source_addr: &str,
    dest_addr: &str,
    text: &str,
    data_coding: DataCoding,
) -> GatewayResult<()> {
    let seq = next_sequence.fetch_add(1, Ordering::Relaxed);
    let short_message = if data_coding.is_16bit() {
        let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        crate::datatypes::ShortMessage::new(&bytes)
            .map_err(|e| GatewayError::Validation(e.to_string()))?
    } else {
        crate::datatypes::ShortMessage::from(text)
    };

    let mut pdu = DeliverSm::builder()
        .sequence_number(seq)
        .source_addr(source_addr)
        .destination_addr(dest_addr)
        .data_coding(data_coding)
        .build()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    // UCS-2 payloads need raw UTF-16BE bytes, not the builder's UTF-8
    // `&str` setter, so the short message is swapped in after the build.
    pdu.sm_length = short_message.len();
    pdu.short_message = short_message;

    let rx = pending.register(seq);
    connection
        .write_frame(&Frame::DeliverSm(Box::new(pdu)))
        .await?;

    match tokio::time::timeout(ACK_WAIT_TIMEOUT, rx).await {
        Ok(Ok(CommandStatus::Ok)) => Ok(()),
        Ok(Ok(other)) => {
            pending.deregister(seq);
            Err(GatewayError::TransientTransport(format!(
                "deliver_sm_resp returned non-zero status: {other:?}"
            )))
        }
        Ok(Err(_)) => Err(GatewayError::TransientTransport(
            "ack channel dropped".into(),
        )),
        Err(_elapsed) => {
            pending.deregister(seq);
            Err(GatewayError::TransientTransport(
                "deliver_sm_resp timed out".into(),
            ))
        }
    }
}
