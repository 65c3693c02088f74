//! Realtime event bus: a room registry plus a WebSocket actor that joins one
//! room per `(orgId, projectId)` tenant and forwards ingested events to every
//! connected dashboard for that tenant.

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::tenant::Tenant;
use crate::domain::event::Event;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

/// Message broadcast to subscribers of a room when an event is ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    NewEvent {
        data: Event,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Registry of rooms (`{orgId}:{projectId}`), each a set of connected
/// WebSocket actor addresses. Held behind an `Arc` and shared across the
/// application as a single instance, injected via `web::Data`.
#[derive(Default)]
pub struct RealtimeBus {
    rooms: RwLock<HashMap<String, HashMap<Uuid, Addr<Connection>>>>,
}

impl RealtimeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn room_key(tenant: &Tenant) -> String {
        format!("{}:{}", tenant.org_id, tenant.project_id)
    }

    /// Register a connection under a tenant's room. Called from the
    /// connection actor's `started` hook.
    pub fn subscribe(&self, tenant: &Tenant, connection_id: Uuid, addr: Addr<Connection>) {
        let key = Self::room_key(tenant);
        let mut rooms = self.rooms.write().expect("realtime bus lock poisoned");
        rooms.entry(key).or_insert_with(HashMap::new).insert(connection_id, addr);
    }

    /// Remove a connection from its room. Called from the connection actor's
    /// `stopped` hook. A no-op if the room or connection is already gone.
    pub fn unsubscribe(&self, tenant: &Tenant, connection_id: Uuid) {
        let key = Self::room_key(tenant);
        let mut rooms = self.rooms.write().expect("realtime bus lock poisoned");
        if let Some(room) = rooms.get_mut(&key) {
            room.remove(&connection_id);
            if room.is_empty() {
                rooms.remove(&key);
            }
        }
    }

    /// Broadcast an event to every connection subscribed to its tenant's
    /// room. Dead addresses (actor already stopped) are skipped silently —
    /// they'll be pruned on their own `unsubscribe` call.
    pub fn publish(&self, tenant: &Tenant, event: Event) {
        let key = Self::room_key(tenant);
        let rooms = self.rooms.read().expect("realtime bus lock poisoned");
        let Some(room) = rooms.get(&key) else { return };

        let message = RealtimeMessage::NewEvent {
            data: event,
            timestamp: chrono::Utc::now(),
        };

        for addr in room.values() {
            addr.do_send(Broadcast(message.clone()));
        }
    }

    /// Number of connections currently subscribed to a tenant's room.
    pub fn room_size(&self, tenant: &Tenant) -> usize {
        let key = Self::room_key(tenant);
        let rooms = self.rooms.read().expect("realtime bus lock poisoned");
        rooms.get(&key).map(|r| r.len()).unwrap_or(0)
    }
}

/// Actor message wrapping a bus message for delivery to one connection.
#[derive(Message, Clone)]
#[rtype(result = "()")]
struct Broadcast(RealtimeMessage);

/// One WebSocket connection, subscribed to a single tenant's room for its
/// lifetime.
pub struct Connection {
    id: Uuid,
    tenant: Tenant,
    bus: Arc<RealtimeBus>,
    last_heartbeat: Instant,
}

impl Connection {
    pub fn new(tenant: Tenant, bus: Arc<RealtimeBus>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            bus,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                act.bus.unsubscribe(&act.tenant, act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for Connection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.bus.subscribe(&self.tenant, self.id, ctx.address());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.bus.unsubscribe(&self.tenant, self.id);
    }
}

impl Handler<Broadcast> for Connection {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, ctx: &mut Self::Context) -> Self::Result {
        if let Ok(text) = serde_json::to_string(&msg.0) {
            ctx.text(text);
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for Connection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                // Clients never send application data on this channel — the
                // bus is publish-only from the server's side.
            }
            _ => ctx.stop(),
        }
    }
}

/// `GET /events/realtime` handler. `Tenant` is extracted from request
/// extensions populated by the API key middleware, never from a client-
/// supplied path or query parameter.
pub async fn realtime_endpoint(
    req: HttpRequest,
    stream: web::Payload,
    tenant: Tenant,
    bus: web::Data<Arc<RealtimeBus>>,
) -> ActixResult<HttpResponse> {
    let connection = Connection::new(tenant, bus.get_ref().clone());
    ws::start(connection, &req, stream)
}
