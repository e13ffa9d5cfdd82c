use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use mongodb::bson::doc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::MongoDB;
use crate::notifications::{Connect, Disconnect, Join, Leave, Notification, NotificationHub, Publish, Room};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events a client may send over the socket, tagged by `type`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    JoinMeeting { meeting_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveMeeting { meeting_id: String },
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: String },
    #[serde(rename_all = "camelCase")]
    StopTyping { chat_id: String },
    #[serde(rename_all = "camelCase")]
    MeetingMessage { meeting_id: String, message: Value },
    #[serde(rename_all = "camelCase")]
    MoveTask {
        project_id: String,
        task_id: String,
        from_stage: String,
        to_stage: String,
    },
}

/// What the session should do with a client event.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Join a chat room once the caller is confirmed as a participant.
    JoinChat(String),
    Join(Room),
    Leave(Room),
    Relay { room: Room, event: &'static str, payload: Value },
}

impl ClientEvent {
    pub fn into_command(self, user_id: &str) -> Command {
        match self {
            ClientEvent::JoinChat { chat_id } => Command::JoinChat(chat_id),
            ClientEvent::LeaveChat { chat_id } => Command::Leave(Room::Chat(chat_id)),
            ClientEvent::JoinMeeting { meeting_id } => Command::Join(Room::Meeting(meeting_id)),
            ClientEvent::LeaveMeeting { meeting_id } => Command::Leave(Room::Meeting(meeting_id)),
            ClientEvent::Typing { chat_id } => Command::Relay {
                payload: json!({ "chatId": chat_id, "userId": user_id }),
                room: Room::Chat(chat_id),
                event: "userTyping",
            },
            ClientEvent::StopTyping { chat_id } => Command::Relay {
                payload: json!({ "chatId": chat_id, "userId": user_id }),
                room: Room::Chat(chat_id),
                event: "userStoppedTyping",
            },
            ClientEvent::MeetingMessage { meeting_id, message } => Command::Relay {
                payload: json!({ "meetingId": meeting_id, "userId": user_id, "message": message }),
                room: Room::Meeting(meeting_id),
                event: "newMeetingMessage",
            },
            ClientEvent::MoveTask { project_id, task_id, from_stage, to_stage } => Command::Relay {
                room: Room::Projects,
                event: "taskMoved",
                payload: json!({
                    "projectId": project_id,
                    "taskId": task_id,
                    "fromStage": from_stage,
                    "toStage": to_stage,
                    "userId": user_id,
                }),
            },
        }
    }
}

pub struct WsSession {
    id: Uuid,
    user_id: String,
    hb: Instant,
    hub: Addr<NotificationHub>,
    mongodb: Arc<MongoDB>,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                info!("WebSocket heartbeat failed for user {}, disconnecting", act.user_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn join_chat(&self, chat_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let (mongodb, hub) = (self.mongodb.clone(), self.hub.clone());
        let (session_id, user_id) = (self.id, self.user_id.clone());
        let fut = async move {
            let filter = doc! { "_id": &chat_id, "participants": &user_id };
            match mongodb.chats().find_one(filter).await {
                Ok(Some(_)) => hub.do_send(Join { session_id, room: Room::Chat(chat_id) }),
                Ok(None) => warn!("User {} tried to join chat {} without membership", user_id, chat_id),
                Err(e) => warn!("Chat membership lookup failed: {}", e),
            }
        };
        ctx.spawn(fut.into_actor(self));
    }

    fn dispatch(&self, command: Command, ctx: &mut ws::WebsocketContext<Self>) {
        match command {
            Command::JoinChat(chat_id) => self.join_chat(chat_id, ctx),
            Command::Join(room) => self.hub.do_send(Join { session_id: self.id, room }),
            Command::Leave(room) => self.hub.do_send(Leave { session_id: self.id, room }),
            Command::Relay { room, event, payload } => self.hub.do_send(Publish {
                room,
                event,
                payload,
                skip: Some(self.id),
            }),
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.hub
            .send(Connect {
                session_id: self.id,
                user_id: self.user_id.clone(),
                addr: ctx.address().recipient(),
            })
            .into_actor(self)
            .then(|res, _, ctx| {
                if let Err(e) = res {
                    warn!("Failed to register with notification hub: {}", e);
                    ctx.stop();
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.hub.do_send(Disconnect { session_id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    debug!("WS event from {}: {:?}", self.user_id, event);
                    let command = event.into_command(&self.user_id);
                    self.dispatch(command, ctx);
                }
                Err(e) => debug!("Ignoring malformed WS frame from {}: {}", self.user_id, e),
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<Notification> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Notification, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Could not encode {} for user {}: {}", msg.event, self.user_id, e),
        }
    }
}

/// GET /ws
/// Authenticated upgrade; the token may arrive as `?token=`.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    user: AuthUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = WsSession {
        id: Uuid::new_v4(),
        user_id: user.id,
        hb: Instant::now(),
        hub: data.hub.clone(),
        mongodb: data.mongodb.clone(),
    };
    ws::start(session, &req, stream)
}
