//! Best-effort fan-out of JSON events to named rooms of WebSocket sessions.

use std::collections::{HashMap, HashSet};
use std::fmt;

use actix::prelude::*;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Ideas,
    Resources,
    Projects,
    Chat(String),
    Meeting(String),
    User(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Ideas => write!(f, "ideas"),
            Room::Resources => write!(f, "resources"),
            Room::Projects => write!(f, "projects"),
            Room::Chat(id) => write!(f, "chat_{}", id),
            Room::Meeting(id) => write!(f, "meeting_{}", id),
            Room::User(id) => write!(f, "user_{}", id),
        }
    }
}

/// What a session receives; serialised as `{"event": ..., "payload": ...}`.
#[derive(Message, Debug, Clone, Serialize)]
#[rtype(result = "()")]
pub struct Notification {
    pub event: &'static str,
    pub payload: Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub session_id: Uuid,
    pub user_id: String,
    pub addr: Recipient<Notification>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub session_id: Uuid,
    pub room: Room,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub session_id: Uuid,
    pub room: Room,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub room: Room,
    pub event: &'static str,
    pub payload: Value,
    /// Session excluded from delivery, typically the sender.
    pub skip: Option<Uuid>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub event: &'static str,
    pub payload: Value,
}

/// Room membership bookkeeping. Empty rooms are dropped.
#[derive(Debug, Default)]
pub struct Rooms {
    members: HashMap<Room, HashSet<Uuid>>,
}

impl Rooms {
    pub fn join(&mut self, room: Room, session_id: Uuid) {
        self.members.entry(room).or_default().insert(session_id);
    }

    pub fn leave(&mut self, room: &Room, session_id: Uuid) {
        if let Some(sessions) = self.members.get_mut(room) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                self.members.remove(room);
            }
        }
    }

    pub fn leave_all(&mut self, session_id: Uuid) {
        self.members.retain(|_, sessions| {
            sessions.remove(&session_id);
            !sessions.is_empty()
        });
    }

    pub fn members(&self, room: &Room) -> impl Iterator<Item = Uuid> + '_ {
        self.members.get(room).into_iter().flatten().copied()
    }

    pub fn room_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Default)]
pub struct NotificationHub {
    sessions: HashMap<Uuid, Recipient<Notification>>,
    rooms: Rooms,
}

impl NotificationHub {
    fn deliver(&self, session_id: Uuid, event: &'static str, payload: &Value) {
        if let Some(addr) = self.sessions.get(&session_id) {
            addr.do_send(Notification { event, payload: payload.clone() });
        }
    }
}

impl Actor for NotificationHub {
    type Context = Context<Self>;
}

impl Handler<Connect> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        info!("User {} connected (WS session {})", msg.user_id, msg.session_id);
        self.sessions.insert(msg.session_id, msg.addr);
        for room in [Room::User(msg.user_id), Room::Ideas, Room::Resources, Room::Projects] {
            self.rooms.join(room, msg.session_id);
        }
    }
}

impl Handler<Disconnect> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("WS session {} disconnected", msg.session_id);
        self.sessions.remove(&msg.session_id);
        self.rooms.leave_all(msg.session_id);
        debug!("{} sessions in {} rooms", self.sessions.len(), self.rooms.room_count());
    }
}

impl Handler<Join> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Join, _: &mut Context<Self>) {
        if self.sessions.contains_key(&msg.session_id) {
            debug!("Session {} joined {}", msg.session_id, msg.room);
            self.rooms.join(msg.room, msg.session_id);
        }
    }
}

impl Handler<Leave> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Leave, _: &mut Context<Self>) {
        self.rooms.leave(&msg.room, msg.session_id);
    }
}

impl Handler<Publish> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        debug!("Publishing {} to {}", msg.event, msg.room);
        for session_id in self.rooms.members(&msg.room) {
            if Some(session_id) != msg.skip {
                self.deliver(session_id, msg.event, &msg.payload);
            }
        }
    }
}

impl Handler<Broadcast> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _: &mut Context<Self>) {
        for session_id in self.sessions.keys() {
            self.deliver(*session_id, msg.event, &msg.payload);
        }
    }
}
