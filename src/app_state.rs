use std::sync::Arc;

use actix::Addr;
use serde::Serialize;

use crate::config::Config;
use crate::db::MongoDB;
use crate::notifications::{Broadcast, NotificationHub, Publish, Room};
use crate::task_store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub hub: Addr<NotificationHub>,
    pub mongodb: Arc<MongoDB>,
    pub tasks: Arc<dyn TaskStore>,
    pub config: Config,
}

impl AppState {
    /// Fire-and-forget push to one room.
    pub fn notify<T: Serialize>(&self, room: Room, event: &'static str, payload: &T) {
        if let Some(payload) = to_payload(event, payload) {
            self.hub.do_send(Publish { room, event, payload, skip: None });
        }
    }

    /// Fire-and-forget push to every connected session.
    pub fn broadcast<T: Serialize>(&self, event: &'static str, payload: &T) {
        if let Some(payload) = to_payload(event, payload) {
            self.hub.do_send(Broadcast { event, payload });
        }
    }
}

fn to_payload<T: Serialize>(event: &str, payload: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Dropping {} notification: {}", event, e);
            None
        }
    }
}
