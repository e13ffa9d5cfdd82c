use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    #[default]
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChatType,
    pub name: Option<String>,
    pub participants: Vec<String>,
    /// Group creator; absent for direct chats.
    pub admin: Option<String>,
    /// Sorted participant pair of a direct chat. Left out of group chats so
    /// the unique partial index only covers direct ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_key: Option<String>,
    pub last_message: Option<LastMessage>,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    #[serde(default)]
    pub participants: Vec<String>,
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ChatType,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMembersRequest {
    pub user_ids: Vec<String>,
}

/// Order-independent key for a pair of users.
pub fn direct_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

fn with_actor(actor: &str, participants: Vec<String>) -> Vec<String> {
    let mut all: Vec<String> = Vec::with_capacity(participants.len() + 1);
    for id in std::iter::once(actor.to_string()).chain(participants) {
        let id = id.trim().to_string();
        if !id.is_empty() && !all.contains(&id) {
            all.push(id);
        }
    }
    all
}

impl Chat {
    pub fn new(req: CreateChatRequest, actor: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let participants = with_actor(actor, req.participants);
        let (name, admin, key) = match req.kind {
            ChatType::Direct => {
                if participants.len() != 2 {
                    return Err(AppError::validation("Direct chats must have exactly 2 participants"));
                }
                (None, None, Some(direct_key(&participants[0], &participants[1])))
            }
            ChatType::Group => {
                let name = req
                    .name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::validation("Group chats need a name"))?;
                (Some(name), Some(actor.to_string()), None)
            }
        };
        Ok(Self {
            id: new_id(),
            kind: req.kind,
            name,
            participants,
            admin,
            direct_key: key,
            last_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin.as_deref() == Some(user_id)
    }

    fn require_group(&self) -> Result<(), AppError> {
        if self.kind != ChatType::Group {
            return Err(AppError::not_found("Group chat"));
        }
        Ok(())
    }

    /// A direct chat between the same pair may exist only once.
    pub fn ensure_unique(&self, existing: Option<&Chat>) -> Result<(), AppError> {
        match (&self.direct_key, existing) {
            (Some(_), Some(_)) => Err(AppError::conflict("Chat already exists")),
            _ => Ok(()),
        }
    }

    /// Returns the users that were not members yet.
    pub fn add_members(&mut self, user_ids: Vec<String>, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        self.require_group()?;
        if user_ids.is_empty() {
            return Err(AppError::validation("Invalid user IDs provided"));
        }
        let mut added = Vec::new();
        for id in user_ids {
            let id = id.trim().to_string();
            if !id.is_empty() && !self.participants.contains(&id) && !added.contains(&id) {
                added.push(id);
            }
        }
        self.participants.extend(added.iter().cloned());
        self.updated_at = now;
        Ok(added)
    }

    /// Removes a member. If the group admin leaves, the longest-standing
    /// remaining member takes over; returns whether that happened.
    pub fn remove_member(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.require_group()?;
        if !self.is_participant(user_id) {
            return Err(AppError::not_found("Member"));
        }
        self.participants.retain(|p| p != user_id);
        let handed_over = self.is_admin(user_id);
        if handed_over {
            self.admin = self.participants.first().cloned();
        }
        self.updated_at = now;
        Ok(handed_over)
    }

    pub fn record_message(&mut self, message: &Message) {
        self.last_message = Some(LastMessage {
            content: message.content.clone(),
            sender: message.sender_id.clone(),
            created_at: message.created_at,
        });
        self.updated_at = message.created_at;
    }

    pub fn others<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a str> {
        self.participants.iter().map(String::as_str).filter(move |p| *p != user_id)
    }
}

/// Field-level writes for a chat document. Membership goes through set
/// operators so a message sent during a membership change keeps it.
pub mod updates {
    use super::*;

    pub fn last_message(chat: &Chat) -> Result<Document, AppError> {
        Ok(doc! {
            "$set": {
                "lastMessage": to_bson(&chat.last_message)?,
                "updatedAt": timestamp::to_bson(&chat.updated_at),
            }
        })
    }

    pub fn add_members(added: &[String], now: &DateTime<Utc>) -> Document {
        doc! {
            "$addToSet": { "participants": { "$each": added.to_vec() } },
            "$set": { "updatedAt": timestamp::to_bson(now) },
        }
    }

    /// `chat` is the state after [`Chat::remove_member`].
    pub fn remove_member(chat: &Chat, user_id: &str, handed_over: bool) -> Result<Document, AppError> {
        let mut set = doc! { "updatedAt": timestamp::to_bson(&chat.updated_at) };
        if handed_over {
            set.insert("admin", to_bson(&chat.admin)?);
        }
        Ok(doc! { "$pull": { "participants": user_id }, "$set": set })
    }
}

impl Message {
    pub fn new(chat_id: &str, sender_id: &str, content: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("Message cannot be empty"));
        }
        Ok(Self {
            id: new_id(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            read_by: vec![sender_id.to_string()],
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(participants: &[&str]) -> Result<Chat, AppError> {
        let req = CreateChatRequest {
            participants: participants.iter().map(|p| p.to_string()).collect(),
            name: None,
            kind: ChatType::Direct,
        };
        Chat::new(req, "alice", Utc::now())
    }

    fn group() -> Chat {
        let req = CreateChatRequest {
            participants: vec!["bob".into(), "carol".into()],
            name: Some("Core team".into()),
            kind: ChatType::Group,
        };
        Chat::new(req, "alice", Utc::now()).unwrap()
    }

    #[test]
    fn direct_chat_needs_exactly_one_other_person() {
        assert!(direct(&["bob"]).is_ok());
        assert!(direct(&["alice", "bob"]).is_ok());
        assert!(direct(&[]).is_err());
        assert!(direct(&["bob", "carol"]).is_err());
    }

    #[test]
    fn direct_key_ignores_order() {
        assert_eq!(direct_key("bob", "alice"), direct_key("alice", "bob"));
        assert_eq!(direct(&["bob"]).unwrap().direct_key.as_deref(), Some("alice:bob"));
    }

    #[test]
    fn group_chat_requires_name_and_records_admin() {
        let chat = group();
        assert!(chat.is_admin("alice"));
        assert!(chat.direct_key.is_none());
        assert_eq!(chat.participants, vec!["alice", "bob", "carol"]);

        let req = CreateChatRequest { participants: vec![], name: Some(" ".into()), kind: ChatType::Group };
        assert!(Chat::new(req, "alice", Utc::now()).is_err());
    }

    #[test]
    fn group_key_is_not_serialised() {
        let json = serde_json::to_value(group()).unwrap();
        assert!(json.get("directKey").is_none());
        assert_eq!(json["type"], "group");
    }

    #[test]
    fn membership_changes_only_apply_to_groups() {
        let mut chat = direct(&["bob"]).unwrap();
        assert!(chat.add_members(vec!["carol".into()], Utc::now()).is_err());

        let mut chat = group();
        let added = chat.add_members(vec!["bob".into(), "dave".into(), "dave".into()], Utc::now()).unwrap();
        assert_eq!(added, vec!["dave"]);
        assert!(!chat.remove_member("bob", Utc::now()).unwrap());
        assert!(!chat.is_participant("bob"));
        assert!(chat.remove_member("bob", Utc::now()).is_err());
    }

    #[test]
    fn admin_leaving_hands_over_the_group() {
        let mut chat = group();
        assert!(chat.remove_member("alice", Utc::now()).unwrap());
        assert!(chat.is_admin("bob"));

        let update = updates::remove_member(&chat, "alice", true).unwrap();
        assert_eq!(update.get_document("$pull").unwrap(), &doc! { "participants": "alice" });
        assert_eq!(update.get_document("$set").unwrap().get_str("admin").unwrap(), "bob");
    }

    #[test]
    fn second_direct_chat_for_a_pair_conflicts() {
        let first = direct(&["bob"]).unwrap();
        let again = direct(&["bob"]).unwrap();
        assert!(matches!(again.ensure_unique(Some(&first)), Err(AppError::Conflict(_))));
        assert!(again.ensure_unique(None).is_ok());

        let other_group = group();
        assert!(group().ensure_unique(Some(&other_group)).is_ok());
    }

    #[test]
    fn message_updates_leave_participants_alone() {
        let mut chat = group();
        let msg = Message::new(&chat.id, "alice", "hello", Utc::now()).unwrap();
        chat.record_message(&msg);
        let update = updates::last_message(&chat).unwrap();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_document("lastMessage").unwrap().get_str("content").unwrap(), "hello");
        assert!(!set.contains_key("participants"));
        assert_eq!(update.len(), 1);

        let update = updates::add_members(&["dave".to_string()], &Utc::now());
        assert_eq!(
            update.get_document("$addToSet").unwrap(),
            &doc! { "participants": { "$each": ["dave"] } }
        );
    }

    #[test]
    fn messages_start_read_by_sender() {
        let msg = Message::new("c1", "alice", " hi ", Utc::now()).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.read_by, vec!["alice"]);
        assert!(Message::new("c1", "alice", "  ", Utc::now()).is_err());

        let mut chat = group();
        chat.record_message(&msg);
        assert_eq!(chat.last_message.unwrap().content, "hi");
    }
}
