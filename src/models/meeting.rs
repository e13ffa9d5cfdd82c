use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, timestamp};

pub const MIN_DURATION: u32 = 15;
pub const MAX_DURATION: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringPattern {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    #[serde(default)]
    pub status: ResponseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub agenda: String,
    #[serde(with = "crate::models::timestamp")]
    pub date: DateTime<Utc>,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub created_by: String,
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub title: String,
    pub agenda: String,
    pub date: DateTime<Utc>,
    pub duration: u32,
    /// User ids to invite.
    #[serde(default)]
    pub participants: Vec<String>,
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeetingRequest {
    pub title: Option<String>,
    pub agenda: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub participants: Option<Vec<String>>,
    pub meeting_link: Option<String>,
    pub recurring: Option<bool>,
    pub recurring_pattern: Option<RecurringPattern>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub status: ResponseStatus,
}

fn check_duration(minutes: u32) -> Result<u32, AppError> {
    if !(MIN_DURATION..=MAX_DURATION).contains(&minutes) {
        return Err(AppError::validation(format!(
            "Duration must be between {} and {} minutes",
            MIN_DURATION, MAX_DURATION
        )));
    }
    Ok(minutes)
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Deduplicated invitees; the organiser is never their own participant.
/// Existing responses are kept for people who stay invited.
fn merge_participants(previous: &[Participant], ids: Vec<String>, organiser: &str) -> Vec<Participant> {
    let mut merged: Vec<Participant> = Vec::new();
    for id in ids {
        if id == organiser || merged.iter().any(|p| p.user_id == id) {
            continue;
        }
        let status = previous
            .iter()
            .find(|p| p.user_id == id)
            .map(|p| p.status)
            .unwrap_or_default();
        merged.push(Participant { user_id: id, status });
    }
    merged
}

impl Meeting {
    pub fn new(req: CreateMeetingRequest, created_by: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        Ok(Self {
            id: new_id(),
            title: required("Title", &req.title)?,
            agenda: required("Agenda", &req.agenda)?,
            date: req.date,
            duration: check_duration(req.duration)?,
            participants: merge_participants(&[], req.participants, created_by),
            created_by: created_by.to_string(),
            meeting_link: req.meeting_link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            recurring: req.recurring,
            recurring_pattern: if req.recurring { req.recurring_pattern } else { None },
            created_at: now,
            updated_at: now,
        })
    }

    /// Everyone who should hear about changes, organiser excluded.
    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.user_id.as_str())
    }

    pub fn apply_update(&mut self, req: UpdateMeetingRequest, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(title) = req.title {
            self.title = required("Title", &title)?;
        }
        if let Some(agenda) = req.agenda {
            self.agenda = required("Agenda", &agenda)?;
        }
        if let Some(date) = req.date {
            self.date = date;
        }
        if let Some(duration) = req.duration {
            self.duration = check_duration(duration)?;
        }
        if let Some(ids) = req.participants {
            self.participants = merge_participants(&self.participants, ids, &self.created_by);
        }
        if let Some(link) = req.meeting_link {
            let link = link.trim();
            self.meeting_link = (!link.is_empty()).then(|| link.to_string());
        }
        if let Some(recurring) = req.recurring {
            self.recurring = recurring;
        }
        if req.recurring_pattern.is_some() {
            self.recurring_pattern = req.recurring_pattern;
        }
        if !self.recurring {
            self.recurring_pattern = None;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn respond(&mut self, user_id: &str, status: ResponseStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::not_found("Meeting"))?;
        participant.status = status;
        self.updated_at = now;
        Ok(())
    }
}

pub mod updates {
    use super::*;

    /// Everything an organiser may edit; responses of people who stay
    /// invited are already merged into `participants`.
    pub fn details(meeting: &Meeting) -> Result<Document, AppError> {
        Ok(doc! {
            "$set": {
                "title": &meeting.title,
                "agenda": &meeting.agenda,
                "date": timestamp::to_bson(&meeting.date),
                "duration": i64::from(meeting.duration),
                "participants": to_bson(&meeting.participants)?,
                "meetingLink": to_bson(&meeting.meeting_link)?,
                "recurring": meeting.recurring,
                "recurringPattern": to_bson(&meeting.recurring_pattern)?,
                "updatedAt": timestamp::to_bson(&meeting.updated_at),
            }
        })
    }

    /// Pair with a filter on `participants.userId` so `$` names the responder.
    pub fn response(status: ResponseStatus, now: &DateTime<Utc>) -> Result<Document, AppError> {
        Ok(doc! {
            "$set": {
                "participants.$.status": to_bson(&status)?,
                "updatedAt": timestamp::to_bson(now),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(duration: u32) -> CreateMeetingRequest {
        CreateMeetingRequest {
            title: "Sprint review".into(),
            agenda: "Demo".into(),
            date: Utc::now(),
            duration,
            participants: vec!["bob".into(), "carol".into(), "bob".into(), "alice".into()],
            meeting_link: Some(" ".into()),
            recurring: false,
            recurring_pattern: Some(RecurringPattern::Weekly),
        }
    }

    #[test]
    fn duration_is_bounded() {
        assert!(Meeting::new(request(14), "alice", Utc::now()).is_err());
        assert!(Meeting::new(request(15), "alice", Utc::now()).is_ok());
        assert!(Meeting::new(request(240), "alice", Utc::now()).is_ok());
        assert!(Meeting::new(request(241), "alice", Utc::now()).is_err());
    }

    #[test]
    fn invitees_are_deduplicated_and_exclude_organiser() {
        let meeting = Meeting::new(request(30), "alice", Utc::now()).unwrap();
        let ids: Vec<_> = meeting.participant_ids().collect();
        assert_eq!(ids, vec!["bob", "carol"]);
        assert!(meeting.participants.iter().all(|p| p.status == ResponseStatus::Pending));
        assert!(meeting.meeting_link.is_none());
        assert!(meeting.recurring_pattern.is_none());
    }

    #[test]
    fn only_participants_respond() {
        let mut meeting = Meeting::new(request(30), "alice", Utc::now()).unwrap();
        meeting.respond("bob", ResponseStatus::Accepted, Utc::now()).unwrap();
        assert_eq!(meeting.participants[0].status, ResponseStatus::Accepted);
        assert!(matches!(
            meeting.respond("mallory", ResponseStatus::Accepted, Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn reinviting_keeps_existing_responses() {
        let mut meeting = Meeting::new(request(30), "alice", Utc::now()).unwrap();
        meeting.respond("carol", ResponseStatus::Declined, Utc::now()).unwrap();
        let update = UpdateMeetingRequest {
            participants: Some(vec!["carol".into(), "dave".into()]),
            recurring: Some(true),
            recurring_pattern: Some(RecurringPattern::Monthly),
            ..Default::default()
        };
        meeting.apply_update(update, Utc::now()).unwrap();
        assert_eq!(
            meeting.participants,
            vec![
                Participant { user_id: "carol".into(), status: ResponseStatus::Declined },
                Participant { user_id: "dave".into(), status: ResponseStatus::Pending },
            ]
        );
        assert_eq!(meeting.recurring_pattern, Some(RecurringPattern::Monthly));
    }

    #[test]
    fn responses_touch_only_the_responder() {
        let update = updates::response(ResponseStatus::Accepted, &Utc::now()).unwrap();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("participants.$.status").unwrap(), "accepted");
        assert!(!set.contains_key("participants"));

        let meeting = Meeting::new(request(30), "alice", Utc::now()).unwrap();
        let details = updates::details(&meeting).unwrap();
        let set = details.get_document("$set").unwrap();
        assert_eq!(set.get_array("participants").unwrap().len(), 2);
        assert!(!set.contains_key("createdBy"));
        assert!(!set.contains_key("createdAt"));
    }
}
