use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(rename = "_id")]
    pub id: String,
    /// Free-form display date, e.g. "Q3 2024".
    pub date: String,
    pub title: String,
    pub description: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A finished piece of work on the "Wall of Victory".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub image_url: String,
    #[serde(default)]
    pub timeline_entries: Vec<TimelineEntry>,
    pub user: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntryRequest {
    pub date: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTimelineEntryRequest {
    pub date: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "image_url")]
    pub image_url: String,
    #[serde(default, alias = "timeline_entries")]
    pub timeline_entries: Vec<TimelineEntryRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl TimelineEntry {
    fn new(req: TimelineEntryRequest, now: DateTime<Utc>) -> Result<Self, AppError> {
        let (date, title, description) = (req.date.trim(), req.title.trim(), req.description.trim());
        if date.is_empty() || title.is_empty() || description.is_empty() {
            return Err(AppError::validation("Date, title and description are required"));
        }
        Ok(Self {
            id: new_id(),
            date: date.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

impl Project {
    pub fn new(req: CreateProjectRequest, user_id: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let title = req.title.trim();
        let image_url = req.image_url.trim();
        if title.is_empty() || image_url.is_empty() {
            return Err(AppError::validation("Title and image URL are required"));
        }
        let timeline_entries = req
            .timeline_entries
            .into_iter()
            .map(|e| TimelineEntry::new(e, now))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            id: new_id(),
            title: title.to_string(),
            image_url: image_url.to_string(),
            timeline_entries,
            user: user_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Blank fields are ignored rather than clearing the value.
    pub fn apply_update(&mut self, req: UpdateProjectRequest, now: DateTime<Utc>) {
        if let Some(title) = non_blank(req.title) {
            self.title = title;
        }
        if let Some(image_url) = non_blank(req.image_url) {
            self.image_url = image_url;
        }
        self.updated_at = now;
    }

    pub fn add_entry(&mut self, req: TimelineEntryRequest, now: DateTime<Utc>) -> Result<&TimelineEntry, AppError> {
        self.timeline_entries.push(TimelineEntry::new(req, now)?);
        self.updated_at = now;
        Ok(&self.timeline_entries[self.timeline_entries.len() - 1])
    }

    pub fn update_entry(
        &mut self,
        entry_id: &str,
        req: UpdateTimelineEntryRequest,
        now: DateTime<Utc>,
    ) -> Result<&TimelineEntry, AppError> {
        let index = self
            .timeline_entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| AppError::not_found("Timeline entry"))?;
        self.updated_at = now;
        let entry = &mut self.timeline_entries[index];
        if let Some(date) = non_blank(req.date) {
            entry.date = date;
        }
        if let Some(title) = non_blank(req.title) {
            entry.title = title;
        }
        if let Some(description) = non_blank(req.description) {
            entry.description = description;
        }
        entry.updated_at = now;
        Ok(entry)
    }

    pub fn remove_entry(&mut self, entry_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let before = self.timeline_entries.len();
        self.timeline_entries.retain(|e| e.id != entry_id);
        if self.timeline_entries.len() == before {
            return Err(AppError::not_found("Timeline entry"));
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Writes that touch only what changed, so concurrent timeline edits and
/// project edits do not overwrite each other.
pub mod updates {
    use super::*;

    pub fn fields(project: &Project) -> Document {
        doc! {
            "$set": {
                "title": &project.title,
                "imageUrl": &project.image_url,
                "updatedAt": timestamp::to_bson(&project.updated_at),
            }
        }
    }

    pub fn push_entry(entry: &TimelineEntry) -> Result<Document, AppError> {
        Ok(doc! {
            "$push": { "timelineEntries": to_bson(entry)? },
            "$set": { "updatedAt": timestamp::to_bson(&entry.created_at) },
        })
    }

    /// Pair with a filter on `timelineEntries._id` so `$` names the entry.
    pub fn set_entry(entry: &TimelineEntry) -> Document {
        let at = timestamp::to_bson(&entry.updated_at);
        doc! {
            "$set": {
                "timelineEntries.$.date": &entry.date,
                "timelineEntries.$.title": &entry.title,
                "timelineEntries.$.description": &entry.description,
                "timelineEntries.$.updatedAt": at.clone(),
                "updatedAt": at,
            }
        }
    }

    pub fn pull_entry(entry_id: &str, now: &DateTime<Utc>) -> Document {
        doc! {
            "$pull": { "timelineEntries": { "_id": entry_id } },
            "$set": { "updatedAt": timestamp::to_bson(now) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        let req: CreateProjectRequest = serde_json::from_value(serde_json::json!({
            "title": "Launch v2",
            "image_url": "https://img.example.com/v2.png",
        }))
        .unwrap();
        Project::new(req, "lead", Utc::now()).unwrap()
    }

    fn entry(title: &str) -> TimelineEntryRequest {
        TimelineEntryRequest { date: "March".into(), title: title.into(), description: "Done".into() }
    }

    #[test]
    fn title_and_image_are_required() {
        let req = CreateProjectRequest { title: "X".into(), image_url: " ".into(), timeline_entries: vec![] };
        assert!(matches!(Project::new(req, "lead", Utc::now()), Err(AppError::Validation(_))));
        assert_eq!(project().image_url, "https://img.example.com/v2.png");
    }

    #[test]
    fn blank_update_fields_are_ignored() {
        let mut p = project();
        let update = UpdateProjectRequest { title: Some("".into()), image_url: Some("https://new".into()) };
        p.apply_update(update, Utc::now());
        assert_eq!(p.title, "Launch v2");
        assert_eq!(p.image_url, "https://new");
    }

    #[test]
    fn timeline_entries_are_addressed_by_id() {
        let mut p = project();
        p.add_entry(entry("Kickoff"), Utc::now()).unwrap();
        p.add_entry(entry("Beta"), Utc::now()).unwrap();
        let beta = p.timeline_entries[1].id.clone();

        let update = UpdateTimelineEntryRequest { title: Some("Public beta".into()), ..Default::default() };
        p.update_entry(&beta, update, Utc::now()).unwrap();
        assert_eq!(p.timeline_entries[1].title, "Public beta");

        p.remove_entry(&beta, Utc::now()).unwrap();
        assert_eq!(p.timeline_entries.len(), 1);
        assert!(matches!(p.remove_entry(&beta, Utc::now()), Err(AppError::NotFound(_))));
        assert!(matches!(
            p.update_entry("missing", UpdateTimelineEntryRequest::default(), Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn timeline_writes_target_single_entries() {
        let mut p = project();
        let entry = p.add_entry(entry("Kickoff"), Utc::now()).unwrap().clone();

        let push = updates::push_entry(&entry).unwrap();
        let pushed = push.get_document("$push").unwrap().get_document("timelineEntries").unwrap();
        assert_eq!(pushed.get_str("_id").unwrap(), entry.id);
        assert_eq!(pushed.get_str("title").unwrap(), "Kickoff");

        let set = updates::set_entry(&entry);
        let set = set.get_document("$set").unwrap();
        assert_eq!(set.get_str("timelineEntries.$.title").unwrap(), "Kickoff");
        assert!(!set.contains_key("timelineEntries"));

        let pull = updates::pull_entry(&entry.id, &Utc::now());
        assert_eq!(
            pull.get_document("$pull").unwrap(),
            &doc! { "timelineEntries": { "_id": entry.id.as_str() } }
        );
    }

    #[test]
    fn project_edits_leave_the_timeline_alone() {
        let update = updates::fields(&project());
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("title").unwrap(), "Launch v2");
        assert!(!set.contains_key("timelineEntries"));
    }
}
