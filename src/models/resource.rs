use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Video,
    Article,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub uploaded_by: String,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateResourceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ResourceType>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Query string of `GET /api/resources`.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tags: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

impl Resource {
    pub fn new(req: CreateResourceRequest, uploaded_by: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        Ok(Self {
            id: new_id(),
            title: required("Title", &req.title)?,
            description: required("Description", &req.description)?,
            kind: req.kind,
            url: required("Url", &req.url)?,
            tags: clean_tags(req.tags),
            uploaded_by: uploaded_by.to_string(),
            likes: Vec::new(),
            views: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, req: UpdateResourceRequest, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(title) = req.title {
            self.title = required("Title", &title)?;
        }
        if let Some(description) = req.description {
            self.description = required("Description", &description)?;
        }
        if let Some(kind) = req.kind {
            self.kind = kind;
        }
        if let Some(url) = req.url {
            self.url = required("Url", &url)?;
        }
        if let Some(tags) = req.tags {
            self.tags = clean_tags(tags);
        }
        self.updated_at = now;
        Ok(())
    }

    /// `$set` for the fields an edit may change. Likes and views are left to
    /// their own atomic operators.
    pub fn edit_update(&self) -> Result<Document, AppError> {
        Ok(doc! {
            "$set": {
                "title": &self.title,
                "description": &self.description,
                "type": to_bson(&self.kind)?,
                "url": &self.url,
                "tags": self.tags.clone(),
                "updatedAt": timestamp::to_bson(&self.updated_at),
            }
        })
    }

    /// Set semantics: liking twice removes the like.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.likes.iter().position(|l| l == user_id) {
            self.likes.remove(pos);
            false
        } else {
            self.likes.push(user_id.to_string());
            true
        }
    }
}

impl ResourceQuery {
    pub fn filter(&self) -> Document {
        let mut filter = doc! {};
        if let Some(kind) = self.kind.as_deref().map(str::trim).filter(|k| !k.is_empty() && *k != "all") {
            filter.insert("type", kind);
        }
        if let Some(tags) = &self.tags {
            let tags: Vec<&str> = tags.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
            if !tags.is_empty() {
                filter.insert("tags", doc! { "$in": tags });
            }
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = regex::escape(search);
            filter.insert(
                "$or",
                vec![
                    doc! { "title": { "$regex": &pattern, "$options": "i" } },
                    doc! { "description": { "$regex": &pattern, "$options": "i" } },
                    doc! { "tags": { "$regex": &pattern, "$options": "i" } },
                ],
            );
        }
        filter
    }

    /// `field` ascending, `-field` descending; unknown keys fall back to newest first.
    pub fn sort(&self) -> Document {
        let raw = self.sort.as_deref().unwrap_or("-createdAt");
        let (field, direction) = match raw.strip_prefix('-') {
            Some(field) => (field, -1),
            None => (raw, 1),
        };
        match field {
            "createdAt" | "views" | "title" => doc! { field: direction },
            _ => doc! { "createdAt": -1 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_defaults_to_newest_first() {
        assert_eq!(ResourceQuery::default().sort(), doc! { "createdAt": -1 });
        let q = ResourceQuery { sort: Some("views".into()), ..Default::default() };
        assert_eq!(q.sort(), doc! { "views": 1 });
        let q = ResourceQuery { sort: Some("-title".into()), ..Default::default() };
        assert_eq!(q.sort(), doc! { "title": -1 });
        let q = ResourceQuery { sort: Some("password".into()), ..Default::default() };
        assert_eq!(q.sort(), doc! { "createdAt": -1 });
    }

    #[test]
    fn filter_combines_type_tags_and_search() {
        let q = ResourceQuery {
            kind: Some("video".into()),
            tags: Some("rust, async,".into()),
            search: Some("a.b".into()),
            sort: None,
        };
        let filter = q.filter();
        assert_eq!(filter.get_str("type").unwrap(), "video");
        assert_eq!(filter.get_document("tags").unwrap(), &doc! { "$in": ["rust", "async"] });
        let or = filter.get_array("$or").unwrap();
        assert_eq!(or.len(), 3);
        assert_eq!(or[0].as_document().unwrap(), &doc! { "title": { "$regex": "a\\.b", "$options": "i" } });
    }

    #[test]
    fn empty_query_matches_everything() {
        let q = ResourceQuery { kind: Some("all".into()), ..Default::default() };
        assert!(q.filter().is_empty());
    }

    #[test]
    fn likes_toggle() {
        let req = CreateResourceRequest {
            title: "Book".into(),
            description: "Rust book".into(),
            kind: ResourceType::Article,
            url: "https://doc.rust-lang.org/book".into(),
            tags: vec![" rust ".into(), "".into()],
        };
        let mut resource = Resource::new(req, "lead", Utc::now()).unwrap();
        assert_eq!(resource.tags, vec!["rust".to_string()]);
        assert!(resource.toggle_like("bob"));
        assert!(!resource.toggle_like("bob"));
        assert!(resource.likes.is_empty());
    }

    #[test]
    fn edits_never_write_likes_or_views() {
        let req = CreateResourceRequest {
            title: "Book".into(),
            description: "Rust book".into(),
            kind: ResourceType::Article,
            url: "https://doc.rust-lang.org/book".into(),
            tags: vec![],
        };
        let mut resource = Resource::new(req, "lead", Utc::now()).unwrap();
        let update = UpdateResourceRequest { kind: Some(ResourceType::Video), ..Default::default() };
        resource.apply_update(update, Utc::now()).unwrap();

        let update = resource.edit_update().unwrap();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("type").unwrap(), "video");
        assert_eq!(set.get_str("title").unwrap(), "Book");
        assert!(set.contains_key("updatedAt"));
        assert!(!set.contains_key("likes"));
        assert!(!set.contains_key("views"));
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn type_uses_wire_name() {
        let json = serde_json::json!({
            "title": "T", "description": "D", "type": "tool", "url": "https://x"
        });
        let req: CreateResourceRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.kind, ResourceType::Tool);
    }
}
