use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Music {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    /// SoundCloud `<iframe>` snippet, rendered as-is by the client.
    pub embed_code: String,
    pub added_by: String,
    pub is_active: bool,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRequest {
    pub title: String,
    pub embed_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMusicRequest {
    pub title: Option<String>,
    pub embed_code: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_embed(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if !code.contains("iframe") || !code.contains("soundcloud") {
        return Err(AppError::validation("Invalid SoundCloud embed code"));
    }
    Ok(code.to_string())
}

impl Music {
    pub fn new(req: MusicRequest, added_by: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        Ok(Self {
            id: new_id(),
            title: title.to_string(),
            embed_code: validate_embed(&req.embed_code)?,
            added_by: added_by.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, req: UpdateMusicRequest, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(title) = req.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            self.title = title;
        }
        if let Some(code) = req.embed_code {
            self.embed_code = validate_embed(&code)?;
        }
        if let Some(active) = req.is_active {
            self.is_active = active;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn edit_update(&self) -> Document {
        doc! {
            "$set": {
                "title": &self.title,
                "embedCode": &self.embed_code,
                "isActive": self.is_active,
                "updatedAt": timestamp::to_bson(&self.updated_at),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBED: &str = r#"<iframe src="https://w.soundcloud.com/player/?url=x"></iframe>"#;

    #[test]
    fn embed_must_be_a_soundcloud_iframe() {
        let ok = MusicRequest { title: "Focus".into(), embed_code: EMBED.into() };
        assert!(Music::new(ok, "admin", Utc::now()).unwrap().is_active);

        let bad = MusicRequest { title: "Focus".into(), embed_code: "<iframe src=\"https://youtube.com\">".into() };
        assert!(Music::new(bad, "admin", Utc::now()).is_err());
    }

    #[test]
    fn update_can_deactivate() {
        let mut m = Music::new(MusicRequest { title: "Focus".into(), embed_code: EMBED.into() }, "a", Utc::now())
            .unwrap();
        m.apply_update(UpdateMusicRequest { is_active: Some(false), ..Default::default() }, Utc::now())
            .unwrap();
        assert!(!m.is_active);
        assert!(m
            .apply_update(UpdateMusicRequest { embed_code: Some("nope".into()), ..Default::default() }, Utc::now())
            .is_err());

        let set = m.edit_update();
        let set = set.get_document("$set").unwrap();
        assert!(!set.get_bool("isActive").unwrap());
        assert!(!set.contains_key("addedBy"));
    }
}
