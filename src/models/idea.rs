use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::new_id;

const LINK_PATTERN: &str = r#"^(http|https)://[^ "]+$"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub comment: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub resource_link: Option<String>,
    #[serde(default)]
    pub votes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdeaRequest {
    pub title: String,
    pub description: String,
    pub resource_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

pub fn is_valid_link(link: &str) -> bool {
    Regex::new(LINK_PATTERN).map(|re| re.is_match(link)).unwrap_or(false)
}

impl Idea {
    pub fn new(req: CreateIdeaRequest, created_by: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let title = req.title.trim();
        let description = req.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(AppError::validation("Title and description are required"));
        }
        let resource_link = req
            .resource_link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if let Some(link) = &resource_link {
            if !is_valid_link(link) {
                return Err(AppError::validation("Please enter a valid URL"));
            }
        }
        Ok(Self {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            resource_link,
            votes: Vec::new(),
            comments: Vec::new(),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Adds the user's vote, or withdraws it if already cast. Returns whether
    /// the user has voted afterwards.
    pub fn toggle_vote(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.votes.iter().position(|v| v == user_id) {
            self.votes.remove(pos);
            false
        } else {
            self.votes.push(user_id.to_string());
            true
        }
    }

    pub fn add_comment(&mut self, user_id: &str, text: &str, now: DateTime<Utc>) -> Result<&Comment, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("Comment cannot be empty"));
        }
        self.comments.push(Comment {
            id: new_id(),
            user_id: user_id.to_string(),
            comment: text.to_string(),
            created_at: now,
        });
        self.updated_at = now;
        Ok(&self.comments[self.comments.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea(link: Option<&str>) -> Result<Idea, AppError> {
        let req = CreateIdeaRequest {
            title: "Dark mode".into(),
            description: "Easier on the eyes".into(),
            resource_link: link.map(String::from),
        };
        Idea::new(req, "alice", Utc::now())
    }

    #[test]
    fn resource_link_must_be_http_url() {
        assert!(idea(Some("https://example.com/x?y=1")).is_ok());
        assert!(idea(Some("http://example.com")).is_ok());
        assert!(idea(Some("ftp://example.com")).is_err());
        assert!(idea(Some("https://bad url")).is_err());
        assert!(idea(None).unwrap().resource_link.is_none());
        assert!(idea(Some("  ")).unwrap().resource_link.is_none());
    }

    #[test]
    fn voting_twice_withdraws_the_vote() {
        let mut idea = idea(None).unwrap();
        assert!(idea.toggle_vote("bob"));
        assert!(idea.toggle_vote("carol"));
        assert!(!idea.toggle_vote("bob"));
        assert_eq!(idea.votes, vec!["carol".to_string()]);
    }

    #[test]
    fn blank_comments_are_rejected() {
        let mut idea = idea(None).unwrap();
        assert!(idea.add_comment("bob", "   ", Utc::now()).is_err());
        assert_eq!(idea.add_comment("bob", " nice ", Utc::now()).unwrap().comment, "nice");
        assert_eq!(idea.comments.len(), 1);
    }
}
