use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::new_id;

pub const DEFAULT_STAGES: [&str; 5] = ["Planning", "Development", "Review", "Testing", "Deployment"];

fn default_stage_description(stage: &str) -> Option<&'static str> {
    match stage {
        "Planning" => Some("Initial planning and requirement gathering phase"),
        "Development" => Some("Active development and implementation phase"),
        "Review" => Some("Code review and initial testing phase"),
        "Testing" => Some("Comprehensive testing and bug fixing phase"),
        "Deployment" => Some("Final deployment and release phase"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Status recorded in the history. `Created` only ever appears as the first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryStatus {
    Created,
    Pending,
    InProgress,
    Completed,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryStatus::Created => "created",
            HistoryStatus::Pending => "pending",
            HistoryStatus::InProgress => "in-progress",
            HistoryStatus::Completed => "completed",
        }
    }
}

impl From<TaskStatus> for HistoryStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => HistoryStatus::Pending,
            TaskStatus::InProgress => HistoryStatus::InProgress,
            TaskStatus::Completed => HistoryStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One step of a task's pipeline. Stages live inside the task document so a
/// stage move is a single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl Stage {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), content: String::new(), is_completed: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: HistoryStatus,
    pub updated_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "crate::models::timestamp")]
    pub deadline: DateTime<Utc>,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stages: Vec<Stage>,
    pub current_stage: String,
    #[serde(default)]
    pub stage_descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub team_leader: Option<String>,
    /// Bumped on every successful save; writers compare-and-swap on it.
    #[serde(default)]
    pub version: i64,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stages: Option<Vec<String>>,
    #[serde(alias = "stage")]
    pub current_stage: Option<String>,
    pub stage_descriptions: Option<BTreeMap<String, String>>,
    pub team_leader: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignees: Option<Vec<String>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub team_leader: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStageContentRequest {
    pub task_id: String,
    pub stage_name: String,
    pub content: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub stage_name: String,
    pub is_completed: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageContent {
    pub content: String,
    pub is_completed: bool,
}

fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl Task {
    /// Builds a new task, seeding one empty stage per stage name and the
    /// synthetic `created` history entry.
    pub fn new(req: CreateTaskRequest, created_by: &str, now: DateTime<Utc>) -> Result<Self, AppError> {
        let title = require_text("Title", &req.title)?;
        let description = require_text("Description", &req.description)?;

        let names: Vec<String> = match req.stages {
            Some(names) => names.into_iter().map(|n| n.trim().to_string()).collect(),
            None => DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
        };
        if names.is_empty() {
            return Err(AppError::validation("A task needs at least one stage"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(AppError::validation("Stage names cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(AppError::validation(format!("Duplicate stage name: {}", name)));
            }
        }

        let current_stage = match req.current_stage {
            Some(stage) if names.contains(&stage) => stage,
            Some(_) => return Err(AppError::validation("Stage must be one of the defined stages")),
            None => names[0].clone(),
        };

        let stage_descriptions = req.stage_descriptions.unwrap_or_else(|| {
            names
                .iter()
                .filter_map(|n| default_stage_description(n).map(|d| (n.clone(), d.to_string())))
                .collect()
        });

        Ok(Self {
            id: new_id(),
            title,
            description,
            deadline: req.deadline,
            status: req.status.unwrap_or_default(),
            priority: req.priority.unwrap_or_default(),
            assignees: req.assignees,
            category: req.category,
            tags: req.tags,
            stages: names.into_iter().map(Stage::new).collect(),
            current_stage,
            stage_descriptions,
            status_history: vec![StatusChange {
                status: HistoryStatus::Created,
                updated_by: created_by.to_string(),
                updated_at: now,
            }],
            created_by: created_by.to_string(),
            team_leader: req.team_leader,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn stage(&self, name: &str) -> Result<&Stage, AppError> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AppError::validation("Invalid stage name"))
    }

    pub fn is_assignee(&self, user_id: &str) -> bool {
        self.assignees.iter().any(|a| a == user_id)
    }

    /// Creator, assignee or team leader of the task.
    pub fn involves(&self, user_id: &str) -> bool {
        self.created_by == user_id
            || self.is_assignee(user_id)
            || self.team_leader.as_deref() == Some(user_id)
    }

    /// Records a status change. Returns `false` (and records nothing) when
    /// the status is unchanged.
    pub fn set_status(&mut self, status: TaskStatus, actor_id: &str, now: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        self.status_history.push(StatusChange {
            status: status.into(),
            updated_by: actor_id.to_string(),
            updated_at: now,
        });
        self.status = status;
        true
    }

    pub fn apply_update(
        &mut self,
        req: UpdateTaskRequest,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(title) = req.title {
            self.title = require_text("Title", &title)?;
        }
        if let Some(description) = req.description {
            self.description = require_text("Description", &description)?;
        }
        if let Some(deadline) = req.deadline {
            self.deadline = deadline;
        }
        if let Some(priority) = req.priority {
            self.priority = priority;
        }
        if let Some(assignees) = req.assignees {
            self.assignees = assignees;
        }
        if let Some(category) = req.category {
            self.category = Some(category);
        }
        if let Some(tags) = req.tags {
            self.tags = tags;
        }
        if let Some(team_leader) = req.team_leader {
            self.team_leader = Some(team_leader);
        }
        if let Some(status) = req.status {
            self.set_status(status, actor_id, now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn set_stage_content(&mut self, stage_name: &str, content: String) -> Result<&Stage, AppError> {
        let idx = self
            .stage_index(stage_name)
            .ok_or_else(|| AppError::validation("Invalid stage name"))?;
        self.stages[idx].content = content;
        Ok(&self.stages[idx])
    }

    pub fn stage_summaries(&self) -> Vec<StageSummary> {
        let mut summaries: Vec<StageSummary> = self
            .stages
            .iter()
            .map(|s| StageSummary { stage_name: s.name.clone(), is_completed: s.is_completed })
            .collect();
        summaries.sort_by(|a, b| a.stage_name.cmp(&b.stage_name));
        summaries
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn request(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.to_string(),
            description: "Ship it".to_string(),
            deadline: Utc::now(),
            status: None,
            priority: None,
            assignees: vec!["bob".to_string()],
            category: None,
            tags: vec![],
            stages: None,
            current_stage: None,
            stage_descriptions: None,
            team_leader: Some("lead".to_string()),
        }
    }

    #[test]
    fn new_task_uses_default_pipeline() {
        let task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        let names: Vec<_> = task.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, DEFAULT_STAGES);
        assert_eq!(task.current_stage, "Planning");
        assert!(task.stages.iter().all(|s| !s.is_completed && s.content.is_empty()));
        assert_eq!(task.stage_descriptions.len(), 5);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn creation_writes_one_created_entry() {
        let task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        assert_eq!(task.status_history.len(), 1);
        assert_eq!(task.status_history[0].status, HistoryStatus::Created);
        assert_eq!(task.status_history[0].updated_by, "alice");
    }

    #[test]
    fn rejects_empty_or_duplicate_stages() {
        let mut req = request("Launch");
        req.stages = Some(vec![]);
        assert!(matches!(Task::new(req, "a", Utc::now()), Err(AppError::Validation(_))));

        let mut req = request("Launch");
        req.stages = Some(vec!["Draft".into(), "Draft".into()]);
        assert!(matches!(Task::new(req, "a", Utc::now()), Err(AppError::Validation(_))));
    }

    #[test]
    fn current_stage_must_be_a_member() {
        let mut req = request("Launch");
        req.stages = Some(vec!["Draft".into(), "Final".into()]);
        req.current_stage = Some("Review".into());
        assert!(Task::new(req, "a", Utc::now()).is_err());

        let mut req = request("Launch");
        req.stages = Some(vec!["Draft".into(), "Final".into()]);
        req.current_stage = Some("Final".into());
        assert_eq!(Task::new(req, "a", Utc::now()).unwrap().current_stage, "Final");
    }

    #[test]
    fn status_history_only_grows_on_real_changes() {
        let mut task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        assert!(!task.set_status(TaskStatus::Pending, "bob", Utc::now()));
        assert_eq!(task.status_history.len(), 1);

        assert!(task.set_status(TaskStatus::InProgress, "bob", Utc::now()));
        assert!(task.set_status(TaskStatus::Pending, "bob", Utc::now()));
        assert!(task.set_status(TaskStatus::Completed, "carol", Utc::now()));
        let statuses: Vec<_> = task.status_history.iter().map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![
                HistoryStatus::Created,
                HistoryStatus::InProgress,
                HistoryStatus::Pending,
                HistoryStatus::Completed
            ]
        );
        assert_eq!(task.status_history[3].updated_by, "carol");
    }

    #[test]
    fn update_routes_status_through_history() {
        let mut task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        let update = UpdateTaskRequest {
            title: Some("Relaunch".into()),
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        task.apply_update(update, "bob", Utc::now()).unwrap();
        assert_eq!(task.title, "Relaunch");
        assert_eq!(task.status_history.len(), 2);
        assert_eq!(task.status_history[1].updated_by, "bob");
    }

    #[test]
    fn stage_summaries_are_sorted_by_name() {
        let task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        let names: Vec<_> = task.stage_summaries().into_iter().map(|s| s.stage_name).collect();
        assert_eq!(names, vec!["Deployment", "Development", "Planning", "Review", "Testing"]);
    }

    #[test]
    fn stage_content_requires_a_known_stage() {
        let mut task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        assert!(task.set_stage_content("Nope", "x".into()).is_err());
        task.set_stage_content("Review", "<p>LGTM</p>".into()).unwrap();
        assert_eq!(task.stage("Review").unwrap().content, "<p>LGTM</p>");
    }

    #[test]
    fn serialises_with_camel_case_wire_names() {
        let task = Task::new(request("Launch"), "alice", Utc::now()).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["currentStage"], "Planning");
        assert_eq!(json["statusHistory"][0]["status"], "created");
        assert_eq!(json["stages"][0]["isCompleted"], false);
    }
}
