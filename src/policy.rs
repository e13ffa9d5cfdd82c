//! Role-based authorization.
//!
//! Every guarded operation is an [`Action`]. The policy table in
//! [`Action::rule`] is the only place that says who may perform it; handlers
//! call [`authorize`] or [`authorize_owned`] once, with the caller's identity
//! passed in explicitly.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Capability order is declaration order: `Admin` can do anything a
/// `TeamLeader` can, which can do anything a `User` can.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    TeamLeader,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateTask,
    /// Update fields, move stages, read and write stage content.
    WorkOnTask,
    DeleteTask,
    DeleteIdea,
    CreateResource,
    ModifyResource,
    ManageProjects,
    ManageGroupMembers,
    ManageMusic,
    ManageUsers,
}

/// One row of the policy table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Nobody below this role may perform the action, owner or not.
    pub floor: Role,
    /// At or above this role the action is allowed on anything.
    pub elevated: Role,
    /// Whether owning the target entity is enough between `floor` and `elevated`.
    pub owner_allowed: bool,
}

impl Action {
    pub fn rule(self) -> Rule {
        use Role::*;
        let (floor, elevated, owner_allowed) = match self {
            Action::CreateTask => (TeamLeader, TeamLeader, false),
            Action::WorkOnTask => (User, TeamLeader, true),
            Action::DeleteTask => (TeamLeader, Admin, true),
            Action::DeleteIdea => (User, TeamLeader, true),
            Action::CreateResource => (TeamLeader, TeamLeader, false),
            Action::ModifyResource => (User, TeamLeader, true),
            Action::ManageProjects => (TeamLeader, TeamLeader, false),
            Action::ManageGroupMembers => (User, Admin, true),
            Action::ManageMusic => (Admin, Admin, false),
            Action::ManageUsers => (Admin, Admin, false),
        };
        Rule { floor, elevated, owner_allowed }
    }

    fn describe(self) -> &'static str {
        match self {
            Action::CreateTask => "create tasks",
            Action::WorkOnTask => "work on this task",
            Action::DeleteTask => "delete this task",
            Action::DeleteIdea => "delete this idea",
            Action::CreateResource => "create resources",
            Action::ModifyResource => "modify this resource",
            Action::ManageProjects => "manage projects",
            Action::ManageGroupMembers => "manage members of this group",
            Action::ManageMusic => "manage music",
            Action::ManageUsers => "manage users",
        }
    }
}

pub fn is_allowed(role: Role, action: Action, is_owner: bool) -> bool {
    let rule = action.rule();
    role >= rule.floor && (role >= rule.elevated || (rule.owner_allowed && is_owner))
}

/// Check an action that does not depend on ownership of a particular entity.
pub fn authorize(role: Role, action: Action) -> Result<(), AppError> {
    authorize_owned(role, action, false)
}

pub fn authorize_owned(role: Role, action: Action, is_owner: bool) -> Result<(), AppError> {
    if is_allowed(role, action, is_owner) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Not authorized to {}", action.describe())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_capability() {
        assert!(Role::Admin > Role::TeamLeader);
        assert!(Role::TeamLeader > Role::User);
    }

    #[test]
    fn roles_use_kebab_case_wire_names() {
        assert_eq!(serde_json::to_string(&Role::TeamLeader).unwrap(), "\"team-leader\"");
        let parsed: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, Role::Admin);
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
    }

    #[test]
    fn only_elevated_roles_create_tasks() {
        assert!(authorize(Role::User, Action::CreateTask).is_err());
        assert!(authorize(Role::TeamLeader, Action::CreateTask).is_ok());
        assert!(authorize(Role::Admin, Action::CreateTask).is_ok());
    }

    #[test]
    fn owners_may_delete_their_ideas() {
        assert!(authorize_owned(Role::User, Action::DeleteIdea, true).is_ok());
        assert!(authorize_owned(Role::User, Action::DeleteIdea, false).is_err());
        assert!(authorize_owned(Role::TeamLeader, Action::DeleteIdea, false).is_ok());
    }

    #[test]
    fn task_deletion_needs_team_leader_and_ownership_unless_admin() {
        assert!(!is_allowed(Role::User, Action::DeleteTask, true));
        assert!(is_allowed(Role::TeamLeader, Action::DeleteTask, true));
        assert!(!is_allowed(Role::TeamLeader, Action::DeleteTask, false));
        assert!(is_allowed(Role::Admin, Action::DeleteTask, false));
    }

    #[test]
    fn user_management_is_admin_only() {
        assert!(authorize(Role::TeamLeader, Action::ManageUsers).is_err());
        assert!(authorize(Role::Admin, Action::ManageUsers).is_ok());
    }

    #[test]
    fn rejection_is_a_forbidden_error() {
        let err = authorize(Role::User, Action::ManageMusic).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
