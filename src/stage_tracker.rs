//! Stage progression for a task's linear pipeline.
//!
//! Completion is a trailing marker derived from the current-stage pointer:
//! moving forward completes everything passed through, moving back reopens
//! everything beyond the new position. The target stage itself never flips
//! on a move; the two ends of the pipeline are settled explicitly with
//! `isLastStage` / `isFirstStage` when re-selecting the current stage.

use serde::Deserialize;

use crate::error::AppError;
use crate::models::task::Task;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMove {
    pub stage: String,
    #[serde(default)]
    pub is_last_stage: bool,
    #[serde(default)]
    pub is_first_stage: bool,
}

#[cfg(test)]
impl StageMove {
    pub fn to(stage: impl Into<String>) -> Self {
        Self { stage: stage.into(), ..Default::default() }
    }
}

/// Completion flag changes for one move, as stage indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub from: usize,
    pub target: usize,
    pub complete: Vec<usize>,
    pub reopen: Vec<usize>,
}

impl StagePlan {
    pub fn is_noop(&self) -> bool {
        self.complete.is_empty() && self.reopen.is_empty()
    }
}

pub fn plan_move(task: &Task, mv: &StageMove) -> Result<StagePlan, AppError> {
    let target = task
        .stage_index(&mv.stage)
        .ok_or_else(|| AppError::validation("Invalid stage"))?;
    let from = task.stage_index(&task.current_stage).ok_or_else(|| {
        AppError::Internal(format!(
            "task {} points at unknown stage {}",
            task.id, task.current_stage
        ))
    })?;

    let mut plan = StagePlan { from, target, complete: Vec::new(), reopen: Vec::new() };
    if target > from {
        plan.complete = (0..target).collect();
    } else if target < from {
        plan.reopen = (target + 1..task.stages.len()).collect();
    } else if mv.is_last_stage {
        plan.complete = vec![target];
    } else if mv.is_first_stage {
        plan.reopen = vec![target];
    }
    Ok(plan)
}

impl Task {
    /// Moves the current-stage pointer, updating completion flags. Nothing is
    /// mutated when the target stage is unknown.
    pub fn move_to_stage(&mut self, mv: &StageMove) -> Result<StagePlan, AppError> {
        let plan = plan_move(self, mv)?;
        for &i in &plan.complete {
            self.stages[i].is_completed = true;
        }
        for &i in &plan.reopen {
            self.stages[i].is_completed = false;
        }
        self.current_stage = self.stages[plan.target].name.clone();
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::tests::request;
    use chrono::Utc;

    const DEFAULT: [&str; 5] = crate::models::task::DEFAULT_STAGES;

    fn task_at(stage: &str) -> Task {
        let mut req = request("Pipeline");
        req.current_stage = Some(stage.to_string());
        Task::new(req, "alice", Utc::now()).unwrap()
    }

    fn flags(task: &Task) -> Vec<bool> {
        task.stages.iter().map(|s| s.is_completed).collect()
    }

    fn set_flags(task: &mut Task, values: [bool; 5]) {
        for (stage, v) in task.stages.iter_mut().zip(values) {
            stage.is_completed = v;
        }
    }

    #[test]
    fn forward_move_completes_everything_before_target() {
        let mut task = task_at("Planning");
        task.move_to_stage(&StageMove::to("Testing")).unwrap();
        assert_eq!(flags(&task), vec![true, true, true, false, false]);
        assert_eq!(task.current_stage, "Testing");
    }

    #[test]
    fn forward_move_leaves_target_and_later_stages_alone() {
        let mut task = task_at("Development");
        set_flags(&mut task, [false, false, false, true, true]);
        task.move_to_stage(&StageMove::to("Review")).unwrap();
        assert_eq!(flags(&task), vec![true, true, false, true, true]);
    }

    #[test]
    fn backward_move_reopens_everything_after_target() {
        let mut task = task_at("Testing");
        set_flags(&mut task, [true, true, true, true, true]);
        task.move_to_stage(&StageMove::to("Development")).unwrap();
        assert_eq!(flags(&task), vec![true, true, false, false, false]);
        assert_eq!(task.current_stage, "Development");
    }

    #[test]
    fn backward_move_leaves_target_and_earlier_stages_alone() {
        let mut task = task_at("Deployment");
        set_flags(&mut task, [false, true, true, true, true]);
        task.move_to_stage(&StageMove::to("Review")).unwrap();
        assert_eq!(flags(&task), vec![false, true, true, false, false]);
    }

    #[test]
    fn reselecting_last_stage_with_hint_completes_it() {
        let mut task = task_at("Deployment");
        set_flags(&mut task, [true, true, true, true, false]);
        let mv = StageMove { is_last_stage: true, ..StageMove::to("Deployment") };
        task.move_to_stage(&mv).unwrap();
        assert_eq!(flags(&task), vec![true, true, true, true, true]);
        assert_eq!(task.current_stage, "Deployment");
    }

    #[test]
    fn reselecting_first_stage_with_hint_reopens_it() {
        let mut task = task_at("Planning");
        set_flags(&mut task, [true, false, true, false, false]);
        let mv = StageMove { is_first_stage: true, ..StageMove::to("Planning") };
        task.move_to_stage(&mv).unwrap();
        assert_eq!(flags(&task), vec![false, false, true, false, false]);
    }

    #[test]
    fn last_stage_hint_wins_when_both_hints_are_set() {
        let mut task = task_at("Review");
        let mv = StageMove { is_last_stage: true, is_first_stage: true, ..StageMove::to("Review") };
        let plan = task.move_to_stage(&mv).unwrap();
        assert_eq!(plan.complete, vec![2]);
        assert!(plan.reopen.is_empty());
    }

    #[test]
    fn reselecting_without_hints_changes_nothing() {
        let mut task = task_at("Review");
        set_flags(&mut task, [true, false, true, false, true]);
        let plan = task.move_to_stage(&StageMove::to("Review")).unwrap();
        assert!(plan.is_noop());
        assert_eq!(flags(&task), vec![true, false, true, false, true]);
        assert_eq!(task.current_stage, "Review");
    }

    #[test]
    fn hints_are_ignored_on_real_moves() {
        let mut task = task_at("Planning");
        let mv = StageMove { is_last_stage: true, ..StageMove::to("Deployment") };
        task.move_to_stage(&mv).unwrap();
        assert_eq!(flags(&task), vec![true, true, true, true, false]);
    }

    #[test]
    fn unknown_stage_fails_without_mutation() {
        let mut task = task_at("Review");
        set_flags(&mut task, [true, true, false, false, false]);
        let err = task.move_to_stage(&StageMove::to("Shipping")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(flags(&task), vec![true, true, false, false, false]);
        assert_eq!(task.current_stage, "Review");
    }

    #[test]
    fn repeated_forward_move_is_idempotent() {
        let mut once = task_at("Planning");
        once.move_to_stage(&StageMove::to("Review")).unwrap();

        let mut twice = task_at("Planning");
        twice.move_to_stage(&StageMove::to("Review")).unwrap();
        twice.move_to_stage(&StageMove::to("Review")).unwrap();

        assert_eq!(flags(&once), flags(&twice));
        assert_eq!(once.current_stage, twice.current_stage);
    }

    #[test]
    fn forward_and_backward_hold_for_every_pair() {
        for k in 0..5 {
            for j in 0..5 {
                let mut task = task_at(DEFAULT[k]);
                set_flags(&mut task, [true, false, true, false, true]);
                let before = flags(&task);
                task.move_to_stage(&StageMove::to(DEFAULT[j])).unwrap();
                let after = flags(&task);
                if j > k {
                    assert!(after[..j].iter().all(|&f| f));
                    assert_eq!(after[j..], before[j..]);
                } else if j < k {
                    assert_eq!(after[..=j], before[..=j]);
                    assert!(after[j + 1..].iter().all(|&f| !f));
                } else {
                    assert_eq!(after, before);
                }
                assert_eq!(task.current_stage, DEFAULT[j]);
            }
        }
    }

    #[test]
    fn move_request_parses_camel_case_hints() {
        let mv: StageMove =
            serde_json::from_str(r#"{"stage":"Deployment","isLastStage":true}"#).unwrap();
        assert!(mv.is_last_stage);
        assert!(!mv.is_first_stage);
    }
}
