use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::model::{Preferences, Task, completion_order};
use crate::reconcile::{Applied, Merge, Record, settle};
use crate::remote::RemoteError;

impl Record for Task {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn set_record_id(&mut self, id: Uuid) {
        self.id = id;
    }
}

/// Fields captured from the user when creating a task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
}

/// Fields a task edit may change. `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub category_id: Option<Option<Uuid>>,
}

/// The local task list. Every mutation is staged here synchronously before
/// the remote write is issued, and settled through the reconciler once the
/// write resolves.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new(mut tasks: Vec<Task>) -> Self {
        tasks.sort_by(completion_order);
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Rows the list view shows under the given preferences.
    pub fn visible<'a>(&'a self, prefs: &'a Preferences) -> impl Iterator<Item = &'a Task> {
        self.tasks
            .iter()
            .filter(move |task| prefs.show_completed_tasks || !task.completed)
    }

    /// Resolve a unique id prefix typed by the user.
    pub fn find_by_prefix(&self, prefix: &str) -> anyhow::Result<&Task> {
        let needle = prefix.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(anyhow!("empty task id"));
        }

        let mut matches = self
            .tasks
            .iter()
            .filter(|task| task.id.to_string().starts_with(&needle));

        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no task matches id {prefix}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("task id {prefix} is ambiguous; give more characters"));
        }
        Ok(first)
    }

    /// Stage a new task under a temporary client id. The list reflects the
    /// task immediately; the caller issues the remote insert and settles.
    #[instrument(skip(self, draft))]
    pub fn stage_add(
        &mut self,
        draft: &TaskDraft,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> (Uuid, Applied<Task>) {
        let temp_id = Uuid::new_v4();
        let task = Task {
            id: temp_id,
            user_id,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            completed: false,
            deadline: draft.deadline,
            category_id: draft.category_id,
            created_at: now,
        };

        self.tasks.push(task);
        self.sort();
        debug!(%temp_id, "staged task add");
        (temp_id, Applied::Inserted { temp_id })
    }

    /// Flip the completion flag and re-sort so incomplete tasks precede
    /// completed ones.
    #[instrument(skip(self))]
    pub fn stage_toggle(&mut self, id: Uuid) -> Option<(bool, Applied<Task>)> {
        let position = self.tasks.iter().position(|task| task.id == id)?;
        let previous = self.tasks[position].clone();
        let now_completed = !previous.completed;
        self.tasks[position].completed = now_completed;
        self.sort();
        debug!(%id, now_completed, "staged completion toggle");
        Some((now_completed, Applied::Updated { id, previous }))
    }

    #[instrument(skip(self, edit))]
    pub fn stage_edit(&mut self, id: Uuid, edit: &TaskEdit) -> Option<Applied<Task>> {
        let position = self.tasks.iter().position(|task| task.id == id)?;
        let previous = self.tasks[position].clone();

        let task = &mut self.tasks[position];
        if let Some(title) = &edit.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = &edit.description {
            task.description = description.trim().to_string();
        }
        if let Some(deadline) = edit.deadline {
            task.deadline = deadline;
        }
        if let Some(category_id) = edit.category_id {
            task.category_id = category_id;
        }

        debug!(%id, "staged task edit");
        Some(Applied::Updated { id, previous })
    }

    #[instrument(skip(self))]
    pub fn stage_delete(&mut self, id: Uuid) -> Option<Applied<Task>> {
        let position = self.tasks.iter().position(|task| task.id == id)?;
        let removed = self.tasks.remove(position);
        debug!(%id, "staged task delete");
        Some(Applied::Removed {
            previous: vec![removed],
        })
    }

    /// Remove every completed task in one staged step.
    #[instrument(skip(self))]
    pub fn stage_delete_completed(&mut self) -> Applied<Task> {
        let mut removed = Vec::new();
        self.tasks.retain(|task| {
            if task.completed {
                removed.push(task.clone());
                false
            } else {
                true
            }
        });
        debug!(count = removed.len(), "staged delete of completed tasks");
        Applied::Removed { previous: removed }
    }

    /// Settle a staged mutation against the remote outcome, then restore
    /// the canonical ordering.
    pub fn settle(
        &mut self,
        applied: Applied<Task>,
        outcome: Result<Merge<Task>, RemoteError>,
    ) -> Result<(), RemoteError> {
        let result = settle(&mut self.tasks, applied, outcome);
        self.sort();
        result
    }

    fn sort(&mut self) {
        self.tasks.sort_by(completion_order);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{TaskBoard, TaskDraft, TaskEdit};
    use crate::model::{Preferences, Task};
    use crate::reconcile::Merge;
    use crate::remote::RemoteError;

    fn base_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn seeded_task(title: &str, completed: bool, offset_secs: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: title.to_string(),
            description: String::new(),
            completed,
            deadline: None,
            category_id: None,
            created_at: base_now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn toggle_moves_completed_tasks_below_incomplete_ones() {
        let a = seeded_task("a", false, 0);
        let b = seeded_task("b", false, 10);
        let c = seeded_task("c", false, 20);
        let b_id = b.id;

        let mut board = TaskBoard::new(vec![a, b, c]);
        let (now_completed, applied) = board.stage_toggle(b_id).expect("task exists");
        assert!(now_completed);

        let titles: Vec<&str> = board.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "b"]);

        board
            .settle(applied, Ok(Merge::Acknowledged))
            .expect("settle succeeds");
        let titles: Vec<&str> = board.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "b"]);
    }

    #[test]
    fn add_is_visible_immediately_and_reconciles_the_server_id() {
        let mut board = TaskBoard::new(vec![]);
        let draft = TaskDraft {
            title: "Buy milk".to_string(),
            ..TaskDraft::default()
        };

        let (temp_id, applied) = board.stage_add(&draft, Uuid::nil(), base_now());
        assert_eq!(board.len(), 1);
        assert_eq!(board.tasks()[0].id, temp_id);
        assert_eq!(board.tasks()[0].title, "Buy milk");
        assert!(!board.tasks()[0].completed);

        let server_id = Uuid::new_v4();
        board
            .settle(applied, Ok(Merge::AssignedId(server_id)))
            .expect("settle succeeds");

        assert_eq!(board.len(), 1);
        assert_eq!(board.tasks()[0].id, server_id);
        assert_eq!(board.tasks()[0].title, "Buy milk");
        assert!(!board.tasks()[0].completed);
    }

    #[test]
    fn failed_add_rolls_the_row_back_out() {
        let mut board = TaskBoard::new(vec![seeded_task("kept", false, 0)]);
        let draft = TaskDraft {
            title: "doomed".to_string(),
            ..TaskDraft::default()
        };

        let (_, applied) = board.stage_add(&draft, Uuid::nil(), base_now());
        assert_eq!(board.len(), 2);

        board
            .settle(
                applied,
                Err(RemoteError::Status {
                    status: 503,
                    body: String::new(),
                }),
            )
            .expect_err("settle reports the failure");

        assert_eq!(board.len(), 1);
        assert_eq!(board.tasks()[0].title, "kept");
    }

    #[test]
    fn toggle_then_delete_ends_absent_whichever_write_settles_first() {
        for toggle_settles_first in [true, false] {
            let task = seeded_task("racy", false, 0);
            let id = task.id;
            let mut board = TaskBoard::new(vec![task]);

            let (_, toggle_applied) = board.stage_toggle(id).expect("task exists");
            let delete_applied = board.stage_delete(id).expect("task exists");
            assert!(board.is_empty());

            let toggle_outcome: Result<_, RemoteError> = Ok(Merge::Acknowledged);
            let delete_outcome: Result<_, RemoteError> = Ok(Merge::Acknowledged);

            if toggle_settles_first {
                board.settle(toggle_applied, toggle_outcome).expect("toggle ok");
                board.settle(delete_applied, delete_outcome).expect("delete ok");
            } else {
                board.settle(delete_applied, delete_outcome).expect("delete ok");
                board.settle(toggle_applied, toggle_outcome).expect("toggle ok");
            }

            assert!(board.is_empty(), "task must stay absent");
        }
    }

    #[test]
    fn toggle_failure_after_delete_does_not_resurrect_the_task() {
        let task = seeded_task("racy", false, 0);
        let id = task.id;
        let mut board = TaskBoard::new(vec![task]);

        let (_, toggle_applied) = board.stage_toggle(id).expect("task exists");
        let delete_applied = board.stage_delete(id).expect("task exists");

        board
            .settle(delete_applied, Ok(Merge::Acknowledged))
            .expect("delete ok");
        board
            .settle(
                toggle_applied,
                Err(RemoteError::NotFound),
            )
            .expect_err("toggle failed against the missing row");

        assert!(board.is_empty());
    }

    #[test]
    fn visibility_respects_the_completed_toggle() {
        let open = seeded_task("open", false, 0);
        let done = seeded_task("done", true, 10);
        let board = TaskBoard::new(vec![open, done]);

        let mut prefs = Preferences::defaults(Uuid::nil());
        assert_eq!(board.visible(&prefs).count(), 2);

        prefs.show_completed_tasks = false;
        let titles: Vec<&str> = board.visible(&prefs).map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["open"]);
    }

    #[test]
    fn edit_stages_field_changes_and_clears_optionals() {
        let mut task = seeded_task("before", false, 0);
        task.deadline = Some(base_now());
        let id = task.id;
        let mut board = TaskBoard::new(vec![task]);

        let edit = TaskEdit {
            title: Some("after".to_string()),
            deadline: Some(None),
            ..TaskEdit::default()
        };
        let applied = board.stage_edit(id, &edit).expect("task exists");

        assert_eq!(board.tasks()[0].title, "after");
        assert!(board.tasks()[0].deadline.is_none());

        board
            .settle(
                applied,
                Err(RemoteError::Status {
                    status: 500,
                    body: String::new(),
                }),
            )
            .expect_err("settle reports the failure");

        assert_eq!(board.tasks()[0].title, "before");
        assert!(board.tasks()[0].deadline.is_some());
    }

    #[test]
    fn prefix_lookup_requires_uniqueness() {
        let a = seeded_task("a", false, 0);
        let b = seeded_task("b", false, 10);
        let full = a.id.to_string();
        let board = TaskBoard::new(vec![a, b]);

        let found = board.find_by_prefix(&full[..8]).expect("unique prefix");
        assert_eq!(found.title, "a");
        assert!(board.find_by_prefix("").is_err());
    }
}
