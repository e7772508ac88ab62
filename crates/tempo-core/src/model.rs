use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CATEGORY_COLOR: &str = "#d1d5db";
pub const DEFAULT_SESSION_NAME: &str = "New Focus Session";
pub const DEFAULT_AVATAR_URL: &str = "https://www.gravatar.com/avatar?d=mp";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub completed: bool,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// A deadline equal to `now` is not yet overdue; the boundary is strict.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }
}

/// Canonical list ordering: incomplete tasks first, ties by ascending
/// creation time.
pub fn completion_order(a: &Task, b: &Task) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Insert payload for `tasks`; the server assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
}

/// Partial update for `tasks`. Outer `None` means "leave untouched"; inner
/// `None` serializes as an explicit null so the column is cleared.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<Uuid>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.deadline.is_none()
            && self.category_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FocusSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewFocusSession {
    pub user_id: Uuid,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl NewFocusSession {
    /// Blank names fall back to the default session name.
    pub fn named(
        user_id: Uuid,
        name: &str,
        category_id: Option<Uuid>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let trimmed = name.trim();
        Self {
            user_id,
            name: if trimmed.is_empty() {
                DEFAULT_SESSION_NAME.to_string()
            } else {
                trimmed.to_string()
            },
            category_id,
            started_at,
            ended_at,
        }
    }
}

/// Per-user singleton of display toggles, created lazily on first read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    pub user_id: Uuid,
    pub show_completed_tasks: bool,
    pub show_descriptions: bool,
    pub show_categories: bool,
}

impl Preferences {
    pub fn defaults(user_id: Uuid) -> Self {
        Self {
            user_id,
            show_completed_tasks: true,
            show_descriptions: true,
            show_categories: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefToggle {
    ShowCompletedTasks,
    ShowDescriptions,
    ShowCategories,
}

impl PrefToggle {
    pub fn column(self) -> &'static str {
        match self {
            Self::ShowCompletedTasks => "show_completed_tasks",
            Self::ShowDescriptions => "show_descriptions",
            Self::ShowCategories => "show_categories",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().replace('-', "_").as_str() {
            "show_completed_tasks" | "completed" => Some(Self::ShowCompletedTasks),
            "show_descriptions" | "descriptions" => Some(Self::ShowDescriptions),
            "show_categories" | "categories" => Some(Self::ShowCategories),
            _ => None,
        }
    }

    pub fn get(self, prefs: &Preferences) -> bool {
        match self {
            Self::ShowCompletedTasks => prefs.show_completed_tasks,
            Self::ShowDescriptions => prefs.show_descriptions,
            Self::ShowCategories => prefs.show_categories,
        }
    }

    pub fn set(self, prefs: &mut Preferences, value: bool) {
        match self {
            Self::ShowCompletedTasks => prefs.show_completed_tasks = value,
            Self::ShowDescriptions => prefs.show_descriptions = value,
            Self::ShowCategories => prefs.show_categories = value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub avatar_url: String,
}

/// The authenticated user as the auth endpoint reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Task, TaskPatch, completion_order};

    fn task(title: &str, completed: bool, created_offset_secs: i64) -> Task {
        let base = Utc
            .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid base time");
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            completed,
            deadline: None,
            category_id: None,
            created_at: base + Duration::seconds(created_offset_secs),
        }
    }

    #[test]
    fn deadline_equal_to_now_is_not_overdue() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut t = task("boundary", false, 0);

        t.deadline = Some(now);
        assert!(!t.is_overdue(now));

        t.deadline = Some(now - Duration::seconds(1));
        assert!(t.is_overdue(now));

        t.deadline = Some(now + Duration::seconds(1));
        assert!(!t.is_overdue(now));

        t.deadline = None;
        assert!(!t.is_overdue(now));
    }

    #[test]
    fn completion_order_puts_incomplete_first_then_oldest() {
        let done_old = task("done old", true, 0);
        let open_new = task("open new", false, 100);
        let open_old = task("open old", false, 10);

        let mut rows = vec![done_old.clone(), open_new.clone(), open_old.clone()];
        rows.sort_by(completion_order);

        assert_eq!(rows[0].title, "open old");
        assert_eq!(rows[1].title, "open new");
        assert_eq!(rows[2].title, "done old");
    }

    #[test]
    fn patch_serializes_explicit_null_for_cleared_columns() {
        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            deadline: Some(None),
            ..TaskPatch::default()
        };

        let value = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(value["title"], "renamed");
        assert!(value["deadline"].is_null());
        assert!(value.get("description").is_none());
        assert!(value.get("category_id").is_none());
    }
}
