//! Typed operations over the remote collections. Each helper binds the row
//! query builder to one query the application issues, scoped to the
//! authenticated owner.

use crate::datastore::AuthSession;
use crate::remote::{Remote, RemoteError};

pub mod tasks {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use super::{AuthSession, Remote, RemoteError};
    use crate::model::{NewTask, Task, TaskPatch};

    pub const TABLE: &str = "tasks";

    pub fn fetch_all(remote: &Remote, session: &AuthSession) -> Result<Vec<Task>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .order("deadline", false)
            .fetch()
    }

    /// Tasks whose deadline falls in `[from, to)`.
    pub fn fetch_deadline_window(
        remote: &Remote,
        session: &AuthSession,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .gte("deadline", from.to_rfc3339())
            .lt("deadline", to.to_rfc3339())
            .fetch()
    }

    /// Tasks created at or after `from`.
    pub fn fetch_created_since(
        remote: &Remote,
        session: &AuthSession,
        from: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .gte("created_at", from.to_rfc3339())
            .fetch()
    }

    pub fn insert(
        remote: &Remote,
        session: &AuthSession,
        new_task: &NewTask,
    ) -> Result<Task, RemoteError> {
        remote.rows(&session.access_token, TABLE).insert(new_task)
    }

    pub fn update(
        remote: &Remote,
        session: &AuthSession,
        id: Uuid,
        patch: &TaskPatch,
    ) -> Result<(), RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .eq("id", id)
            .eq_owner(session.user_id)
            .update(patch)
    }

    pub fn set_completed(
        remote: &Remote,
        session: &AuthSession,
        id: Uuid,
        completed: bool,
    ) -> Result<(), RemoteError> {
        let patch = TaskPatch {
            completed: Some(completed),
            ..TaskPatch::default()
        };
        update(remote, session, id, &patch)
    }

    pub fn delete(remote: &Remote, session: &AuthSession, id: Uuid) -> Result<(), RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .eq("id", id)
            .eq_owner(session.user_id)
            .delete()
    }

    /// Bulk removal of every completed task owned by the user.
    pub fn delete_completed(remote: &Remote, session: &AuthSession) -> Result<(), RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .eq_owner(session.user_id)
            .eq("completed", true)
            .delete()
    }
}

pub mod categories {
    use tracing::info;
    use uuid::Uuid;

    use super::{AuthSession, Remote, RemoteError};
    use crate::model::{Category, DEFAULT_CATEGORY_COLOR, NewCategory};

    pub const TABLE: &str = "task_categories";

    pub fn fetch_all(
        remote: &Remote,
        session: &AuthSession,
    ) -> Result<Vec<Category>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .order("created_at", true)
            .fetch()
    }

    pub fn insert(
        remote: &Remote,
        session: &AuthSession,
        name: &str,
        color: Option<&str>,
    ) -> Result<Category, RemoteError> {
        let new_category = NewCategory {
            user_id: session.user_id,
            name: name.to_string(),
            color: color.unwrap_or(DEFAULT_CATEGORY_COLOR).to_string(),
        };
        remote
            .rows(&session.access_token, TABLE)
            .insert(&new_category)
    }

    /// Insert, treating a uniqueness conflict as "already exists": re-fetch
    /// the user's categories and select the match instead of failing.
    pub fn insert_or_existing(
        remote: &Remote,
        session: &AuthSession,
        name: &str,
        color: Option<&str>,
    ) -> Result<Category, RemoteError> {
        match insert(remote, session, name, color) {
            Ok(created) => Ok(created),
            Err(RemoteError::Conflict(_)) => {
                info!(name, "category already exists remotely; selecting it");
                let needle = name.trim().to_lowercase();
                fetch_all(remote, session)?
                    .into_iter()
                    .find(|cat| cat.name.to_lowercase() == needle)
                    .ok_or(RemoteError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    pub fn delete(remote: &Remote, session: &AuthSession, id: Uuid) -> Result<(), RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .eq("id", id)
            .eq_owner(session.user_id)
            .delete()
    }
}

pub mod focus_sessions {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use super::{AuthSession, Remote, RemoteError};
    use crate::model::{FocusSession, NewFocusSession};

    pub const TABLE: &str = "focus_sessions";

    pub fn fetch_all(
        remote: &Remote,
        session: &AuthSession,
    ) -> Result<Vec<FocusSession>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .order("started_at", false)
            .fetch()
    }

    pub fn fetch_recent(
        remote: &Remote,
        session: &AuthSession,
        limit: usize,
    ) -> Result<Vec<FocusSession>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .order("started_at", false)
            .limit(limit)
            .fetch()
    }

    /// Sessions started in `[from, to)`.
    pub fn fetch_started_window(
        remote: &Remote,
        session: &AuthSession,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FocusSession>, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .gte("started_at", from.to_rfc3339())
            .lt("started_at", to.to_rfc3339())
            .fetch()
    }

    pub fn insert(
        remote: &Remote,
        session: &AuthSession,
        new_session: &NewFocusSession,
    ) -> Result<FocusSession, RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .insert(new_session)
    }

    pub fn delete(remote: &Remote, session: &AuthSession, id: Uuid) -> Result<(), RemoteError> {
        remote
            .rows(&session.access_token, TABLE)
            .eq("id", id)
            .eq_owner(session.user_id)
            .delete()
    }
}

pub mod prefs {
    use tracing::info;

    use super::{AuthSession, Remote, RemoteError};
    use crate::model::{PrefToggle, Preferences};

    pub const TABLE: &str = "user_preferences";

    /// Fetch the per-user singleton, inserting defaults on first read.
    pub fn fetch_or_init(
        remote: &Remote,
        session: &AuthSession,
    ) -> Result<Preferences, RemoteError> {
        match remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .fetch_one::<Preferences>()
        {
            Ok(prefs) => Ok(prefs),
            Err(RemoteError::NotFound) => {
                info!("no preferences row yet; inserting defaults");
                let defaults = Preferences::defaults(session.user_id);
                remote.rows(&session.access_token, TABLE).insert(&defaults)
            }
            Err(err) => Err(err),
        }
    }

    pub fn update_toggle(
        remote: &Remote,
        session: &AuthSession,
        toggle: PrefToggle,
        value: bool,
    ) -> Result<(), RemoteError> {
        let mut patch = serde_json::Map::new();
        patch.insert(toggle.column().to_string(), serde_json::Value::Bool(value));
        remote
            .rows(&session.access_token, TABLE)
            .eq_owner(session.user_id)
            .update(&patch)
    }
}

pub mod profiles {
    use super::{AuthSession, Remote, RemoteError};
    use crate::model::Profile;

    pub const TABLE: &str = "profiles";

    pub fn fetch(remote: &Remote, session: &AuthSession) -> Result<Option<Profile>, RemoteError> {
        match remote
            .rows(&session.access_token, TABLE)
            .select("*")
            .eq_owner(session.user_id)
            .fetch_one::<Profile>()
        {
            Ok(profile) => Ok(Some(profile)),
            Err(RemoteError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn insert(
        remote: &Remote,
        session: &AuthSession,
        profile: &Profile,
    ) -> Result<Profile, RemoteError> {
        remote.rows(&session.access_token, TABLE).insert(profile)
    }
}
