use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;
use tempo_core::board::{TaskBoard, TaskDraft};
use tempo_core::datastore::{ActiveFocus, AuthSession, StateDir};
use tempo_core::model::Task;
use tempo_core::reconcile::Merge;
use tempo_core::remote::RemoteError;
use uuid::Uuid;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
        .single()
        .expect("valid now")
}

#[test]
fn state_dir_round_trips_session_and_focus_marker() {
    let temp = tempdir().expect("tempdir");
    let state = StateDir::open(temp.path()).expect("open state dir");

    assert!(state.load_session().expect("load").is_none());

    let session = AuthSession {
        access_token: "token".to_string(),
        refresh_token: Some("refresh".to_string()),
        user_id: Uuid::new_v4(),
        email: "dev@example.com".to_string(),
    };
    state.save_session(&session).expect("save session");
    assert_eq!(state.load_session().expect("load"), Some(session));

    let focus = ActiveFocus {
        name: "Deep work".to_string(),
        category_id: None,
        started_at: now(),
    };
    state.save_active_focus(&focus).expect("save focus");
    assert_eq!(state.load_active_focus().expect("load"), Some(focus));

    state.clear_active_focus().expect("clear focus");
    assert!(state.load_active_focus().expect("load").is_none());

    state.clear_session().expect("clear session");
    assert!(state.load_session().expect("load").is_none());
}

#[test]
fn created_task_appears_immediately_then_takes_the_server_id() {
    let user_id = Uuid::new_v4();
    let mut board = TaskBoard::new(vec![]);

    let draft = TaskDraft {
        title: "Buy milk".to_string(),
        ..TaskDraft::default()
    };
    let (temp_id, applied) = board.stage_add(&draft, user_id, now());

    // Visible immediately under the temporary identifier.
    let staged = board.get(temp_id).expect("staged task visible");
    assert_eq!(staged.title, "Buy milk");
    assert!(!staged.completed);
    assert!(staged.deadline.is_none());
    assert!(staged.category_id.is_none());

    // The remote insert returns the authoritative row.
    let server_row = Task {
        id: Uuid::new_v4(),
        user_id,
        title: "Buy milk".to_string(),
        description: String::new(),
        completed: false,
        deadline: None,
        category_id: None,
        created_at: now(),
    };
    let server_id = server_row.id;
    board
        .settle(applied, Ok(Merge::Row(server_row)))
        .expect("settle succeeds");

    assert!(board.get(temp_id).is_none());
    let reconciled = board.get(server_id).expect("server id present");
    assert_eq!(reconciled.title, "Buy milk");
    assert!(!reconciled.completed);
}

#[test]
fn toggle_then_delete_settles_to_absent_in_either_order() {
    let user_id = Uuid::new_v4();
    let seeded = Task {
        id: Uuid::new_v4(),
        user_id,
        title: "racy".to_string(),
        description: String::new(),
        completed: false,
        deadline: None,
        category_id: None,
        created_at: now() - Duration::hours(1),
    };
    let id = seeded.id;

    let orders: [(bool, Result<Merge<Task>, RemoteError>); 3] = [
        (true, Ok(Merge::Acknowledged)),
        (false, Ok(Merge::Acknowledged)),
        // The toggle may even fail against the already-deleted row.
        (false, Err(RemoteError::NotFound)),
    ];

    for (toggle_first, toggle_outcome) in orders {
        let mut board = TaskBoard::new(vec![seeded.clone()]);

        let (_, toggle_applied) = board.stage_toggle(id).expect("stage toggle");
        let delete_applied = board.stage_delete(id).expect("stage delete");
        assert!(board.is_empty(), "optimistic delete hides the task");

        if toggle_first {
            let _ = board.settle(toggle_applied, toggle_outcome);
            board
                .settle(delete_applied, Ok(Merge::Acknowledged))
                .expect("delete settles");
        } else {
            board
                .settle(delete_applied, Ok(Merge::Acknowledged))
                .expect("delete settles");
            let _ = board.settle(toggle_applied, toggle_outcome);
        }

        assert!(board.is_empty(), "final state must be task absent");
    }
}
