use tracing::{debug, warn};
use uuid::Uuid;

use crate::remote::RemoteError;

/// A row type the reconciler can address by identifier.
pub trait Record {
    fn record_id(&self) -> Uuid;
    fn set_record_id(&mut self, id: Uuid);
}

/// What an optimistic step did to the local collection, captured before the
/// remote write is issued. Holds just enough to undo that one step.
#[derive(Debug, Clone)]
pub enum Applied<T> {
    /// A row was added under a temporary client-side identifier.
    Inserted { temp_id: Uuid },
    /// A row was changed in place; `previous` is its pre-change value.
    Updated { id: Uuid, previous: T },
    /// One or more rows were removed.
    Removed { previous: Vec<T> },
}

/// What a settled remote write contributes back to the local collection.
#[derive(Debug, Clone)]
pub enum Merge<T> {
    /// The server assigned this identifier to the inserted row.
    AssignedId(Uuid),
    /// The server returned the authoritative row.
    Row(T),
    /// The write was acknowledged with nothing to merge.
    Acknowledged,
}

/// The single reconciliation routine: every optimistic mutation settles
/// here, merging on success and reverting on failure. Reverts are surgical:
/// a row deleted locally while its write was in flight stays deleted. The
/// error is handed back so the caller can surface it; it is never dropped.
pub fn settle<T: Record + Clone>(
    rows: &mut Vec<T>,
    applied: Applied<T>,
    outcome: Result<Merge<T>, RemoteError>,
) -> Result<(), RemoteError> {
    match outcome {
        Ok(merge) => {
            merge_applied(rows, applied, merge);
            Ok(())
        }
        Err(err) => {
            revert_applied(rows, applied);
            Err(err)
        }
    }
}

fn merge_applied<T: Record + Clone>(rows: &mut Vec<T>, applied: Applied<T>, merge: Merge<T>) {
    match applied {
        Applied::Inserted { temp_id } => {
            let Some(position) = rows.iter().position(|row| row.record_id() == temp_id) else {
                // The row was removed locally before the insert settled;
                // the merge has nothing to attach to.
                warn!(%temp_id, "inserted row vanished before settle; dropping merge");
                return;
            };
            match merge {
                Merge::AssignedId(id) => rows[position].set_record_id(id),
                // Keep the local fields, take the server identity.
                Merge::Row(server) => rows[position].set_record_id(server.record_id()),
                Merge::Acknowledged => {}
            }
            debug!(%temp_id, "reconciled inserted row");
        }
        Applied::Updated { id, previous: _ } => {
            if let Merge::Row(row) = merge {
                if let Some(position) = rows.iter().position(|r| r.record_id() == id) {
                    rows[position] = row;
                }
            }
            debug!(%id, "reconciled updated row");
        }
        Applied::Removed { .. } => {}
    }
}

fn revert_applied<T: Record + Clone>(rows: &mut Vec<T>, applied: Applied<T>) {
    match applied {
        Applied::Inserted { temp_id } => {
            rows.retain(|row| row.record_id() != temp_id);
            warn!(%temp_id, "insert failed; removed optimistic row");
        }
        Applied::Updated { id, previous } => {
            if let Some(position) = rows.iter().position(|row| row.record_id() == id) {
                rows[position] = previous;
                warn!(%id, "update failed; restored previous row");
            } else {
                // Deleted while the update was in flight; stay absent.
                warn!(%id, "update failed for a row no longer present; skipping revert");
            }
        }
        Applied::Removed { previous } => {
            let count = previous.len();
            rows.extend(previous);
            warn!(count, "delete failed; re-inserted removed rows");
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Applied, Merge, Record, settle};
    use crate::remote::RemoteError;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Uuid,
        label: &'static str,
    }

    impl Record for Row {
        fn record_id(&self) -> Uuid {
            self.id
        }

        fn set_record_id(&mut self, id: Uuid) {
            self.id = id;
        }
    }

    fn remote_failure() -> RemoteError {
        RemoteError::Status {
            status: 500,
            body: "boom".to_string(),
        }
    }

    #[test]
    fn insert_success_swaps_temp_id_for_server_id() {
        let temp_id = Uuid::new_v4();
        let server_id = Uuid::new_v4();
        let mut rows = vec![Row { id: temp_id, label: "buy milk" }];

        settle(
            &mut rows,
            Applied::Inserted { temp_id },
            Ok(Merge::AssignedId(server_id)),
        )
        .expect("settle succeeds");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, server_id);
        assert_eq!(rows[0].label, "buy milk");
    }

    #[test]
    fn insert_failure_removes_the_optimistic_row() {
        let temp_id = Uuid::new_v4();
        let mut rows = vec![Row { id: temp_id, label: "doomed" }];

        let err = settle(
            &mut rows,
            Applied::Inserted { temp_id },
            Err(remote_failure()),
        )
        .expect_err("settle reports the failure");

        assert!(matches!(err, RemoteError::Status { status: 500, .. }));
        assert!(rows.is_empty());
    }

    #[test]
    fn update_failure_restores_the_previous_row() {
        let id = Uuid::new_v4();
        let previous = Row { id, label: "before" };
        let mut rows = vec![Row { id, label: "after" }];

        settle(
            &mut rows,
            Applied::Updated {
                id,
                previous: previous.clone(),
            },
            Err(remote_failure()),
        )
        .expect_err("settle reports the failure");

        assert_eq!(rows, vec![previous]);
    }

    #[test]
    fn update_settling_after_local_delete_leaves_row_absent() {
        let id = Uuid::new_v4();
        let previous = Row { id, label: "before" };
        let mut rows: Vec<Row> = vec![];

        // Failure path: the revert must not resurrect the deleted row.
        settle(
            &mut rows,
            Applied::Updated {
                id,
                previous: previous.clone(),
            },
            Err(remote_failure()),
        )
        .expect_err("settle reports the failure");
        assert!(rows.is_empty());

        // Success path: the merge has nowhere to land either.
        settle(
            &mut rows,
            Applied::Updated { id, previous },
            Ok(Merge::Row(Row { id, label: "server" })),
        )
        .expect("settle succeeds");
        assert!(rows.is_empty());
    }

    #[test]
    fn delete_failure_reinserts_removed_rows() {
        let kept = Row { id: Uuid::new_v4(), label: "kept" };
        let removed = Row { id: Uuid::new_v4(), label: "removed" };
        let mut rows = vec![kept.clone()];

        settle(
            &mut rows,
            Applied::Removed {
                previous: vec![removed.clone()],
            },
            Err(remote_failure()),
        )
        .expect_err("settle reports the failure");

        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&kept));
        assert!(rows.contains(&removed));
    }

    #[test]
    fn delete_success_changes_nothing_further() {
        let removed = Row { id: Uuid::new_v4(), label: "gone" };
        let mut rows: Vec<Row> = vec![];

        settle(
            &mut rows,
            Applied::Removed { previous: vec![removed] },
            Ok(Merge::Acknowledged),
        )
        .expect("settle succeeds");

        assert!(rows.is_empty());
    }

    #[test]
    fn insert_merge_after_local_delete_is_dropped() {
        let temp_id = Uuid::new_v4();
        let mut rows: Vec<Row> = vec![];

        settle(
            &mut rows,
            Applied::Inserted { temp_id },
            Ok(Merge::AssignedId(Uuid::new_v4())),
        )
        .expect("settle succeeds");

        assert!(rows.is_empty());
    }
}
