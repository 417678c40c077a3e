use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::thread;
use todo_core::{
    CategoryDraft, EntityRef, RepoError, SqliteTodoStore, Task, TaskDraft, TaskListQuery,
    TaskValidationError, TodoRepository,
};

fn store() -> SqliteTodoStore {
    SqliteTodoStore::open_in_memory().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn full_draft(store: &SqliteTodoStore) -> TaskDraft {
    let category_id = store.create_category(&CategoryDraft::new("Errands")).unwrap();
    TaskDraft {
        description: "Pick up parcel".to_string(),
        details: Some("post office closes at 6".to_string()),
        done: false,
        start_date: Some(date(2024, 3, 2)),
        time: Some(time(17, 15)),
        category_id: Some(category_id),
    }
}

#[test]
fn create_then_get_returns_draft_with_assigned_id() {
    let store = store();
    let draft = full_draft(&store);

    let id = store.create_task(&draft).unwrap();
    let loaded = store.get_task(id).unwrap().unwrap();

    assert_eq!(loaded, Task::from_draft(id, draft));
}

#[test]
fn first_task_gets_id_one_and_ids_increase() {
    let store = store();

    let first = store.create_task(&TaskDraft::new("Buy milk")).unwrap();
    let second = store.create_task(&TaskDraft::new("Walk dog")).unwrap();

    assert_eq!(first, 1);
    assert!(second > first);
}

#[test]
fn blank_description_is_rejected_before_storage() {
    let store = store();

    let err = store.create_task(&TaskDraft::new("  \n")).unwrap_err();
    assert!(matches!(
        err,
        RepoError::TaskValidation(TaskValidationError::EmptyDescription)
    ));
    assert!(err.is_validation());
    assert!(store.list_tasks(&TaskListQuery::default()).unwrap().is_empty());
}

#[test]
fn time_without_date_is_rejected_on_create_and_update() {
    let store = store();

    let mut draft = TaskDraft::new("standup");
    draft.time = Some(time(9, 0));
    let err = store.create_task(&draft).unwrap_err();
    assert!(matches!(
        err,
        RepoError::TaskValidation(TaskValidationError::TimeWithoutDate)
    ));

    let id = store.create_task(&TaskDraft::new("standup")).unwrap();
    let mut task = store.get_task(id).unwrap().unwrap();
    task.time = Some(time(9, 0));
    let err = store.update_task(&task).unwrap_err();
    assert!(matches!(
        err,
        RepoError::TaskValidation(TaskValidationError::TimeWithoutDate)
    ));
    assert!(store.get_task(id).unwrap().unwrap().time.is_none());
}

#[test]
fn update_then_get_returns_exact_record() {
    let store = store();
    let category_id = store.create_category(&CategoryDraft::new("Home")).unwrap();
    let id = store.create_task(&TaskDraft::new("draft")).unwrap();

    let task = Task {
        id,
        description: "Fix the sink".to_string(),
        details: Some("washer is worn".to_string()),
        done: true,
        start_date: Some(date(2024, 1, 10)),
        time: Some(NaiveTime::from_hms_milli_opt(9, 30, 15, 500).unwrap()),
        category_id: Some(category_id),
    };
    store.update_task(&task).unwrap();

    assert_eq!(store.get_task(id).unwrap().unwrap(), task);
}

#[test]
fn update_replaces_every_field() {
    let store = store();
    let draft = full_draft(&store);
    let id = store.create_task(&draft).unwrap();

    let replacement = Task::from_draft(id, TaskDraft::new("Pick up parcel"));
    store.update_task(&replacement).unwrap();

    let loaded = store.get_task(id).unwrap().unwrap();
    assert!(loaded.details.is_none());
    assert!(loaded.start_date.is_none());
    assert!(loaded.time.is_none());
    assert!(loaded.category_id.is_none());
}

#[test]
fn repeated_update_is_idempotent() {
    let store = store();
    let id = store.create_task(&TaskDraft::new("Call mom")).unwrap();
    let mut task = store.get_task(id).unwrap().unwrap();
    task.done = true;
    task.start_date = Some(date(2024, 2, 14));

    store.update_task(&task).unwrap();
    let once = store.list_tasks(&TaskListQuery::default()).unwrap();
    store.update_task(&task).unwrap();
    let twice = store.list_tasks(&TaskListQuery::default()).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn update_missing_task_returns_not_found() {
    let store = store();

    let ghost = Task::from_draft(42, TaskDraft::new("ghost"));
    let err = store.update_task(&ghost).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(EntityRef::Task(42))));
}

#[test]
fn delete_then_get_returns_none() {
    let store = store();
    let id = store.create_task(&TaskDraft::new("Take out trash")).unwrap();

    store.delete_task(id).unwrap();

    assert!(store.get_task(id).unwrap().is_none());
}

#[test]
fn delete_missing_task_returns_not_found() {
    let store = store();

    let err = store.delete_task(9).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(EntityRef::Task(9))));
    assert!(err.is_not_found());
}

#[test]
fn unknown_category_reference_is_rejected() {
    let store = store();

    let draft = TaskDraft::new("Orphaned").with_category(Some(77));
    let err = store.create_task(&draft).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(EntityRef::Category(77))));
    assert!(store.list_tasks(&TaskListQuery::default()).unwrap().is_empty());
}

#[test]
fn list_keeps_insertion_order_and_filters() {
    let store = store();
    let work = store.create_category(&CategoryDraft::new("Work")).unwrap();

    let a = store.create_task(&TaskDraft::new("a")).unwrap();
    let b = store
        .create_task(&TaskDraft::new("b").with_category(Some(work)))
        .unwrap();
    let c = store
        .create_task(&TaskDraft::new("c").with_category(Some(work)))
        .unwrap();
    let mut done = store.get_task(c).unwrap().unwrap();
    done.done = true;
    store.update_task(&done).unwrap();

    let all: Vec<_> = store
        .list_tasks(&TaskListQuery::default())
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(all, vec![a, b, c]);

    let in_work: Vec<_> = store
        .list_tasks(&TaskListQuery::in_category(work))
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(in_work, vec![b, c]);

    let open_work = TaskListQuery {
        category_id: Some(work),
        done: Some(false),
    };
    let open: Vec<_> = store
        .list_tasks(&open_work)
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(open, vec![b]);
}

#[test]
fn every_write_bumps_the_revision() {
    let store = store();
    assert_eq!(store.revision(), 0);

    let id = store.create_task(&TaskDraft::new("one")).unwrap();
    assert_eq!(store.revision(), 1);

    let task = store.get_task(id).unwrap().unwrap();
    store.update_task(&task).unwrap();
    store.delete_task(id).unwrap();
    assert_eq!(store.revision(), 3);

    let _ = store.delete_task(id).unwrap_err();
    assert_eq!(store.revision(), 3);
}

#[test]
fn corrupted_date_column_surfaces_invalid_data() {
    let store = store();
    let id = store.create_task(&TaskDraft::new("legacy row")).unwrap();
    store
        .with_connection(|conn| {
            conn.execute(
                "UPDATE tasks SET start_date = 'tomorrow' WHERE id = ?1;",
                [id],
            )
        })
        .unwrap();

    let err = store.get_task(id).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("start_date")));
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todo.sqlite3");

    let id = {
        let store = SqliteTodoStore::open(&path).unwrap();
        store.create_task(&TaskDraft::new("Renew passport")).unwrap()
    };

    let reopened = SqliteTodoStore::open(&path).unwrap();
    let task = reopened.get_task(id).unwrap().unwrap();
    assert_eq!(task.description, "Renew passport");
}

#[test]
fn modify_task_edits_in_place_and_returns_result() {
    let store = store();
    let id = store.create_task(&TaskDraft::new("Renew passport")).unwrap();

    let edited = store
        .modify_task(id, |task| {
            task.done = true;
            task.details = Some("bring photos".to_string());
            Ok(())
        })
        .unwrap();

    assert!(edited.done);
    assert_eq!(store.get_task(id).unwrap().unwrap(), edited);
}

#[test]
fn modify_task_rolls_back_rejected_edits() {
    let store = store();
    let id = store.create_task(&TaskDraft::new("Book hotel")).unwrap();
    let before = store.get_task(id).unwrap().unwrap();
    let revision = store.revision();

    let err = store
        .modify_task(id, |task| {
            task.description = "changed".to_string();
            Err(RepoError::InvalidData("abort".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));

    let err = store
        .modify_task(id, |task| {
            task.time = Some(time(9, 0));
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::TaskValidation(TaskValidationError::TimeWithoutDate)
    ));

    let err = store.modify_task(99, |_| Ok(())).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(EntityRef::Task(99))));

    assert_eq!(store.get_task(id).unwrap().unwrap(), before);
    assert_eq!(store.revision(), revision);
}

#[test]
fn concurrent_modify_task_loses_no_edits() {
    let store = Arc::new(store());
    let mut draft = TaskDraft::new("Counter");
    draft.details = Some("0".to_string());
    let id = store.create_task(&draft).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..25 {
                    store
                        .modify_task(id, |task| {
                            let count: u32 = task.details.as_deref().unwrap().parse().unwrap();
                            task.details = Some((count + 1).to_string());
                            Ok(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let task = store.get_task(id).unwrap().unwrap();
    assert_eq!(task.details.as_deref(), Some("200"));
}

#[test]
fn concurrent_updates_are_never_seen_half_written() {
    let store = Arc::new(store());
    let id = store.create_task(&TaskDraft::new("v0")).unwrap();

    let writers: Vec<_> = (1..=4)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..50 {
                    let version = format!("w{writer}-{round}");
                    let mut task = Task::from_draft(id, TaskDraft::new(version.clone()));
                    task.details = Some(version);
                    task.done = round % 2 == 0;
                    if task.done {
                        task.start_date = Some(date(2024, 5, 1));
                        task.time = Some(time(8, 30));
                    }
                    store.update_task(&task).unwrap();
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..100 {
                    let task = store.get_task(id).unwrap().unwrap();
                    if task.description == "v0" {
                        assert!(task.details.is_none());
                        continue;
                    }
                    assert_eq!(task.details.as_deref(), Some(task.description.as_str()));
                    assert_eq!(task.done, task.start_date.is_some());
                    assert_eq!(task.done, task.time.is_some());
                }
            })
        })
        .collect();
    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let last = store.get_task(id).unwrap().unwrap();
    assert_eq!(last.details.as_deref(), Some(last.description.as_str()));
}
