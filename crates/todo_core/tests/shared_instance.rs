//! The shared store is process-global, so its lifecycle is checked in one
//! sequential test.

use std::sync::Arc;
use std::thread;
use todo_core::db::{instance, DbError};
use todo_core::{bootstrap, logging_status, CoreConfig, RepoError, TaskDraft, TodoRepository};

#[test]
fn shared_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let first_path = dir.path().join("first.sqlite3");
    let second_path = dir.path().join("second.sqlite3");

    assert!(instance::instance().is_none());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = first_path.clone();
            thread::spawn(move || instance::init(path).unwrap())
        })
        .collect();
    let stores: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    for store in &stores[1..] {
        assert!(Arc::ptr_eq(&stores[0], store));
    }
    assert!(Arc::ptr_eq(&stores[0], &instance::instance().unwrap()));
    assert_eq!(instance::active_path(), Some(first_path.clone()));

    let id = stores[0].create_task(&TaskDraft::new("shared")).unwrap();
    assert_eq!(
        instance::init(&first_path).unwrap().get_task(id).unwrap().unwrap().description,
        "shared"
    );

    let err = instance::init(&second_path).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db(DbError::InstanceConflict { ref active, ref requested })
            if *active == first_path && *requested == second_path
    ));

    drop(stores);
    assert!(instance::shutdown());
    assert!(!instance::shutdown());
    assert!(instance::instance().is_none());

    let log_dir = dir.path().join("logs");
    let mut config = CoreConfig::new(&second_path);
    config.log_dir = Some(log_dir.clone());
    let store = bootstrap(&config).unwrap();
    assert!(store.list_tasks(&Default::default()).unwrap().is_empty());
    assert_eq!(instance::active_path(), Some(second_path));
    let (_, active_log_dir) = logging_status().unwrap();
    assert_eq!(active_log_dir, log_dir);

    assert!(instance::shutdown());
}
