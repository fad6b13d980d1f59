//! Durability of the file-backed store

use intake_core::{
    ApplicationId, ApplicationStore, ConsentSet, FieldPatch, FileApplicationStore,
    LicenceStatus, NewApplication, Source, StoreError,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn new_application() -> NewApplication {
    NewApplication {
        licence_status: LicenceStatus::Valid,
        source: Source::Agent,
        agent_id: Some("AG-42".to_string()),
        user_agent: None,
    }
}

fn patch(value: serde_json::Value) -> FieldPatch {
    FieldPatch::from_proposed(value.as_object().unwrap()).unwrap()
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let created = {
        let store = FileApplicationStore::open(dir.path()).await.unwrap();
        let created = store.create(new_application()).await.unwrap();
        store
            .apply_update(
                created.id,
                patch(json!({ "first_name": "Jane", "preferred_debit_date": 15 }))
                    .with_current_step(2),
            )
            .await
            .unwrap();
        store
            .complete(created.id, ConsentSet::all_granted())
            .await
            .unwrap();
        assert!(store.mark_notified(created.id).await.unwrap());
        created
    };

    let reopened = FileApplicationStore::open(dir.path()).await.unwrap();
    let record = reopened.get(created.id).await.unwrap();
    assert_eq!(record.first_name.as_deref(), Some("Jane"));
    assert_eq!(record.preferred_debit_date, Some(15));
    assert_eq!(record.agent_id.as_deref(), Some("AG-42"));
    assert_eq!(record.session_marker, created.session_marker);
    assert!(record.is_complete());
    assert!(record.abandonment_email_sent);
    assert!(!reopened.mark_notified(created.id).await.unwrap());
}

#[tokio::test]
async fn no_temp_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileApplicationStore::open(dir.path()).await.unwrap();
    let created = store.create(new_application()).await.unwrap();
    store
        .apply_update(created.id, patch(json!({ "city": "Durban" })))
        .await
        .unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![format!("{}.json", created.id)]);
}

#[tokio::test]
async fn rejected_writes_leave_document_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileApplicationStore::open(dir.path()).await.unwrap();
    let created = store.create(new_application()).await.unwrap();
    let completed = store
        .complete(created.id, ConsentSet::all_granted())
        .await
        .unwrap();

    assert_eq!(
        store
            .apply_update(created.id, patch(json!({ "first_name": "Eve" })))
            .await,
        Err(StoreError::AlreadyComplete)
    );
    assert_eq!(
        store.complete(created.id, ConsentSet::all_granted()).await,
        Err(StoreError::AlreadyComplete)
    );
    assert_eq!(store.get(created.id).await.unwrap(), completed);
}

#[tokio::test]
async fn unknown_identifier_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileApplicationStore::open(dir.path()).await.unwrap();
    let id = ApplicationId::new();

    assert_eq!(store.get(id).await, Err(StoreError::NotFound(id)));
    assert_eq!(
        store.apply_update(id, patch(json!({ "city": "Durban" }))).await,
        Err(StoreError::NotFound(id))
    );
}

#[tokio::test]
async fn corrupt_document_is_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileApplicationStore::open(dir.path()).await.unwrap();
    let id = ApplicationId::new();
    std::fs::write(dir.path().join(format!("{id}.json")), b"{not json").unwrap();

    assert!(matches!(store.get(id).await, Err(StoreError::Persistence(_))));
}
