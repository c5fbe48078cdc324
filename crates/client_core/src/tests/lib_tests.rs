use super::*;
use anyhow::anyhow;
use serde_json::json;
use std::collections::VecDeque;
use tokio::sync::oneshot;

#[derive(Default)]
struct FakeRemote {
    records: Mutex<Vec<Record>>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
    created_bodies: Mutex<Vec<Map<String, Value>>>,
    updated: Mutex<Vec<Record>>,
    next_id: Mutex<i64>,
}

impl FakeRemote {
    fn with_records(records: Vec<Record>) -> Arc<Self> {
        let next_id = records.len() as i64 + 100;
        Arc::new(Self {
            records: Mutex::new(records),
            next_id: Mutex::new(next_id),
            ..Self::default()
        })
    }

    async fn fail_on(&self, op: &'static str) {
        self.failing.lock().await.insert(op);
    }

    async fn heal(&self, op: &'static str) {
        self.failing.lock().await.remove(op);
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn enter(&self, call: String, op: &'static str) -> Result<()> {
        self.calls.lock().await.push(call);
        if self.failing.lock().await.contains(op) {
            return Err(anyhow!("{op} refused by fake remote"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCollection for FakeRemote {
    async fn list(&self) -> Result<Vec<Record>> {
        self.enter("list".into(), "list").await?;
        Ok(self.records.lock().await.clone())
    }

    async fn create(&self, body: &Map<String, Value>) -> Result<Value> {
        self.enter("create".into(), "create").await?;
        self.created_bodies.lock().await.push(body.clone());
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let record = Record {
            id: RecordId::Int(*next_id),
            fields: body.clone(),
        };
        self.records.lock().await.push(record.clone());
        Ok(serde_json::to_value(record)?)
    }

    async fn update(&self, id: &RecordId, record: &Record) -> Result<Acknowledgement> {
        self.enter(format!("update:{id}"), "update").await?;
        self.updated.lock().await.push(record.clone());
        Ok(Acknowledgement {
            message: Some(format!("updated {id}")),
        })
    }

    async fn delete(&self, id: &RecordId) -> Result<Acknowledgement> {
        self.enter(format!("delete:{id}"), "delete").await?;
        self.records.lock().await.retain(|record| &record.id != id);
        Ok(Acknowledgement {
            message: Some(format!("deleted {id}")),
        })
    }
}

fn alice() -> Record {
    Record::new(1)
        .with_field("name", "Alice")
        .with_field("email", "a@x.com")
}

fn users() -> Vec<Record> {
    vec![
        alice(),
        Record::new(2)
            .with_field("name", "Bob")
            .with_field("email", "b@x.com"),
        Record::new(3)
            .with_field("name", "Cleo")
            .with_field("email", "c@x.com"),
    ]
}

async fn loaded_users() -> (Arc<ListSyncController>, Arc<FakeRemote>) {
    let remote = FakeRemote::with_records(users());
    let controller = ListSyncController::new(ResourceSchema::users(), remote.clone());
    controller.load().await.expect("initial load");
    (controller, remote)
}

#[tokio::test]
async fn load_replaces_collection_and_clears_error() {
    let remote = FakeRemote::with_records(vec![Record::new(5)
        .with_field("name", "Bob")
        .with_field("paymentAmount", 10.5)]);
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());

    remote.fail_on("list").await;
    assert!(controller.load().await.is_err());
    assert_eq!(
        controller.error().await.as_deref(),
        Some("Error fetching payments.")
    );

    remote.heal("list").await;
    controller.load().await.expect("load");

    let snapshot = controller.snapshot().await;
    assert_eq!(
        serde_json::to_value(&snapshot.records).expect("encode"),
        json!([{"id": 5, "name": "Bob", "paymentAmount": 10.5}])
    );
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn failed_load_keeps_stale_collection() {
    let (controller, remote) = loaded_users().await;
    remote.fail_on("list").await;

    let err = controller.load().await.expect_err("load should fail");
    assert!(matches!(
        err,
        SyncError::RemoteCallFailed {
            operation: RemoteOperation::List,
            ..
        }
    ));
    assert_eq!(controller.records().await, users());
    assert_eq!(controller.error().await.as_deref(), Some("Error fetching users."));
}

#[tokio::test]
async fn edit_field_changes_only_the_target_field() {
    let remote = FakeRemote::with_records(vec![alice()]);
    let controller = ListSyncController::new(ResourceSchema::users(), remote.clone());
    controller.load().await.expect("load");

    assert!(controller.edit_field(&RecordId::Int(1), "name", "Alicia").await);

    assert_eq!(
        serde_json::to_value(controller.records().await).expect("encode"),
        json!([{"id": 1, "name": "Alicia", "email": "a@x.com"}])
    );
    assert_eq!(remote.calls().await, vec!["list".to_string()]);
}

#[tokio::test]
async fn edit_field_preserves_neighbours_and_order() {
    let (controller, _remote) = loaded_users().await;

    assert!(controller.edit_field(&RecordId::Int(2), "email", "bob@y.org").await);

    let records = controller.records().await;
    let mut expected = users();
    expected[1] = expected[1].clone().with_field("email", "bob@y.org");
    assert_eq!(records, expected);
}

#[tokio::test]
async fn edit_field_for_unknown_id_is_a_no_op() {
    let (controller, _remote) = loaded_users().await;

    assert!(!controller.edit_field(&RecordId::Int(42), "name", "Ghost").await);
    assert!(!controller.edit_field(&RecordId::from("1"), "name", "Ghost").await);
    assert_eq!(controller.records().await, users());
}

#[tokio::test]
async fn edit_field_refuses_to_touch_ids() {
    let (controller, _remote) = loaded_users().await;

    assert!(!controller.edit_field(&RecordId::Int(1), "id", "9").await);
    assert_eq!(controller.records().await, users());
}

#[test]
fn default_snapshot_cannot_create() {
    assert!(!SyncSnapshot::default().can_create());
}

#[tokio::test]
async fn start_edit_only_updates_known_draft_fields() {
    let controller =
        ListSyncController::new(ResourceSchema::users(), FakeRemote::with_records(Vec::new()));

    assert!(!controller.can_create().await);
    assert!(controller.start_edit("name", "Bob").await);
    assert!(!controller.start_edit("phone", "555").await);
    assert!(!controller.can_create().await);
    assert!(controller.start_edit("email", "b@x.com").await);
    assert!(controller.can_create().await);
    assert_eq!(controller.pending().await.get("name"), Some("Bob"));
}

#[tokio::test]
async fn create_with_unparsable_amount_makes_no_remote_call() {
    let remote = FakeRemote::with_records(Vec::new());
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.start_edit("name", "Bob").await;
    controller.start_edit("paymentAmount", "abc").await;

    let err = controller.create().await.expect_err("create should fail");
    assert!(matches!(err, SyncError::InvalidNumericInput(_)));
    assert!(remote.calls().await.is_empty());
    assert_eq!(
        controller.error().await.as_deref(),
        Some("Payment amount must be a number")
    );
    assert_eq!(controller.pending().await.get("paymentAmount"), Some("abc"));
}

#[tokio::test]
async fn create_success_resets_draft_and_reloads_once() {
    let remote = FakeRemote::with_records(Vec::new());
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.start_edit("name", "Bob").await;
    controller.start_edit("paymentAmount", "20").await;

    controller.create().await.expect("create");

    assert_eq!(
        remote.calls().await,
        vec!["create".to_string(), "list".to_string()]
    );
    assert_eq!(
        remote.created_bodies.lock().await.clone(),
        vec![json!({"name": "Bob", "paymentAmount": 20.0})
            .as_object()
            .cloned()
            .expect("object")]
    );
    let pending = controller.pending().await;
    assert_eq!(pending.get("name"), Some(""));
    assert_eq!(pending.get("paymentAmount"), Some(""));

    let records = controller.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("name"), Some(&json!("Bob")));
    assert_eq!(controller.error().await, None);
}

#[tokio::test]
async fn create_failure_keeps_typed_input() {
    let remote = FakeRemote::with_records(Vec::new());
    let controller = ListSyncController::new(ResourceSchema::users(), remote.clone());
    controller.start_edit("name", "Bob").await;
    controller.start_edit("email", "b@x.com").await;
    remote.fail_on("create").await;

    assert!(controller.create().await.is_err());
    assert_eq!(controller.error().await.as_deref(), Some("Error adding user."));
    assert_eq!(controller.pending().await.get("email"), Some("b@x.com"));
    assert_eq!(remote.calls().await, vec!["create".to_string()]);
}

#[tokio::test]
async fn create_requires_every_field() {
    let remote = FakeRemote::with_records(Vec::new());
    let controller = ListSyncController::new(ResourceSchema::users(), remote.clone());
    controller.start_edit("name", "Bob").await;

    let err = controller.create().await.expect_err("incomplete draft");
    match err {
        SyncError::IncompleteRecord { missing } => assert_eq!(missing, vec!["email".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(remote.calls().await.is_empty());
    assert_eq!(controller.error().await, None);
}

#[tokio::test]
async fn commit_update_sends_local_edit_without_reload() {
    let (controller, remote) = loaded_users().await;
    controller.edit_field(&RecordId::Int(1), "name", "Alicia").await;

    controller
        .commit_update(&RecordId::Int(1))
        .await
        .expect("update");

    assert_eq!(
        remote.calls().await,
        vec!["list".to_string(), "update:1".to_string()]
    );
    let sent = remote.updated.lock().await.clone();
    assert_eq!(sent, vec![alice().with_field("name", "Alicia")]);
    assert_eq!(
        controller.records().await[0].field("name"),
        Some(&json!("Alicia"))
    );
}

#[tokio::test]
async fn commit_update_coerces_numeric_text() {
    let remote = FakeRemote::with_records(vec![Record::new(5)
        .with_field("name", "Bob")
        .with_field("paymentAmount", 10.5)]);
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.load().await.expect("load");
    controller
        .edit_field(&RecordId::Int(5), "paymentAmount", "12.75")
        .await;

    controller
        .commit_update(&RecordId::Int(5))
        .await
        .expect("update");

    let sent = remote.updated.lock().await.clone();
    assert_eq!(sent[0].field("paymentAmount"), Some(&json!(12.75)));
    // the local copy keeps what the user typed
    assert_eq!(
        controller.records().await[0].field("paymentAmount"),
        Some(&json!("12.75"))
    );
}

#[tokio::test]
async fn commit_update_of_unedited_listed_payment_sends_primary_amount() {
    let remote = FakeRemote::with_records(vec![Record::new(5)
        .with_field("name", "Bob")
        .with_field("payment_amount", 10.5)]);
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.load().await.expect("load");

    controller
        .commit_update(&RecordId::Int(5))
        .await
        .expect("update");

    let sent = remote.updated.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].field("paymentAmount"), Some(&json!(10.5)));
    assert_eq!(controller.error().await, None);
}

#[tokio::test]
async fn create_accepts_amount_with_trailing_text() {
    let remote = FakeRemote::with_records(Vec::new());
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.start_edit("name", "Bob").await;
    controller.start_edit("paymentAmount", "20 USD").await;

    controller.create().await.expect("create");

    assert_eq!(
        remote.created_bodies.lock().await[0].get("paymentAmount"),
        Some(&json!(20.0))
    );
}

#[tokio::test]
async fn commit_update_with_bad_number_keeps_edit_visible() {
    let remote = FakeRemote::with_records(vec![Record::new(5)
        .with_field("name", "Bob")
        .with_field("paymentAmount", 10.5)]);
    let controller = ListSyncController::new(ResourceSchema::payments(), remote.clone());
    controller.load().await.expect("load");
    controller
        .edit_field(&RecordId::Int(5), "paymentAmount", "ten")
        .await;

    let err = controller
        .commit_update(&RecordId::Int(5))
        .await
        .expect_err("bad number");
    assert!(matches!(err, SyncError::InvalidNumericInput(_)));
    assert_eq!(remote.calls().await, vec!["list".to_string()]);
    assert_eq!(
        controller.records().await[0].field("paymentAmount"),
        Some(&json!("ten"))
    );
    assert_eq!(
        controller.error().await.as_deref(),
        Some("Payment amount must be a number")
    );
}

#[tokio::test]
async fn commit_update_failure_keeps_local_edit() {
    let (controller, remote) = loaded_users().await;
    controller.edit_field(&RecordId::Int(3), "name", "Cleopatra").await;
    remote.fail_on("update").await;

    assert!(controller.commit_update(&RecordId::Int(3)).await.is_err());
    assert_eq!(controller.error().await.as_deref(), Some("Error updating user."));
    assert_eq!(
        controller.records().await[2].field("name"),
        Some(&json!("Cleopatra"))
    );

    remote.heal("update").await;
    controller
        .commit_update(&RecordId::Int(3))
        .await
        .expect("retry");
    assert_eq!(controller.error().await, None);
}

#[tokio::test]
async fn commit_update_for_unknown_id_sends_nothing() {
    let (controller, remote) = loaded_users().await;

    let err = controller
        .commit_update(&RecordId::Int(77))
        .await
        .expect_err("unknown id");
    assert!(matches!(err, SyncError::UnknownRecord(RecordId::Int(77))));
    assert_eq!(remote.calls().await, vec!["list".to_string()]);
}

#[tokio::test]
async fn delete_removes_exactly_one_record_in_order() {
    let (controller, remote) = loaded_users().await;

    controller
        .delete_record(&RecordId::Int(2))
        .await
        .expect("delete");

    let ids: Vec<RecordId> = controller
        .records()
        .await
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec![RecordId::Int(1), RecordId::Int(3)]);
    assert_eq!(
        remote.calls().await,
        vec!["list".to_string(), "delete:2".to_string()]
    );
}

#[tokio::test]
async fn delete_failure_leaves_collection_untouched() {
    let (controller, remote) = loaded_users().await;
    remote.fail_on("delete").await;

    assert!(controller.delete_record(&RecordId::Int(2)).await.is_err());
    assert_eq!(controller.records().await, users());
    assert_eq!(controller.error().await.as_deref(), Some("Error deleting user."));
}

#[tokio::test]
async fn events_follow_state_changes() {
    let (controller, remote) = loaded_users().await;
    let mut events = controller.subscribe_events();

    remote.fail_on("delete").await;
    let _ = controller.delete_record(&RecordId::Int(1)).await;
    remote.heal("delete").await;
    controller
        .delete_record(&RecordId::Int(1))
        .await
        .expect("delete");

    assert_eq!(
        events.recv().await.expect("event"),
        SyncEvent::Error("Error deleting user.".into())
    );
    assert_eq!(
        events.recv().await.expect("event"),
        SyncEvent::RecordRemoved(RecordId::Int(1))
    );
    assert_eq!(
        events.recv().await.expect("event"),
        SyncEvent::Acknowledged("deleted 1".into())
    );
    assert_eq!(events.recv().await.expect("event"), SyncEvent::ErrorCleared);
}

/// List calls block until the test hands each one its response.
struct GatedRemote {
    gates: Mutex<VecDeque<oneshot::Receiver<Vec<Record>>>>,
    entered: Mutex<usize>,
}

#[async_trait]
impl RemoteCollection for GatedRemote {
    async fn list(&self) -> Result<Vec<Record>> {
        let gate = self
            .gates
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("no gate left"))?;
        *self.entered.lock().await += 1;
        Ok(gate.await?)
    }

    async fn create(&self, _body: &Map<String, Value>) -> Result<Value> {
        Err(anyhow!("unused"))
    }

    async fn update(&self, _id: &RecordId, _record: &Record) -> Result<Acknowledgement> {
        Err(anyhow!("unused"))
    }

    async fn delete(&self, _id: &RecordId) -> Result<Acknowledgement> {
        Err(anyhow!("unused"))
    }
}

#[tokio::test]
async fn overlapping_loads_keep_the_last_response() {
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    let remote = Arc::new(GatedRemote {
        gates: Mutex::new(VecDeque::from([first_rx, second_rx])),
        entered: Mutex::new(0),
    });
    let controller = ListSyncController::new(ResourceSchema::users(), remote.clone());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.load().await }
    });
    while *remote.entered.lock().await < 1 {
        tokio::task::yield_now().await;
    }
    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.load().await }
    });
    while *remote.entered.lock().await < 2 {
        tokio::task::yield_now().await;
    }

    second_tx.send(vec![alice()]).expect("second gate");
    second.await.expect("join").expect("second load");
    assert_eq!(controller.records().await, vec![alice()]);

    first_tx.send(users()).expect("first gate");
    first.await.expect("join").expect("first load");
    assert_eq!(controller.records().await, users());
}
