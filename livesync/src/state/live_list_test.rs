use super::*;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::state::entities::Contract;
use crate::state::entity::ChangeKind;
use crate::state::view::SortDirection;

fn contract(id: &str, title: &str, salary: f64) -> Contract {
    Contract {
        id: id.to_owned(),
        title: title.to_owned(),
        employee_id: "e1".to_owned(),
        department_id: "d1".to_owned(),
        contract_type: "permanent".to_owned(),
        start_date: "2024-01-01".to_owned(),
        end_date: None,
        salary,
        currency: "EUR".to_owned(),
        status: "active".to_owned(),
        employee_name: None,
    }
}

fn ids(list: &LiveList<Contract>) -> Vec<&str> {
    list.items().iter().map(|c| c.id.as_str()).collect()
}

/// In-memory backend. `fail_with` makes every call fail.
#[derive(Default)]
struct FakeApi {
    rows: Mutex<Vec<Contract>>,
    fail_with: Option<ApiError>,
    next_id: Mutex<u32>,
}

impl FakeApi {
    fn with_rows(rows: Vec<Contract>) -> Self {
        Self { rows: Mutex::new(rows), ..Self::default() }
    }

    fn failing(error: ApiError) -> Self {
        Self { fail_with: Some(error), ..Self::default() }
    }

    fn check(&self) -> Result<(), ApiError> {
        self.fail_with.clone().map_or(Ok(()), Err)
    }
}

#[async_trait::async_trait]
impl EntityApi<Contract> for FakeApi {
    async fn list(&self) -> Result<Vec<Contract>, ApiError> {
        self.check()?;
        Ok(self.rows.lock().expect("rows").clone())
    }

    async fn get(&self, id: &str) -> Result<Contract, ApiError> {
        self.check()?;
        self.rows
            .lock()
            .expect("rows")
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ApiError::Status { status: 404, message: "Contract not found".to_owned() })
    }

    async fn create(&self, data: &Value) -> Result<Contract, ApiError> {
        self.check()?;
        let mut next = self.next_id.lock().expect("next id");
        *next += 1;
        let mut entity = contract(&format!("new-{next}"), "", 0.0);
        entity.title = data["title"].as_str().unwrap_or_default().to_owned();
        entity.salary = data["salary"].as_f64().unwrap_or_default();
        self.rows.lock().expect("rows").push(entity.clone());
        Ok(entity)
    }

    async fn update(&self, id: &str, data: &Value) -> Result<Contract, ApiError> {
        let mut entity = self.get(id).await?;
        if let Some(title) = data["title"].as_str() {
            entity.title = title.to_owned();
        }
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.check()?;
        self.rows.lock().expect("rows").retain(|c| c.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingBroadcaster {
    sent: Mutex<Vec<(String, Value)>>,
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, event: &str, payload: Value) -> bool {
        self.sent.lock().expect("sent").push((event.to_owned(), payload));
        true
    }
}

impl RecordingBroadcaster {
    fn events(&self) -> Vec<String> {
        self.sent.lock().expect("sent").iter().map(|(e, _)| e.clone()).collect()
    }
}

fn loaded(rows: Vec<Contract>) -> LiveList<Contract> {
    let mut list = LiveList::new();
    list.replace_all(rows);
    list
}

// =============================================================================
// deltas
// =============================================================================

#[test]
fn create_is_idempotent() {
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);
    let fresh = contract("c2", "Analyst", 2.0);

    list.apply_created(fresh.clone());
    let once = list.items().to_vec();
    list.apply_created(fresh);
    assert_eq!(list.items(), once.as_slice());
    assert_eq!(ids(&list), ["c2", "c1"]);
}

#[test]
fn update_is_idempotent_and_replaces_in_place() {
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0), contract("c2", "Driver", 2.0)]);
    let renamed = contract("c2", "Chauffeur", 2.0);

    list.apply_updated(renamed.clone());
    list.apply_updated(renamed);
    assert_eq!(ids(&list), ["c1", "c2"]);
    assert_eq!(list.get("c2").map(|c| c.title.as_str()), Some("Chauffeur"));
}

#[test]
fn delete_is_absorbing() {
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);
    assert!(list.apply_deleted("c1"));
    assert!(!list.apply_deleted("c1"));
    assert!(!list.apply_deleted("never-existed"));
    assert!(list.is_empty());
}

#[test]
fn create_and_update_converge() {
    let version = contract("c5", "Analyst", 5.0);
    let mut via_create = loaded(vec![contract("c1", "Clerk", 1.0)]);
    let mut via_update = loaded(vec![contract("c1", "Clerk", 1.0)]);

    via_create.apply_created(version.clone());
    via_update.apply_updated(version);
    assert_eq!(via_create.items(), via_update.items());
}

#[test]
fn concurrent_create_echo_yields_one_row() {
    let mut list = loaded(vec![]);
    let created = contract("c9", "Economist", 9.0);

    // REST reply applied locally, then the same event echoed back.
    list.apply(Delta::Created(created.clone()));
    list.apply(Delta::Created(created));
    assert_eq!(list.len(), 1);
}

#[test]
fn update_after_delete_reinserts() {
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);
    list.apply(Delta::Deleted("c1".to_owned()));
    list.apply(Delta::Updated(contract("c1", "Clerk II", 1.0)));
    assert_eq!(ids(&list), ["c1"]);
    assert_eq!(list.items()[0].title, "Clerk II");
}

#[tokio::test]
async fn records_with_core_fields_only_load_and_apply() {
    let minimal = |id: &str, status: &str| {
        json!({
            "id": id, "employeeId": "e1", "departmentId": "d1", "contractType": "permanent",
            "startDate": "2024-01-01", "salary": 5000, "currency": "RWF", "status": status
        })
    };
    let row: Contract = serde_json::from_value(minimal("c1", "active")).expect("contract");
    let mut list: LiveList<Contract> = LiveList::new();
    list.load(&FakeApi::with_rows(vec![row])).await.expect("load succeeds");

    let created = Delta::from_event(ChangeKind::Created, &minimal("c2", "draft")).expect("created delta");
    let updated = Delta::from_event(ChangeKind::Updated, &minimal("c1", "ended")).expect("updated delta");
    list.apply(created);
    list.apply(updated);

    assert_eq!(ids(&list), ["c2", "c1"]);
    assert_eq!(list.get("c1").map(|c| c.status.as_str()), Some("ended"));
}

#[test]
fn lookups_follow_inserts_and_removals() {
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0), contract("c2", "Driver", 2.0), contract("c3", "Cook", 3.0)]);
    list.apply_created(contract("c4", "Nurse", 4.0));
    assert!(list.apply_deleted("c2"));
    list.apply_updated(contract("c3", "Head Cook", 3.5));
    list.apply_created(contract("c5", "Guard", 5.0));
    assert!(!list.apply_deleted("c2"));

    assert_eq!(ids(&list), ["c5", "c4", "c1", "c3"]);
    for id in ids(&list) {
        assert_eq!(list.get(id).map(|c| c.id.as_str()), Some(id));
    }
    assert_eq!(list.get("c3").map(|c| c.title.as_str()), Some("Head Cook"));
    assert!(!list.contains("c2"));
    assert!(list.get("c2").is_none());
}

#[test]
fn load_deduplicates_ids() {
    let list = loaded(vec![contract("c1", "First", 1.0), contract("c2", "Other", 2.0), contract("c1", "Dup", 3.0)]);
    assert_eq!(ids(&list), ["c1", "c2"]);
    assert_eq!(list.items()[0].title, "First");
}

// =============================================================================
// view state
// =============================================================================

fn eleven() -> LiveList<Contract> {
    let rows = (1..=11).map(|n| contract(&format!("c{n}"), "Clerk", f64::from(n))).collect();
    let mut list = loaded(rows);
    list.set_page_size(5);
    list
}

#[test]
fn delete_clamps_page_when_last_page_empties() {
    let mut list = eleven();
    list.set_page(3);
    assert_eq!(list.current_view().items.len(), 1);

    list.apply_deleted("c11");
    assert_eq!(list.view_state().page, 2);
    assert_eq!(list.current_view().items.len(), 5);
}

#[test]
fn delta_keeps_page_when_still_in_range() {
    let mut list = eleven();
    list.set_page(2);
    list.apply_created(contract("c12", "Clerk", 12.0));
    assert_eq!(list.view_state().page, 2);
}

#[test]
fn set_page_beyond_end_is_clamped() {
    let mut list = eleven();
    list.set_page(40);
    assert_eq!(list.view_state().page, 3);
}

#[test]
fn search_and_sort_changes_reset_page() {
    let mut list = eleven();
    list.set_page(3);
    list.set_search("clerk");
    assert_eq!(list.view_state().page, 1);

    list.set_page(2);
    list.toggle_sort("salary");
    assert_eq!(list.view_state().page, 1);
    list.toggle_sort("salary");
    let sort = list.view_state().sort.clone().expect("sorted");
    assert_eq!(sort.direction, SortDirection::Descending);
    assert_eq!(list.current_view().items[0].id, "c11");
}

#[test]
fn recompute_view_does_not_touch_own_state() {
    let list = eleven();
    let other = ViewState { page: 3, page_size: 5, ..ViewState::default() };
    assert_eq!(list.recompute_view(&other).page, 3);
    assert_eq!(list.view_state().page, 1);
}

// =============================================================================
// observers
// =============================================================================

#[test]
fn observers_see_every_change_until_removed() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut list = LiveList::<Contract>::new();
    let sink = Arc::clone(&seen);
    let id = list.observe(move |change| sink.lock().expect("seen").push(change.clone()));

    list.replace_all(vec![contract("c1", "Clerk", 1.0)]);
    list.apply_created(contract("c2", "Driver", 2.0));
    list.apply_updated(contract("c2", "Driver", 3.0));
    list.apply_deleted("c1");
    list.apply_deleted("c1");
    assert!(list.unobserve(id));
    list.apply_deleted("c2");

    assert_eq!(
        *seen.lock().expect("seen"),
        vec![
            ListChange::Loaded { count: 1 },
            ListChange::Inserted { id: "c2".to_owned() },
            ListChange::Replaced { id: "c2".to_owned() },
            ListChange::Removed { id: "c1".to_owned() },
        ]
    );
    assert!(!list.unobserve(id));
}

// =============================================================================
// REST
// =============================================================================

#[tokio::test]
async fn load_replaces_collection_and_resets_page() {
    let api = FakeApi::with_rows(vec![contract("s1", "Clerk", 1.0), contract("s2", "Driver", 2.0)]);
    let mut list = eleven();
    list.set_page(3);

    let count = list.load(&api).await.expect("load succeeds");
    assert_eq!(count, 2);
    assert_eq!(ids(&list), ["s1", "s2"]);
    assert_eq!(list.view_state().page, 1);
    assert!(list.error().is_none());
    assert!(!list.is_loading());
}

#[tokio::test]
async fn failed_load_keeps_items_and_sets_error() {
    let api = FakeApi::failing(ApiError::Status { status: 500, message: "Database unavailable".to_owned() });
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);

    let err = list.load(&api).await.expect_err("load fails");
    assert_eq!(err.status(), Some(500));
    assert_eq!(ids(&list), ["c1"]);
    assert_eq!(list.error(), Some("Database unavailable"));

    let ok = FakeApi::with_rows(vec![]);
    list.load(&ok).await.expect("second load succeeds");
    assert!(list.error().is_none());
}

#[tokio::test]
async fn create_applies_locally_and_broadcasts() {
    let api = FakeApi::default();
    let broadcaster = RecordingBroadcaster::default();
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);

    let created = list
        .create(&api, &broadcaster, &json!({"title": "Analyst", "salary": 4000}))
        .await
        .expect("create succeeds");
    assert_eq!(created.id, "new-1");
    assert_eq!(ids(&list), ["new-1", "c1"]);
    assert_eq!(list.mutation(), &MutationState::Succeeded);

    let sent = broadcaster.sent.lock().expect("sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "contractCreated");
    assert_eq!(sent[0].1["title"], "Analyst");
}

#[tokio::test]
async fn update_and_delete_broadcast_matching_events() {
    let api = FakeApi::with_rows(vec![contract("c1", "Clerk", 1.0)]);
    let broadcaster = RecordingBroadcaster::default();
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);

    list.update(&api, &broadcaster, "c1", &json!({"title": "Senior Clerk"})).await.expect("update");
    assert_eq!(list.items()[0].title, "Senior Clerk");
    list.delete(&api, &broadcaster, "c1").await.expect("delete");
    assert!(list.is_empty());

    assert_eq!(broadcaster.events(), ["contractUpdated", "contractDeleted"]);
    assert_eq!(broadcaster.sent.lock().expect("sent")[1].1, json!({"id": "c1"}));
}

#[tokio::test]
async fn failed_mutation_leaves_collection_untouched() {
    let api = FakeApi::failing(ApiError::Transport(String::new()));
    let broadcaster = RecordingBroadcaster::default();
    let mut list = loaded(vec![contract("c1", "Clerk", 1.0)]);
    let before = list.items().to_vec();

    let err = list.delete(&api, &broadcaster, "c1").await.expect_err("delete fails");
    assert_eq!(err.message(), crate::net::api::GENERIC_ERROR_MESSAGE);
    assert_eq!(list.items(), before.as_slice());
    assert_eq!(list.mutation(), &MutationState::Failed(crate::net::api::GENERIC_ERROR_MESSAGE.to_owned()));
    assert!(broadcaster.events().is_empty());
}

#[tokio::test]
async fn update_of_missing_entity_reports_not_found() {
    let api = FakeApi::default();
    let broadcaster = RecordingBroadcaster::default();
    let mut list = LiveList::<Contract>::new();

    let err = list.update(&api, &broadcaster, "ghost", &json!({})).await.expect_err("not found");
    assert!(err.is_not_found());
    assert_eq!(list.mutation(), &MutationState::Failed("Contract not found".to_owned()));
}
