use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
    let counter = Arc::clone(counter);
    Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn add_and_dispatch_by_event_name() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut listeners = Listeners::default();
    listeners.add("contractCreated", counting_handler(&hits));
    listeners.add("contractCreated", counting_handler(&hits));
    listeners.add("jobCreated", counting_handler(&hits));

    for handler in listeners.handlers_for("contractCreated") {
        handler(&Value::Null);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(listeners.count("jobCreated"), 1);
    assert!(listeners.handlers_for("unknown").is_empty());
}

#[test]
fn remove_only_drops_matching_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut listeners = Listeners::default();
    let first = listeners.add("jobDeleted", counting_handler(&hits));
    let _second = listeners.add("jobDeleted", counting_handler(&hits));

    assert!(listeners.remove("jobDeleted", first));
    assert!(!listeners.remove("jobDeleted", first));
    assert_eq!(listeners.count("jobDeleted"), 1);
}

#[test]
fn remove_under_wrong_event_is_noop() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut listeners = Listeners::default();
    let id = listeners.add("jobDeleted", counting_handler(&hits));

    assert!(!listeners.remove("jobCreated", id));
    assert_eq!(listeners.count("jobDeleted"), 1);
}

#[test]
fn dropping_subscription_unregisters() {
    let hits = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(Mutex::new(Listeners::default()));
    let id = lock(&registry).add("applicantUpdated", counting_handler(&hits));
    let sub = Subscription::new("applicantUpdated", id, &registry);

    assert_eq!(sub.event(), "applicantUpdated");
    assert_eq!(lock(&registry).count("applicantUpdated"), 1);
    drop(sub);
    assert_eq!(lock(&registry).count("applicantUpdated"), 0);
}

#[test]
fn cancel_unregisters() {
    let hits = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(Mutex::new(Listeners::default()));
    let id = lock(&registry).add("employeeCreated", counting_handler(&hits));
    Subscription::new("employeeCreated", id, &registry).cancel();

    assert_eq!(lock(&registry).count("employeeCreated"), 0);
}

#[test]
fn subscription_outliving_registry_drops_quietly() {
    let hits = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(Mutex::new(Listeners::default()));
    let id = lock(&registry).add("departmentDeleted", counting_handler(&hits));
    let sub = Subscription::new("departmentDeleted", id, &registry);

    drop(registry);
    drop(sub);
}
