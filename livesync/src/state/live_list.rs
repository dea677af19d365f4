//! Live list reconciler.
//!
//! A `LiveList<E>` holds the authoritative local copy of one collection. It
//! is filled by a REST load and then kept current by applying deltas, from
//! the notification channel or from the outcome of local mutations. Every
//! delta is applied through the same idempotent upsert/remove, so the order
//! in which a REST reply and its echoed event arrive does not matter.
//!
//! Collection order is the server order of the last load; entities new to
//! the collection go to the front. Sorting in the view is stable against
//! this order.

#[cfg(test)]
#[path = "live_list_test.rs"]
mod live_list_test;

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::entity::{Delta, Entity};
use super::view::{SearchContext, SortSpec, ViewPage, ViewState, compute_view, count_matches};
use crate::net::api::{ApiError, EntityApi};
use crate::net::connection::ConnectionManager;

/// Progress of the most recent local mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MutationState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

/// What changed in a collection, delivered to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListChange {
    Loaded { count: usize },
    Inserted { id: String },
    Replaced { id: String },
    Removed { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&ListChange) + Send>;

/// Outbound side of local mutations: announces a delta to other sessions.
pub trait Broadcaster {
    /// Returns whether the event left this process.
    fn broadcast(&self, event: &str, payload: Value) -> bool;
}

impl Broadcaster for ConnectionManager {
    fn broadcast(&self, event: &str, payload: Value) -> bool {
        self.emit(event, payload, None)
    }
}

pub struct LiveList<E: Entity> {
    items: Vec<E>,
    /// Position of every id in `items`.
    index: HashMap<String, usize>,
    view: ViewState,
    context: SearchContext,
    loading: bool,
    error: Option<String>,
    mutation: MutationState,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl<E: Entity> Default for LiveList<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            view: ViewState::default(),
            context: SearchContext::default(),
            loading: false,
            error: None,
            mutation: MutationState::Idle,
            observers: Vec::new(),
            next_observer: 0,
        }
    }
}

impl<E: Entity> std::fmt::Debug for LiveList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveList")
            .field("kind", &E::KIND)
            .field("len", &self.items.len())
            .field("view", &self.view)
            .field("loading", &self.loading)
            .field("error", &self.error)
            .field("mutation", &self.mutation)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> LiveList<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_view(view: ViewState) -> Self {
        Self { view, ..Self::default() }
    }

    // -------------------------------------------------------------------------
    // accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn items(&self) -> &[E] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&E> {
        self.index.get(id).and_then(|&pos| self.items.get(pos))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Banner text from the last failed load.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn mutation(&self) -> &MutationState {
        &self.mutation
    }

    // -------------------------------------------------------------------------
    // view state
    // -------------------------------------------------------------------------

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.view.set_search(term);
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.view.set_sort(sort);
    }

    pub fn toggle_sort(&mut self, key: &str) {
        self.view.toggle_sort(key);
    }

    pub fn set_page(&mut self, page: usize) {
        self.view.set_page(page);
        self.clamp_page();
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.view.set_page_size(page_size);
    }

    /// Replace the lookup data used for search. Keeps the page in range.
    pub fn set_context(&mut self, context: SearchContext) {
        self.context = context;
        self.clamp_page();
    }

    /// The view for an arbitrary state over this collection.
    #[must_use]
    pub fn recompute_view(&self, state: &ViewState) -> ViewPage<E> {
        compute_view(&self.items, state, &self.context)
    }

    /// The view for this list's own state.
    #[must_use]
    pub fn current_view(&self) -> ViewPage<E> {
        self.recompute_view(&self.view)
    }

    fn clamp_page(&mut self) {
        let total = count_matches(&self.items, &self.view, &self.context);
        self.view.clamp_to(total);
    }

    // -------------------------------------------------------------------------
    // observers
    // -------------------------------------------------------------------------

    /// Register a callback run after every collection change.
    pub fn observe(&mut self, observer: impl FnMut(&ListChange) + Send + 'static) -> ObserverId {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    fn notify(&mut self, change: &ListChange) {
        for (_, observer) in &mut self.observers {
            observer(change);
        }
    }

    // -------------------------------------------------------------------------
    // reconciliation
    // -------------------------------------------------------------------------

    /// Replace the whole collection and go back to page 1. Duplicate ids keep
    /// their first occurrence.
    pub fn replace_all(&mut self, items: Vec<E>) {
        self.items.clear();
        self.index.clear();
        for item in items {
            if !self.index.contains_key(item.id()) {
                self.index.insert(item.id().to_owned(), self.items.len());
                self.items.push(item);
            }
        }
        self.view.set_page(1);
        self.error = None;
        let count = self.items.len();
        self.notify(&ListChange::Loaded { count });
    }

    /// Fetch the collection over REST.
    ///
    /// On failure the current items stay as they were and the error text is
    /// kept for display.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn load<A>(&mut self, api: &A) -> Result<usize, ApiError>
    where
        A: EntityApi<E> + ?Sized,
    {
        self.loading = true;
        let result = api.list().await;
        self.loading = false;
        match result {
            Ok(items) => {
                self.replace_all(items);
                debug!(kind = %E::KIND, count = self.items.len(), "collection loaded");
                Ok(self.items.len())
            }
            Err(error) => {
                warn!(kind = %E::KIND, error = %error, "collection load failed");
                self.error = Some(error.message());
                Err(error)
            }
        }
    }

    fn upsert(&mut self, entity: E) {
        let id = entity.id().to_owned();
        let change = if let Some(slot) = self.index.get(&id).copied().and_then(|pos| self.items.get_mut(pos)) {
            *slot = entity;
            ListChange::Replaced { id }
        } else {
            for pos in self.index.values_mut() {
                *pos += 1;
            }
            self.index.insert(id.clone(), 0);
            self.items.insert(0, entity);
            ListChange::Inserted { id }
        };
        debug!(kind = %E::KIND, ?change, "upsert");
        self.clamp_page();
        self.notify(&change);
    }

    /// Insert, or replace if the id is already known.
    pub fn apply_created(&mut self, entity: E) {
        self.upsert(entity);
    }

    /// Replace, or insert if the id is unknown.
    pub fn apply_updated(&mut self, entity: E) {
        self.upsert(entity);
    }

    /// Remove the entity if present. Returns whether anything was removed.
    pub fn apply_deleted(&mut self, id: &str) -> bool {
        let Some(removed) = self.index.remove(id) else {
            return false;
        };
        self.items.remove(removed);
        for pos in self.index.values_mut() {
            if *pos > removed {
                *pos -= 1;
            }
        }
        debug!(kind = %E::KIND, id, "removed");
        self.clamp_page();
        self.notify(&ListChange::Removed { id: id.to_owned() });
        true
    }

    pub fn apply(&mut self, delta: Delta<E>) {
        match delta {
            Delta::Created(entity) => self.apply_created(entity),
            Delta::Updated(entity) => self.apply_updated(entity),
            Delta::Deleted(id) => {
                self.apply_deleted(&id);
            }
        }
    }

    // -------------------------------------------------------------------------
    // local mutations
    // -------------------------------------------------------------------------

    fn announce(broadcaster: &(impl Broadcaster + ?Sized), delta: &Delta<E>) {
        let event = delta.event_name();
        if !broadcaster.broadcast(&event, delta.payload()) {
            debug!(event = %event, "delta not broadcast; peers will see it on their next load");
        }
    }

    fn settle<T>(&mut self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        match &result {
            Ok(_) => self.mutation = MutationState::Succeeded,
            Err(error) => {
                warn!(kind = %E::KIND, error = %error, "mutation failed");
                self.mutation = MutationState::Failed(error.message());
            }
        }
        result
    }

    /// Create over REST, then insert locally and broadcast `<kind>Created`.
    ///
    /// # Errors
    ///
    /// Returns the REST error; the collection is left untouched.
    pub async fn create<A, B>(&mut self, api: &A, broadcaster: &B, data: &Value) -> Result<E, ApiError>
    where
        A: EntityApi<E> + ?Sized,
        B: Broadcaster + ?Sized,
    {
        self.mutation = MutationState::InFlight;
        let result = api.create(data).await.map(|entity| {
            let delta = Delta::Created(entity.clone());
            self.apply_created(entity.clone());
            Self::announce(broadcaster, &delta);
            entity
        });
        self.settle(result)
    }

    /// Update over REST, then replace locally and broadcast `<kind>Updated`.
    ///
    /// # Errors
    ///
    /// Returns the REST error; the collection is left untouched.
    pub async fn update<A, B>(&mut self, api: &A, broadcaster: &B, id: &str, data: &Value) -> Result<E, ApiError>
    where
        A: EntityApi<E> + ?Sized,
        B: Broadcaster + ?Sized,
    {
        self.mutation = MutationState::InFlight;
        let result = api.update(id, data).await.map(|entity| {
            let delta = Delta::Updated(entity.clone());
            self.apply_updated(entity.clone());
            Self::announce(broadcaster, &delta);
            entity
        });
        self.settle(result)
    }

    /// Delete over REST, then remove locally and broadcast `<kind>Deleted`.
    ///
    /// # Errors
    ///
    /// Returns the REST error; the collection is left untouched.
    pub async fn delete<A, B>(&mut self, api: &A, broadcaster: &B, id: &str) -> Result<(), ApiError>
    where
        A: EntityApi<E> + ?Sized,
        B: Broadcaster + ?Sized,
    {
        self.mutation = MutationState::InFlight;
        let result = api.delete(id).await.map(|()| {
            self.apply_deleted(id);
            Self::announce(broadcaster, &Delta::<E>::Deleted(id.to_owned()));
        });
        self.settle(result)
    }
}
