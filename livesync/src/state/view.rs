//! Derived view of a collection: search, stable sort, and pagination.
//!
//! `compute_view` is a pure function of the collection, the view state, and
//! the search context. Calling it twice with the same inputs yields the same
//! page.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use std::cmp::Ordering;
use std::collections::HashMap;

use super::entities::Employee;
use super::entity::{Entity, SortValue};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Lookup data some kinds need to search or sort, such as contract employee
/// names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchContext {
    employee_names: HashMap<String, String>,
}

impl SearchContext {
    #[must_use]
    pub fn from_employees(employees: &[Employee]) -> Self {
        let mut ctx = Self::default();
        for employee in employees {
            ctx.insert_employee(employee);
        }
        ctx
    }

    pub fn insert_employee(&mut self, employee: &Employee) {
        self.employee_names.insert(employee.id.clone(), employee.display_name());
    }

    pub fn remove_employee(&mut self, id: &str) {
        self.employee_names.remove(id);
    }

    #[must_use]
    pub fn employee_name(&self, id: &str) -> Option<&str> {
        self.employee_names.get(id).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    #[must_use]
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self { key: key.into(), direction }
    }
}

/// Search term, sort, and page of one list view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewState {
    pub search: String,
    pub sort: Option<SortSpec>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { search: String::new(), sort: None, page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl ViewState {
    /// Set the search term. A different term resets to page 1.
    pub fn set_search(&mut self, term: impl Into<String>) {
        let term = term.into();
        if term != self.search {
            self.search = term;
            self.page = 1;
        }
    }

    /// Set or clear the sort. Always resets to page 1.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
        self.page = 1;
    }

    /// Column-header behaviour: same key flips direction, a new key sorts
    /// ascending. Resets to page 1.
    pub fn toggle_sort(&mut self, key: &str) {
        let direction = match &self.sort {
            Some(current) if current.key == key => current.direction.flipped(),
            _ => SortDirection::Ascending,
        };
        self.set_sort(Some(SortSpec::new(key, direction)));
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Change the page size. Resets to page 1.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// Pull the current page back into range after the match count changed.
    pub fn clamp_to(&mut self, total_matches: usize) {
        self.page = self.page.clamp(1, last_page(total_matches, self.page_size));
    }

    /// Lowercased, trimmed search term.
    #[must_use]
    pub fn needle(&self) -> String {
        self.search.trim().to_lowercase()
    }
}

/// One rendered page.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewPage<E> {
    pub items: Vec<E>,
    /// Page actually shown, after clamping.
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

/// Last valid 1-based page for `total` items. An empty list still has page 1.
#[must_use]
pub fn last_page(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

#[must_use]
pub fn count_matches<E: Entity>(items: &[E], state: &ViewState, ctx: &SearchContext) -> usize {
    let needle = state.needle();
    items.iter().filter(|item| item.matches(&needle, ctx)).count()
}

/// Order two sort values. Missing values sort after present ones in either
/// direction; equal values keep input order.
fn compare(a: &SortValue, b: &SortValue, direction: SortDirection) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            SortDirection::Ascending => a.compare(b),
            SortDirection::Descending => b.compare(a),
        },
    }
}

/// Filter, sort, and slice `items` for `state`.
#[must_use]
pub fn compute_view<E: Entity>(items: &[E], state: &ViewState, ctx: &SearchContext) -> ViewPage<E> {
    let needle = state.needle();
    let mut matched: Vec<&E> = items.iter().filter(|item| item.matches(&needle, ctx)).collect();

    if let Some(sort) = &state.sort {
        let mut keyed: Vec<(SortValue, &E)> =
            matched.into_iter().map(|item| (item.sort_value(&sort.key, ctx), item)).collect();
        keyed.sort_by(|(a, _), (b, _)| compare(a, b, sort.direction));
        matched = keyed.into_iter().map(|(_, item)| item).collect();
    }

    let page_size = state.page_size.max(1);
    let total_matches = matched.len();
    let total_pages = last_page(total_matches, page_size);
    let page = state.page.clamp(1, total_pages);
    let items = matched.into_iter().skip((page - 1) * page_size).take(page_size).cloned().collect();

    ViewPage { items, page, total_pages, total_matches }
}
