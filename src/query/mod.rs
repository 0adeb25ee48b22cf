//! Query-string construction for record listing and search.
//!
//! A [`FilterSet`] collects predicates, the relation between them, sorting
//! and a page window. [`build_query_string`] renders it in the order the
//! server expects:
//!
//! ```text
//! field__op=value[&field__op=value...][&searchOperator=AND|OR][&from=N&to=M][&sortBy=f][&order=ASC|DESC]
//! ```
//!
//! # Example
//!
//! ```
//! use forms_client::query::{FilterOperator, FilterSet, Relation, build_query_string};
//!
//! # fn main() -> Result<(), forms_client::ApiError> {
//! let mut filters = FilterSet::new();
//! filters.add_filter("F_Owner", FilterOperator::Contains, "Dawes")?;
//! filters.add_filter("F_Owner", FilterOperator::Contains, "Jones")?;
//! filters.set_relation(Relation::AtLeastOneMatches);
//! assert_eq!(
//!     build_query_string(&filters),
//!     "?F_Owner__contains=Dawes&F_Owner__contains=Jones&searchOperator=OR"
//! );
//! # Ok(())
//! # }
//! ```

mod filter;

pub use filter::{FilterOperator, FilterPredicate, MetaColumn, Relation, SortOrder};

use tracing::debug;

use crate::error::ApiError;

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Filters, sorting and paging for a list request.
///
/// Paging methods move the `from`/`to` window by `page_size`, keeping
/// `to - from == page_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    predicates: Vec<FilterPredicate>,
    relation: Option<Relation>,
    sort_by: Option<String>,
    order: Option<SortOrder>,
    from: Option<u32>,
    to: Option<u32>,
    page_size: u32,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSet {
    /// Creates an empty filter set with the default page size and no window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
            relation: None,
            sort_by: None,
            order: None,
            from: None,
            to: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Appends an already-built predicate.
    pub fn push(&mut self, predicate: FilterPredicate) {
        self.predicates.push(predicate);
    }

    /// Builds and appends a predicate.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidFilterField`] if `field` contains a space.
    pub fn add_filter(
        &mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: &str,
    ) -> Result<(), ApiError> {
        self.predicates
            .push(FilterPredicate::new(field, operator, value)?);
        Ok(())
    }

    #[must_use]
    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    pub fn set_relation(&mut self, relation: Relation) {
        self.relation = Some(relation);
    }

    #[must_use]
    pub fn relation(&self) -> Option<Relation> {
        self.relation
    }

    pub fn set_sort_by(&mut self, sort_by: impl Into<String>) {
        self.sort_by = Some(sort_by.into());
    }

    #[must_use]
    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    pub fn set_order(&mut self, order: SortOrder) {
        self.order = Some(order);
    }

    #[must_use]
    pub fn order(&self) -> Option<SortOrder> {
        self.order
    }

    pub fn set_from(&mut self, from: u32) {
        self.from = Some(from);
    }

    #[must_use]
    pub fn from(&self) -> Option<u32> {
        self.from
    }

    pub fn set_to(&mut self, to: u32) {
        self.to = Some(to);
    }

    #[must_use]
    pub fn to(&self) -> Option<u32> {
        self.to
    }

    /// Sets the page size and resets the window to the first page.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size;
        self.first_page();
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Moves the window forward one page. An unset window counts as the
    /// first page.
    pub fn next_page(&mut self) {
        let from = self.from.unwrap_or(0);
        let to = self.to.unwrap_or(self.page_size);
        self.from = Some(from.saturating_add(self.page_size));
        self.to = Some(to.saturating_add(self.page_size));
    }

    /// Moves the window back one page; a no-op when that would make `from`
    /// negative or `to` is already below one page.
    pub fn previous_page(&mut self) {
        let (Some(from), Some(to)) = (self.from, self.to) else {
            return;
        };
        if to >= self.page_size && from > 0 {
            if let Some(previous) = from.checked_sub(self.page_size) {
                self.from = Some(previous);
                self.to = Some(to - self.page_size);
            }
        }
    }

    pub fn first_page(&mut self) {
        self.from = Some(0);
        self.to = Some(self.page_size);
    }

    /// Same as [`first_page`](Self::first_page).
    pub fn reset(&mut self) {
        self.first_page();
    }
}

/// Renders a filter set as a query string starting with `?`.
///
/// Returns an empty string when nothing is set.
#[must_use]
pub fn build_query_string(filters: &FilterSet) -> String {
    let mut query = String::new();

    for predicate in &filters.predicates {
        query = add_url_param(&query, &predicate.to_string());
    }

    if filters.predicates.len() > 1
        && let Some(relation) = filters.relation
    {
        query = add_url_param(&query, &format!("searchOperator={relation}"));
    }

    if let (Some(from), Some(to)) = (filters.from, filters.to) {
        query = add_url_param(&query, &format!("from={from}&to={to}"));
    }

    if let Some(sort_by) = &filters.sort_by {
        query = add_url_param(&query, &format!("sortBy={sort_by}"));
    }

    if let Some(order) = filters.order {
        query = add_url_param(&query, &format!("order={order}"));
    }

    debug!(query = %query, "built filter query string");
    query
}

/// Appends `param` to `url`, preceded by `?` for the first parameter and `&`
/// afterwards. Empty params leave the url unchanged.
#[must_use]
pub fn add_url_param(url: &str, param: &str) -> String {
    if param.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{param}")
}
