//! Filter predicates and the vocabulary used to build them.

use std::fmt;

use tracing::debug;

use crate::error::ApiError;

/// Comparison applied by a [`FilterPredicate`].
///
/// The wire form is the suffix after the double underscore in
/// `field__operator=value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Before,
    After,
    Between,
    YearMatches,
    MonthMatches,
    DayMatches,
}

impl FilterOperator {
    /// Returns the operator as the server expects it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notequals",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Contains => "contains",
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThanOrEqual => "lte",
            Self::Before => "before",
            Self::After => "after",
            Self::Between => "between",
            Self::YearMatches => "year",
            Self::MonthMatches => "month",
            Self::DayMatches => "day",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterOperator {
    type Err = String;

    /// Parses the wire name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [FilterOperator; 15] = [
            FilterOperator::Equals,
            FilterOperator::NotEquals,
            FilterOperator::StartsWith,
            FilterOperator::EndsWith,
            FilterOperator::Contains,
            FilterOperator::GreaterThan,
            FilterOperator::LessThan,
            FilterOperator::GreaterThanOrEqual,
            FilterOperator::LessThanOrEqual,
            FilterOperator::Before,
            FilterOperator::After,
            FilterOperator::Between,
            FilterOperator::YearMatches,
            FilterOperator::MonthMatches,
            FilterOperator::DayMatches,
        ];
        ALL.into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown filter operator '{s}'"))
    }
}

/// How multiple predicates combine (`searchOperator`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Every predicate must match.
    AllMatch,
    /// At least one predicate must match.
    AtLeastOneMatches,
}

impl Relation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllMatch => "AND",
            Self::AtLeastOneMatches => "OR",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for `order=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record metadata columns that can be filtered or sorted on.
///
/// The `SortBy*` variants are the names accepted by `sortBy=`, which differ
/// from the filterable column names for the same data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaColumn {
    LineId,
    SortByAuthorName,
    AuthorName,
    UpdaterName,
    CreatedTimestamp,
    SortByLastUpdatedTimestamp,
    LastUpdatedTimestamp,
    SortByStageId,
    StageId,
    AppSortByLastUpdatedTimestamp,
    AppSortByTitle,
}

impl MetaColumn {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LineId => "dbId",
            Self::SortByAuthorName => "itemAuthor",
            Self::AuthorName => "author_name",
            Self::UpdaterName => "updater_name",
            Self::CreatedTimestamp => "creation_time",
            Self::SortByLastUpdatedTimestamp => "lastUpdated",
            Self::LastUpdatedTimestamp | Self::AppSortByLastUpdatedTimestamp => "updated",
            Self::SortByStageId => "flowState",
            Self::StageId => "flow_state",
            Self::AppSortByTitle => "name",
        }
    }
}

impl fmt::Display for MetaColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `field__operator=value` term.
///
/// The value is percent-encoded when the predicate is built, so the stored
/// value is already safe to place in a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPredicate {
    field: String,
    operator: FilterOperator,
    value: String,
}

impl FilterPredicate {
    /// Builds a predicate, encoding `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidFilterField`] if `field` contains a space.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: &str,
    ) -> Result<Self, ApiError> {
        let field = field.into();
        if field.contains(' ') {
            return Err(ApiError::invalid_filter_field(field));
        }
        let encoded = urlencoding::encode(value).into_owned();
        debug!(field = %field, operator = %operator, raw = value, encoded = %encoded, "created filter");
        Ok(Self {
            field,
            operator,
            value: encoded,
        })
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// The encoded value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}={}", self.field, self.operator, self.value)
    }
}
