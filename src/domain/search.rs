//! Typed search over stored records
//!
//! A [`Query`] is built from the wire-level [`SearchOptions`] envelope, or directly through
//! its builder methods, and then evaluated against any [`Searchable`] item.

use std::{cmp::Ordering, fmt::Debug, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Search, filter and pagination envelope accepted by the search endpoints
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub dir: SortDirection,
    #[serde(default)]
    pub search_term: Option<String>,
    /// Every `{ field: value }` pair must match
    #[serde(default)]
    pub filter_by: Vec<Map<String, Value>>,
    /// Inclusive bounds on the creation date
    #[serde(default)]
    pub filter_by_date_from: Option<NaiveDate>,
    #[serde(default)]
    pub filter_by_date_to: Option<NaiveDate>,
}

fn default_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: None,
            dir: SortDirection::default(),
            search_term: None,
            filter_by: Vec::new(),
            filter_by_date_from: None,
            filter_by_date_to: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Page size must be at least 1")]
    EmptyPage,
}

/// Field enum of a searchable record
pub trait SearchField: Copy + Debug + PartialEq + FromStr<Err = QueryError> + Send + Sync + 'static {
    /// Sort key used when the caller does not pick one
    const CREATED_AT: Self;
}

/// Value of a record field, used for filtering and sorting
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum FieldValue {
    Null,
    Number(i64),
    Text(String),
    Time(DateTime<Utc>),
    Id(Uuid),
}

impl FieldValue {
    /// Compare against a JSON filter value
    pub fn matches(&self, expected: &Value) -> bool {
        match (self, expected) {
            (FieldValue::Null, Value::Null) => true,
            (FieldValue::Number(n), Value::Number(v)) => v.as_i64() == Some(*n),
            (FieldValue::Number(n), Value::String(s)) => s.parse::<i64>().ok() == Some(*n),
            (FieldValue::Text(t), Value::String(s)) => t == s,
            (FieldValue::Time(t), Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|parsed| parsed.with_timezone(&Utc) == *t)
                .unwrap_or(false),
            (FieldValue::Id(id), Value::String(s)) => {
                Uuid::parse_str(s).map(|parsed| parsed == *id).unwrap_or(false)
            }
            _ => false,
        }
    }
}

pub trait Searchable {
    type Field: SearchField;

    fn field(&self, field: Self::Field) -> FieldValue;

    /// Whether any free-text field contains `term`, which is already lowercased
    fn matches_term(&self, term: &str) -> bool;

    /// User owning the record, if any
    fn owner(&self) -> Option<Uuid>;

    fn created_at(&self) -> DateTime<Utc>;
}

/// Case-insensitive substring match, `term` must be lowercase
pub fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.to_lowercase().contains(term)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter<F> {
    pub field: F,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query<F> {
    owner: Option<Uuid>,
    filters: Vec<Filter<F>>,
    term: Option<String>,
    created_from: Option<NaiveDate>,
    created_to: Option<NaiveDate>,
    sort: F,
    dir: SortDirection,
    offset: usize,
    size: usize,
}

impl<F: SearchField> Default for Query<F> {
    fn default() -> Self {
        Self {
            owner: None,
            filters: Vec::new(),
            term: None,
            created_from: None,
            created_to: None,
            sort: F::CREATED_AT,
            dir: SortDirection::Desc,
            offset: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl<F: SearchField> Query<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: SearchOptions) -> Result<Self, QueryError> {
        if options.size == 0 {
            return Err(QueryError::EmptyPage);
        }

        let sort = match options.sort.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.parse()?,
            _ => F::CREATED_AT,
        };

        let mut query = Self::new()
            .sort_by(sort, options.dir)
            .paginate(options.offset, options.size)
            .created_between(options.filter_by_date_from, options.filter_by_date_to);

        for filter in options.filter_by {
            for (name, value) in filter {
                query = query.filter(name.parse()?, value);
            }
        }

        if let Some(term) = options.search_term {
            query = query.search(term);
        }

        Ok(query)
    }

    /// Restrict results to records owned by `user_id`
    pub fn owned_by(mut self, user_id: Uuid) -> Self {
        self.owner = Some(user_id);
        self
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.owner
    }

    pub fn filter(mut self, field: F, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            value: value.into(),
        });
        self
    }

    /// Blank terms are ignored
    pub fn search(mut self, term: impl AsRef<str>) -> Self {
        let term = term.as_ref().trim();
        self.term = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    pub fn created_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn sort_by(mut self, field: F, dir: SortDirection) -> Self {
        self.sort = field;
        self.dir = dir;
        self
    }

    pub fn paginate(mut self, offset: usize, size: usize) -> Self {
        self.offset = offset;
        self.size = size;
        self
    }

    pub fn matches<T>(&self, item: &T) -> bool
    where
        T: Searchable<Field = F>,
    {
        if let Some(owner) = self.owner {
            if item.owner() != Some(owner) {
                return false;
            }
        }

        if !self
            .filters
            .iter()
            .all(|filter| item.field(filter.field).matches(&filter.value))
        {
            return false;
        }

        if let Some(term) = &self.term {
            if !item.matches_term(term) {
                return false;
            }
        }

        let created_on = item.created_at().date_naive();
        if self.created_from.map_or(false, |from| created_on < from) {
            return false;
        }
        if self.created_to.map_or(false, |to| created_on > to) {
            return false;
        }

        true
    }

    /// Filter, sort and paginate `items`
    pub fn apply<T, I>(&self, items: I) -> Page<T>
    where
        T: Searchable<Field = F>,
        I: IntoIterator<Item = T>,
    {
        let mut matched: Vec<T> = items.into_iter().filter(|item| self.matches(item)).collect();

        matched.sort_by(|a, b| {
            let ordering = a
                .field(self.sort)
                .partial_cmp(&b.field(self.sort))
                .unwrap_or(Ordering::Equal);
            match self.dir {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let count = matched.len();
        let content = matched
            .into_iter()
            .skip(self.offset)
            .take(self.size)
            .collect();

        Page { content, count }
    }
}

/// One page of search results
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    /// Number of matches before pagination
    pub count: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            count: self.count,
        }
    }
}
