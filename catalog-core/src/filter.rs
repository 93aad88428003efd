//! Filter, sort and pagination types for catalog listings
//!
//! Filters split into two groups: attribute predicates the backing store can
//! evaluate during a scan ([`FilterExpr`]), and predicates only the store can
//! evaluate on a decoded definition (labels, engines, active-only).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ComponentDefinition, Maturity, SemanticVersion, SortField, SortOrder};

/// Filter operator for attribute comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    BeginsWith,
    Contains,
}

/// One attribute predicate pushed down to the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpr {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    pub fn begins_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::BeginsWith, value)
    }

    /// Evaluate against an item's attributes. A missing attribute only
    /// satisfies `Ne`.
    pub fn evaluate(&self, attributes: &BTreeMap<String, String>) -> bool {
        match (attributes.get(&self.field), self.operator) {
            (None, FilterOperator::Ne) => true,
            (None, _) => false,
            (Some(actual), FilterOperator::Eq) => actual == &self.value,
            (Some(actual), FilterOperator::Ne) => actual != &self.value,
            (Some(actual), FilterOperator::BeginsWith) => actual.starts_with(&self.value),
            (Some(actual), FilterOperator::Contains) => actual.contains(&self.value),
        }
    }
}

/// Filters accepted by listing and search operations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListFilters {
    #[serde(default)]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub maturity: Option<Maturity>,
    /// Every pair must match exactly.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub engine: Option<String>,
    /// Exclude anything for which `is_deprecated()` holds.
    #[serde(default)]
    pub active_only: bool,
}

impl ListFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    /// Predicates the backing store can evaluate on indexed attributes.
    pub fn pushdown(&self) -> Vec<FilterExpr> {
        let mut exprs = Vec::new();
        if let Some(prefix) = &self.name_prefix {
            exprs.push(FilterExpr::begins_with("name", prefix.clone()));
        }
        if let Some(provider) = &self.provider {
            exprs.push(FilterExpr::eq("provider", provider.clone()));
        }
        if let Some(category) = &self.category {
            exprs.push(FilterExpr::eq("category", category.clone()));
        }
        if let Some(sub_category) = &self.sub_category {
            exprs.push(FilterExpr::eq("sub_category", sub_category.clone()));
        }
        if let Some(resource_type) = &self.resource_type {
            exprs.push(FilterExpr::eq("resource_type", resource_type.clone()));
        }
        if let Some(maturity) = &self.maturity {
            exprs.push(FilterExpr::eq("maturity", maturity.as_db_str()));
        }
        exprs
    }

    /// Predicates evaluated by the store after decoding.
    pub fn matches_post(&self, definition: &ComponentDefinition) -> bool {
        if self.active_only && definition.is_deprecated() {
            return false;
        }
        if let Some(engine) = &self.engine {
            if !definition.supports_engine(engine) {
                return false;
            }
        }
        self.labels.iter().all(|(k, v)| definition.has_label(k, v))
    }
}

/// Requested ordering of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    pub fn compare(&self, a: &ComponentDefinition, b: &ComponentDefinition) -> Ordering {
        let (ma, mb) = (&a.metadata, &b.metadata);
        let primary = match self.field {
            SortField::Name => ma.name.cmp(&mb.name),
            SortField::Provider => ma.provider.cmp(&mb.provider),
            SortField::Category => ma.category.cmp(&mb.category),
            SortField::CreatedAt => ma.created_at.cmp(&mb.created_at),
            SortField::UpdatedAt => ma.updated_at.cmp(&mb.updated_at),
            SortField::Version => compare_versions(&ma.version, &mb.version),
            SortField::Maturity => ma.maturity.cmp(&mb.maturity),
        };
        // Deterministic tie-break on identity.
        let ordering = primary
            .then_with(|| ma.name.cmp(&mb.name))
            .then_with(|| compare_versions(&ma.version, &mb.version));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    pub fn apply(&self, definitions: &mut [ComponentDefinition]) {
        definitions.sort_by(|a, b| self.compare(a, b));
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (SemanticVersion::parse(a), SemanticVersion::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Opaque continuation token handed out with a page.
///
/// Callers pass it back verbatim; its contents are private to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    /// Wrap a token string received back from a client.
    pub fn from_opaque(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page size, resume token and ordering for a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub token: Option<PageToken>,
    /// Applied within the returned page; scan order decides page membership.
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

impl PageRequest {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            token: None,
            sort: None,
        }
    }

    pub fn next(&self, token: PageToken) -> Self {
        Self {
            page_size: self.page_size,
            token: Some(token),
            sort: self.sort,
        }
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// One page of results plus the token to fetch the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<PageToken>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
