//! Descriptors for dataset item searches.
//!
//! A [`DatasetItemSearchCriteria`] names a dataset, the experiments the search
//! is scoped to and the kind of entity being searched, plus an optional list of
//! filters. It is built once and handed to a [`DatasetItemRetriever`]; how the
//! filters combine and how `truncate` shortens content is up to the retriever.

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// The kind of dataset-linked entity being searched.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Trace,
    Span,
}

/// Comparison applied by a filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum Operator {
    #[serde(rename = "contains")]
    #[strum(serialize = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    #[strum(serialize = "not_contains")]
    NotContains,
    #[serde(rename = "starts_with")]
    #[strum(serialize = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    #[strum(serialize = "ends_with")]
    EndsWith,
    #[serde(rename = "=")]
    #[strum(serialize = "=")]
    Equal,
    #[serde(rename = "!=")]
    #[strum(serialize = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    #[strum(serialize = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[serde(rename = "<")]
    #[strum(serialize = "<")]
    LessThan,
    #[serde(rename = "<=")]
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[serde(rename = "is_empty")]
    #[strum(serialize = "is_empty")]
    IsEmpty,
    #[serde(rename = "is_not_empty")]
    #[strum(serialize = "is_not_empty")]
    IsNotEmpty,
}

/// A single search condition. The criteria carry filters without inspecting
/// them; only the retriever interprets them.
pub trait Filter: fmt::Debug + Send + Sync {
    fn field(&self) -> &str;
    fn operator(&self) -> Operator;
    /// Selects a nested entry of `field`, e.g. a key of a JSON column
    fn key(&self) -> Option<&str>;
    fn value(&self) -> &str;
}

/// The filter shape accepted over the wire.
///
/// ```json
/// {"field": "feedback_scores", "operator": ">=", "key": "accuracy", "value": "0.8"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub value: String,
}

impl FieldFilter {
    pub fn new<F: Into<String>, V: Into<String>>(
        field: F,
        operator: Operator,
        value: V,
    ) -> FieldFilter {
        FieldFilter {
            field: field.into(),
            operator,
            key: None,
            value: value.into(),
        }
    }

    pub fn with_key<K: Into<String>>(mut self, key: K) -> FieldFilter {
        self.key = Some(key.into());
        self
    }
}

impl Filter for FieldFilter {
    fn field(&self) -> &str {
        &self.field
    }

    fn operator(&self) -> Operator {
        self.operator
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn value(&self) -> &str {
        &self.value
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),
}

/// Which dataset items to retrieve. Instances are never modified: use
/// [`to_builder`](Self::to_builder) or [`with_truncate`](Self::with_truncate)
/// to derive a new one.
#[derive(Debug, Clone)]
pub struct DatasetItemSearchCriteria {
    dataset_id: Uuid,
    experiment_ids: BTreeSet<Uuid>,
    entity_type: EntityType,
    filters: Vec<Arc<dyn Filter>>,
    truncate: bool,
}

impl DatasetItemSearchCriteria {
    pub fn builder() -> DatasetItemSearchCriteriaBuilder {
        DatasetItemSearchCriteriaBuilder::default()
    }

    /// A builder holding every field of `self`.
    pub fn to_builder(&self) -> DatasetItemSearchCriteriaBuilder {
        DatasetItemSearchCriteriaBuilder {
            dataset_id: Some(self.dataset_id),
            experiment_ids: Some(self.experiment_ids.clone()),
            entity_type: Some(self.entity_type),
            filters: Some(self.filters.clone()),
            truncate: self.truncate,
        }
    }

    pub fn with_truncate(&self, truncate: bool) -> DatasetItemSearchCriteria {
        DatasetItemSearchCriteria {
            truncate,
            ..self.clone()
        }
    }

    pub fn dataset_id(&self) -> Uuid {
        self.dataset_id
    }

    pub fn experiment_ids(&self) -> &BTreeSet<Uuid> {
        &self.experiment_ids
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn truncate(&self) -> bool {
        self.truncate
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetItemSearchCriteriaBuilder {
    dataset_id: Option<Uuid>,
    experiment_ids: Option<BTreeSet<Uuid>>,
    entity_type: Option<EntityType>,
    filters: Option<Vec<Arc<dyn Filter>>>,
    truncate: bool,
}

impl DatasetItemSearchCriteriaBuilder {
    pub fn dataset_id(mut self, dataset_id: Uuid) -> Self {
        self.dataset_id = Some(dataset_id);
        self
    }

    /// Replaces the experiment scope. Duplicates collapse.
    pub fn experiment_ids<I: IntoIterator<Item = Uuid>>(mut self, experiment_ids: I) -> Self {
        self.experiment_ids = Some(experiment_ids.into_iter().collect());
        self
    }

    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn filters<I: IntoIterator<Item = Arc<dyn Filter>>>(mut self, filters: I) -> Self {
        self.filters = Some(filters.into_iter().collect());
        self
    }

    /// Appends one filter after those already set.
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters
            .get_or_insert_with(Vec::new)
            .push(Arc::new(filter));
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn build(self) -> Result<DatasetItemSearchCriteria, CriteriaError> {
        Ok(DatasetItemSearchCriteria {
            dataset_id: self
                .dataset_id
                .ok_or(CriteriaError::MissingField("dataset_id"))?,
            experiment_ids: self
                .experiment_ids
                .ok_or(CriteriaError::MissingField("experiment_ids"))?,
            entity_type: self
                .entity_type
                .ok_or(CriteriaError::MissingField("entity_type"))?,
            filters: self.filters.unwrap_or_default(),
            truncate: self.truncate,
        })
    }
}

/// An item of a dataset, as returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub data: Value,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("dataset \"{0}\" does not exist")]
    DatasetNotFound(Uuid),
    #[error("filter on \"{field}\" is not supported: {reason}")]
    UnsupportedFilter { field: String, reason: String },
    #[error("dataset item retrieval failed")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

/// The storage backend which executes searches.
#[async_trait]
pub trait DatasetItemRetriever: Send + Sync {
    async fn search(
        &self,
        criteria: &DatasetItemSearchCriteria,
    ) -> Result<Vec<DatasetItem>, RetrievalError>;
}
