//! Cascading invalidation of cached queries.
//!
//! Dependencies between data types live in one static table,
//! [`related_types`]. An invalidation request expands into the entity's own key
//! followed by one key per dependent type; dependents are not expanded further.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::Date;
use tracing::{debug, info};

use crate::domain::types::MealSlot;

use super::keys::{self, DataType, QueryKey};

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("failed to invalidate {key}: {message}")]
    Invalidation { key: QueryKey, message: String },
    #[error("query cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn invalidation(key: &QueryKey, message: impl Into<String>) -> Self {
        Self::Invalidation {
            key: key.clone(),
            message: message.into(),
        }
    }
}

/// The only operation the invalidation layer needs from a query cache.
#[async_trait]
pub trait QueryInvalidator: Send + Sync {
    /// Mark every entry whose key starts with `key` as stale.
    async fn invalidate_queries(&self, key: &QueryKey) -> Result<(), CacheError>;
}

/// Data types that must be refreshed whenever `data_type` changes.
pub fn related_types(data_type: DataType) -> &'static [DataType] {
    match data_type {
        DataType::Plan => &[
            DataType::NutritionGoals,
            DataType::DailyNutrition,
            DataType::MealSlots,
        ],
        DataType::Meal => &[DataType::MealsList],
        DataType::DailyPlan => &[DataType::DailyNutrition, DataType::MealSlots],
        DataType::DailyProgress => &[DataType::ProgressList],
        DataType::Ingredient => &[DataType::IngredientsList],
        DataType::PlansList
        | DataType::NutritionGoals
        | DataType::DailyNutrition
        | DataType::MealSlots
        | DataType::MealsList
        | DataType::ProgressList
        | DataType::IngredientsList => &[],
    }
}

/// Parameters narrowing an invalidation. Missing parts widen the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationScope {
    pub id: Option<i64>,
    pub date: Option<Date>,
    pub slot: Option<MealSlot>,
}

impl InvalidationScope {
    /// Covers every entry of the type.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_slot(mut self, slot: MealSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Key addressed by this scope for `data_type`.
    pub fn key_for(&self, data_type: DataType) -> QueryKey {
        let Some(id) = self.id else {
            return QueryKey::tag_of(data_type);
        };
        match data_type {
            DataType::Plan => keys::plan(id),
            DataType::PlansList => keys::plans_list(),
            DataType::NutritionGoals => keys::nutrition_goals(id),
            DataType::DailyNutrition => match self.date {
                Some(date) => keys::daily_nutrition(id, date),
                None => keys::daily_nutrition_for_plan(id),
            },
            DataType::MealSlots => match (self.date, self.slot) {
                (Some(date), Some(slot)) => keys::meals_by_slot(id, date, slot),
                (date, _) => keys::meals_by_slot_for_day(id, date),
            },
            DataType::DailyPlan => keys::daily_plan(id),
            DataType::Meal => keys::meal(id),
            DataType::MealsList => keys::meals_list(),
            DataType::DailyProgress => keys::daily_progress(id),
            DataType::ProgressList => keys::progress_list(id),
            DataType::Ingredient => keys::ingredient(id),
            DataType::IngredientsList => keys::ingredients_list(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub data_type: DataType,
    pub scope: InvalidationScope,
    pub invalidate_related: bool,
}

impl InvalidationRequest {
    pub fn new(data_type: DataType, scope: InvalidationScope) -> Self {
        Self {
            data_type,
            scope,
            invalidate_related: false,
        }
    }

    /// Also invalidate the dependents declared in [`related_types`].
    pub fn related(mut self) -> Self {
        self.invalidate_related = true;
        self
    }

    /// Own key first, then dependents in table order, without duplicates.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys = vec![self.scope.key_for(self.data_type)];
        if self.invalidate_related {
            for dependent in related_types(self.data_type) {
                let key = self.scope.key_for(*dependent);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

/// Expands invalidation requests and forwards each key to the cache.
#[derive(Clone)]
pub struct InvalidationHelper {
    invalidator: Arc<dyn QueryInvalidator>,
}

impl InvalidationHelper {
    pub fn new(invalidator: Arc<dyn QueryInvalidator>) -> Self {
        Self { invalidator }
    }

    pub fn keys_for(&self, request: &InvalidationRequest) -> Vec<QueryKey> {
        request.keys()
    }

    /// Invalidate every key of `request` in order. Stops at the first failure.
    pub async fn invalidate(&self, request: &InvalidationRequest) -> Result<usize, CacheError> {
        let keys = request.keys();
        info!(
            category = "cache",
            data_type = %request.data_type,
            related = request.invalidate_related,
            key_count = keys.len(),
            "Invalidating cached queries"
        );
        for key in &keys {
            self.invalidate_key(key).await?;
        }
        Ok(keys.len())
    }

    pub async fn invalidate_key(&self, key: &QueryKey) -> Result<(), CacheError> {
        debug!(category = "cache", key = %key, "Invalidating query key");
        self.invalidator.invalidate_queries(key).await
    }
}
