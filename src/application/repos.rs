//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::Date;

use crate::domain::entities::{
    DailyMealProgressRecord, DailyPlanRecord, DailyProgressRecord, IngredientRecord,
    MealComposition, MealIngredientRecord, MealRecord, PlanRecord, PlannedMeal,
    PlannedMealChange, ProgressRef,
};
use crate::domain::nutrition::Macros;
use crate::domain::types::{MealSlot, MealUnit, PlanGoal};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{message}")]
    Missing { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("Database not initialized")]
    NotInitialized,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::Missing {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Failures a caller can act on, as opposed to infrastructure faults.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            RepoError::NotFound { .. }
                | RepoError::Missing { .. }
                | RepoError::Conflict { .. }
                | RepoError::InvalidInput { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            RepoError::NotFound { .. } | RepoError::Missing { .. } => "not_found",
            RepoError::Conflict { .. } => "conflict",
            RepoError::InvalidInput { .. } => "invalid_input",
            RepoError::Persistence(_) => "persistence",
            RepoError::NotInitialized => "not_initialized",
            RepoError::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MealQueryFilter {
    pub slot: Option<MealSlot>,
    pub search: Option<String>,
    pub favorites_only: bool,
}

#[derive(Debug, Clone)]
pub struct CreateMealParams {
    pub name: String,
    pub slot: MealSlot,
    pub unit: MealUnit,
    pub quantity: f64,
    pub macros: Macros,
}

#[derive(Debug, Clone)]
pub struct CreatePlanParams {
    pub name: String,
    pub goal: PlanGoal,
    pub start_date: Date,
    pub duration_weeks: u32,
    pub goals: Macros,
}

#[derive(Debug, Clone)]
pub struct AddPlannedMealParams {
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub quantity: f64,
    /// Defaults to the meal's own slot.
    pub slot: Option<MealSlot>,
}

#[derive(Debug, Clone, Copy)]
pub struct PlannedMealRef {
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub slot: MealSlot,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkConsumedParams {
    pub daily_progress_id: i64,
    pub meal_id: i64,
    pub daily_plan_meal_id: i64,
    pub consumed: bool,
    pub percentage: f64,
}

#[derive(Debug, Clone)]
pub struct CreateIngredientParams {
    pub name: String,
    pub unit: MealUnit,
    pub quantity: f64,
    pub macros: Macros,
}

#[derive(Debug, Clone, Copy)]
pub struct AddMealIngredientParams {
    pub meal_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
}

#[async_trait]
pub trait MealsRepo: Send + Sync {
    async fn create_meal(&self, params: CreateMealParams) -> Result<MealRecord, RepoError>;

    async fn find_meal(&self, id: i64) -> Result<Option<MealRecord>, RepoError>;

    async fn list_meals(&self, filter: &MealQueryFilter) -> Result<Vec<MealRecord>, RepoError>;

    /// Delete a meal, taking its planned entries out of every daily plan total.
    ///
    /// Returns the progress rows recomputed because an entry disappeared.
    async fn delete_meal(&self, id: i64) -> Result<Vec<ProgressRef>, RepoError>;

    async fn set_favorite(&self, id: i64, favorite: bool) -> Result<MealRecord, RepoError>;
}

#[async_trait]
pub trait PlansRepo: Send + Sync {
    /// Create a plan with one daily plan per day of its duration.
    async fn create_plan(&self, params: CreatePlanParams) -> Result<PlanRecord, RepoError>;

    async fn find_plan(&self, id: i64) -> Result<Option<PlanRecord>, RepoError>;

    async fn list_plans(&self) -> Result<Vec<PlanRecord>, RepoError>;

    async fn delete_plan(&self, id: i64) -> Result<(), RepoError>;

    /// Make `id` the only current plan.
    async fn set_current_plan(&self, id: i64) -> Result<PlanRecord, RepoError>;

    async fn current_plan(&self) -> Result<Option<PlanRecord>, RepoError>;

    async fn update_goals(&self, plan_id: i64, goals: Macros) -> Result<PlanRecord, RepoError>;

    async fn list_daily_plans(&self, plan_id: i64) -> Result<Vec<DailyPlanRecord>, RepoError>;

    async fn find_daily_plan(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<Option<DailyPlanRecord>, RepoError>;

    /// Entry writes keep the day's totals and any tracked progress in step.
    async fn add_planned_meal(
        &self,
        params: AddPlannedMealParams,
    ) -> Result<PlannedMealChange, RepoError>;

    async fn remove_planned_meal(
        &self,
        target: PlannedMealRef,
    ) -> Result<PlannedMealChange, RepoError>;

    async fn update_planned_quantity(
        &self,
        target: PlannedMealRef,
        quantity: f64,
    ) -> Result<PlannedMealChange, RepoError>;

    async fn list_planned_meals(
        &self,
        daily_plan_id: i64,
        slot: Option<MealSlot>,
    ) -> Result<Vec<PlannedMeal>, RepoError>;
}

#[async_trait]
pub trait ProgressRepo: Send + Sync {
    async fn get_or_create_daily_progress(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<DailyProgressRecord, RepoError>;

    async fn find_daily_progress(&self, id: i64)
    -> Result<Option<DailyProgressRecord>, RepoError>;

    /// Upsert a meal's consumption and recompute the day's totals.
    async fn mark_meal_consumed(
        &self,
        params: MarkConsumedParams,
    ) -> Result<DailyProgressRecord, RepoError>;

    async fn list_meal_progress(
        &self,
        daily_progress_id: i64,
    ) -> Result<Vec<DailyMealProgressRecord>, RepoError>;

    async fn list_progress_for_plan(
        &self,
        plan_id: i64,
    ) -> Result<Vec<DailyProgressRecord>, RepoError>;
}

#[async_trait]
pub trait IngredientsRepo: Send + Sync {
    async fn create_ingredient(
        &self,
        params: CreateIngredientParams,
    ) -> Result<IngredientRecord, RepoError>;

    async fn find_ingredient(&self, id: i64) -> Result<Option<IngredientRecord>, RepoError>;

    async fn list_ingredients(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<IngredientRecord>, RepoError>;

    /// Fails with a conflict while any meal still uses the ingredient.
    async fn delete_ingredient(&self, id: i64) -> Result<(), RepoError>;

    /// Add a portion to a meal and recompute the meal from its ingredients.
    async fn add_meal_ingredient(
        &self,
        params: AddMealIngredientParams,
    ) -> Result<MealComposition, RepoError>;

    async fn remove_meal_ingredient(
        &self,
        meal_id: i64,
        meal_ingredient_id: i64,
    ) -> Result<MealComposition, RepoError>;

    async fn list_meal_ingredients(
        &self,
        meal_id: i64,
    ) -> Result<Vec<MealIngredientRecord>, RepoError>;
}
