//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::domain::nutrition::{MacroSplit, Macros};
use crate::domain::types::{MealSlot, MealUnit, PlanGoal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRecord {
    pub id: i64,
    pub name: String,
    pub slot: MealSlot,
    pub unit: MealUnit,
    /// Reference quantity the macros are expressed for.
    pub quantity: f64,
    pub macros: Macros,
    pub is_favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: i64,
    pub name: String,
    pub goal: PlanGoal,
    pub start_date: Date,
    pub duration_weeks: u32,
    pub is_current: bool,
    /// Daily nutrition goals.
    pub goals: Macros,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlanRecord {
    pub id: i64,
    pub plan_id: i64,
    pub date: Date,
    /// Running totals of every planned entry for the day.
    pub totals: Macros,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlanMealRecord {
    pub id: i64,
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub slot: MealSlot,
    pub quantity: f64,
    /// Macros already scaled to `quantity`.
    pub macros: Macros,
}

/// A planned entry joined with its meal, as shown in a slot list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMeal {
    pub entry: DailyPlanMealRecord,
    pub meal: MealRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    pub plan: PlanRecord,
    pub daily_plans: Vec<DailyPlanRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyNutrition {
    pub plan_id: i64,
    pub date: Date,
    pub totals: Macros,
    pub total_weight: f64,
    pub split: MacroSplit,
    pub goals: Macros,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProgressRecord {
    pub id: i64,
    pub plan_id: i64,
    pub date: Date,
    pub completion_percentage: f64,
    /// Totals of consumed entries only.
    pub consumed: Macros,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMealProgressRecord {
    pub id: i64,
    pub daily_progress_id: i64,
    pub meal_id: i64,
    pub daily_plan_meal_id: i64,
    pub consumed: bool,
    pub consumed_percentage: f64,
    pub effective: Macros,
}

/// Progress row whose totals were recomputed after its day changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRef {
    pub id: i64,
    pub plan_id: i64,
}

/// A planned entry after a write, plus the progress row of its day when one
/// had to be refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMealChange {
    pub entry: DailyPlanMealRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressRef>,
}

/// Catalogue ingredient. Macros are per `quantity` units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecord {
    pub id: i64,
    pub name: String,
    pub unit: MealUnit,
    pub quantity: f64,
    pub macros: Macros,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One ingredient portion inside a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealIngredientRecord {
    pub id: i64,
    pub meal_id: i64,
    pub ingredient_id: i64,
    pub name: String,
    pub unit: MealUnit,
    pub quantity: f64,
    /// Ingredient macros scaled to `quantity`.
    pub macros: Macros,
}

/// A meal after its composition changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealComposition {
    pub meal: MealRecord,
    pub ingredients: Vec<MealIngredientRecord>,
}
