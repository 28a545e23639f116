//! Query hooks: service reads cached under the builder keys.
//!
//! Every read that a mutation may invalidate goes through here, so the keys
//! written by these hooks and the keys produced by invalidation always agree.

use std::sync::Arc;

use time::Date;

use crate::application::ingredients::IngredientService;
use crate::application::meals::MealService;
use crate::application::plans::PlanService;
use crate::application::progress::ProgressService;
use crate::application::repos::MealQueryFilter;
use crate::cache::{DataType, QueryClient, QueryError, QuerySnapshot, keys};
use crate::domain::entities::{
    DailyNutrition, DailyProgressRecord, IngredientRecord, MealIngredientRecord, MealRecord,
    PlanDetails, PlanRecord, PlannedMeal,
};
use crate::domain::nutrition::Macros;
use crate::domain::types::MealSlot;

#[derive(Clone)]
pub struct PlanQueries {
    client: Arc<QueryClient>,
    plans: PlanService,
}

impl PlanQueries {
    pub fn new(client: Arc<QueryClient>, plans: PlanService) -> Self {
        Self { client, plans }
    }

    pub async fn plan_details(&self, plan_id: i64) -> Result<Option<PlanDetails>, QueryError> {
        let plans = &self.plans;
        self.client
            .fetch_query(keys::plan(plan_id), DataType::Plan, move || {
                plans.get_plan_details(plan_id)
            })
            .await
    }

    pub fn plan_details_snapshot(
        &self,
        plan_id: i64,
    ) -> Result<QuerySnapshot<PlanDetails>, QueryError> {
        self.client.snapshot(&keys::plan(plan_id))
    }

    pub async fn plans_list(&self) -> Result<Vec<PlanRecord>, QueryError> {
        let plans = &self.plans;
        self.client
            .fetch_query(keys::plans_list(), DataType::PlansList, move || {
                plans.list_plans()
            })
            .await
    }

    pub fn plans_list_snapshot(&self) -> Result<QuerySnapshot<Vec<PlanRecord>>, QueryError> {
        self.client.snapshot(&keys::plans_list())
    }

    pub async fn nutrition_goals(&self, plan_id: i64) -> Result<Option<Macros>, QueryError> {
        let plans = &self.plans;
        self.client
            .fetch_query(
                keys::nutrition_goals(plan_id),
                DataType::NutritionGoals,
                move || plans.nutrition_goals(plan_id),
            )
            .await
    }

    pub fn nutrition_goals_snapshot(
        &self,
        plan_id: i64,
    ) -> Result<QuerySnapshot<Macros>, QueryError> {
        self.client.snapshot(&keys::nutrition_goals(plan_id))
    }

    pub async fn daily_nutrition(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<Option<DailyNutrition>, QueryError> {
        let plans = &self.plans;
        self.client
            .fetch_query(
                keys::daily_nutrition(plan_id, date),
                DataType::DailyNutrition,
                move || plans.daily_nutrition(plan_id, date),
            )
            .await
    }

    pub fn daily_nutrition_snapshot(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<QuerySnapshot<DailyNutrition>, QueryError> {
        self.client.snapshot(&keys::daily_nutrition(plan_id, date))
    }

    pub async fn meals_by_slot(
        &self,
        plan_id: i64,
        date: Date,
        slot: MealSlot,
    ) -> Result<Vec<PlannedMeal>, QueryError> {
        let plans = &self.plans;
        self.client
            .fetch_query(
                keys::meals_by_slot(plan_id, date, slot),
                DataType::MealSlots,
                move || plans.meals_by_slot(plan_id, date, slot),
            )
            .await
    }

    pub fn meals_by_slot_snapshot(
        &self,
        plan_id: i64,
        date: Date,
        slot: MealSlot,
    ) -> Result<QuerySnapshot<Vec<PlannedMeal>>, QueryError> {
        self.client
            .snapshot(&keys::meals_by_slot(plan_id, date, slot))
    }
}

#[derive(Clone)]
pub struct MealQueries {
    client: Arc<QueryClient>,
    meals: MealService,
}

impl MealQueries {
    pub fn new(client: Arc<QueryClient>, meals: MealService) -> Self {
        Self { client, meals }
    }

    pub async fn meal(&self, meal_id: i64) -> Result<Option<MealRecord>, QueryError> {
        let meals = &self.meals;
        self.client
            .fetch_query(keys::meal(meal_id), DataType::Meal, move || {
                meals.get_meal(meal_id)
            })
            .await
    }

    pub fn meal_snapshot(&self, meal_id: i64) -> Result<QuerySnapshot<MealRecord>, QueryError> {
        self.client.snapshot(&keys::meal(meal_id))
    }

    /// The full catalogue. Filtered listings bypass the cache.
    pub async fn meals_list(&self) -> Result<Vec<MealRecord>, QueryError> {
        let meals = &self.meals;
        let filter = MealQueryFilter::default();
        let filter = &filter;
        self.client
            .fetch_query(keys::meals_list(), DataType::MealsList, move || {
                meals.list_meals(filter)
            })
            .await
    }

    pub fn meals_list_snapshot(&self) -> Result<QuerySnapshot<Vec<MealRecord>>, QueryError> {
        self.client.snapshot(&keys::meals_list())
    }
}

#[derive(Clone)]
pub struct ProgressQueries {
    client: Arc<QueryClient>,
    progress: ProgressService,
}

impl ProgressQueries {
    pub fn new(client: Arc<QueryClient>, progress: ProgressService) -> Self {
        Self { client, progress }
    }

    pub async fn daily_progress(
        &self,
        daily_progress_id: i64,
    ) -> Result<Option<DailyProgressRecord>, QueryError> {
        let progress = &self.progress;
        self.client
            .fetch_query(
                keys::daily_progress(daily_progress_id),
                DataType::DailyProgress,
                move || progress.daily_progress(daily_progress_id),
            )
            .await
    }

    pub fn daily_progress_snapshot(
        &self,
        daily_progress_id: i64,
    ) -> Result<QuerySnapshot<DailyProgressRecord>, QueryError> {
        self.client
            .snapshot(&keys::daily_progress(daily_progress_id))
    }

    pub async fn progress_list(
        &self,
        plan_id: i64,
    ) -> Result<Vec<DailyProgressRecord>, QueryError> {
        let progress = &self.progress;
        self.client
            .fetch_query(
                keys::progress_list(plan_id),
                DataType::ProgressList,
                move || progress.list_progress_for_plan(plan_id),
            )
            .await
    }

    pub fn progress_list_snapshot(
        &self,
        plan_id: i64,
    ) -> Result<QuerySnapshot<Vec<DailyProgressRecord>>, QueryError> {
        self.client.snapshot(&keys::progress_list(plan_id))
    }
}

#[derive(Clone)]
pub struct IngredientQueries {
    client: Arc<QueryClient>,
    ingredients: IngredientService,
}

impl IngredientQueries {
    pub fn new(client: Arc<QueryClient>, ingredients: IngredientService) -> Self {
        Self {
            client,
            ingredients,
        }
    }

    pub async fn ingredient(
        &self,
        ingredient_id: i64,
    ) -> Result<Option<IngredientRecord>, QueryError> {
        let ingredients = &self.ingredients;
        self.client
            .fetch_query(
                keys::ingredient(ingredient_id),
                DataType::Ingredient,
                move || ingredients.get_ingredient(ingredient_id),
            )
            .await
    }

    pub fn ingredient_snapshot(
        &self,
        ingredient_id: i64,
    ) -> Result<QuerySnapshot<IngredientRecord>, QueryError> {
        self.client.snapshot(&keys::ingredient(ingredient_id))
    }

    /// The full catalogue. Searches bypass the cache.
    pub async fn ingredients_list(&self) -> Result<Vec<IngredientRecord>, QueryError> {
        let ingredients = &self.ingredients;
        self.client
            .fetch_query(keys::ingredients_list(), DataType::IngredientsList, move || {
                ingredients.list_ingredients(None)
            })
            .await
    }

    pub fn ingredients_list_snapshot(
        &self,
    ) -> Result<QuerySnapshot<Vec<IngredientRecord>>, QueryError> {
        self.client.snapshot(&keys::ingredients_list())
    }

    pub async fn meal_ingredients(
        &self,
        meal_id: i64,
    ) -> Result<Vec<MealIngredientRecord>, QueryError> {
        let ingredients = &self.ingredients;
        self.client
            .fetch_query(keys::meal_ingredients(meal_id), DataType::Meal, move || {
                ingredients.meal_ingredients(meal_id)
            })
            .await
    }

    pub fn meal_ingredients_snapshot(
        &self,
        meal_id: i64,
    ) -> Result<QuerySnapshot<Vec<MealIngredientRecord>>, QueryError> {
        self.client.snapshot(&keys::meal_ingredients(meal_id))
    }
}
