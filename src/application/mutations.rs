//! Mutation hooks: one write followed by the cache invalidations it implies.
//!
//! Each use case implements [`Mutation`]. [`MutationRunner`] performs the write
//! exactly once and dispatches invalidations only when it succeeded. A failed
//! invalidation is reported but never rolls the write back.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::Date;
use tracing::{debug, error, warn};

use crate::application::ingredients::{
    AddIngredientToMealCommand, CreateIngredientCommand, IngredientService,
};
use crate::application::meals::{CreateMealCommand, MealService};
use crate::application::operation::{OperationError, OperationResult};
use crate::application::plans::{AddMealToDailyPlanCommand, CreatePlanCommand, PlanService};
use crate::application::progress::{FULL_PORTION, ProgressService};
use crate::application::repos::{MarkConsumedParams, PlannedMealRef};
use crate::cache::{
    CacheError, DataType, InvalidationRequest, InvalidationScope, InvalidationTrigger,
};
use crate::domain::entities::{
    DailyProgressRecord, IngredientRecord, MealComposition, MealRecord, PlanRecord,
    PlannedMealChange, ProgressRef,
};
use crate::domain::nutrition::Macros;
use crate::domain::types::MealSlot;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("{mutation} succeeded but cache invalidation failed: {source}")]
    Invalidation {
        mutation: &'static str,
        #[source]
        source: CacheError,
    },
}

#[async_trait]
pub trait Mutation: Send + Sync {
    const NAME: &'static str;
    type Variables: Send + Sync;
    type Output: Send;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<Self::Output>;

    fn invalidations(
        &self,
        variables: &Self::Variables,
        output: &Self::Output,
    ) -> Vec<InvalidationRequest>;
}

#[derive(Clone)]
pub struct MutationRunner {
    trigger: Arc<InvalidationTrigger>,
}

impl MutationRunner {
    pub fn new(trigger: Arc<InvalidationTrigger>) -> Self {
        Self { trigger }
    }

    pub async fn mutate<M: Mutation>(
        &self,
        mutation: &M,
        variables: M::Variables,
    ) -> Result<M::Output, MutationError> {
        let output = match mutation.write(&variables).await {
            Ok(output) => output,
            Err(err) => {
                warn!(
                    category = "mutation",
                    mutation = M::NAME,
                    error = %err,
                    "Mutation failed, cache left untouched"
                );
                return Err(err.into());
            }
        };

        let requests = mutation.invalidations(&variables, &output);
        debug!(
            category = "mutation",
            mutation = M::NAME,
            request_count = requests.len(),
            "Mutation succeeded, dispatching invalidations"
        );
        if let Err(source) = self.trigger.dispatch(&requests).await {
            error!(
                category = "mutation",
                mutation = M::NAME,
                error = %source,
                "Cache invalidation failed after write"
            );
            return Err(MutationError::Invalidation {
                mutation: M::NAME,
                source,
            });
        }
        Ok(output)
    }

    pub fn trigger(&self) -> &Arc<InvalidationTrigger> {
        &self.trigger
    }
}

fn plan_day_requests(plan_id: i64, date: Date, slot: MealSlot) -> Vec<InvalidationRequest> {
    vec![
        InvalidationRequest::new(
            DataType::Plan,
            InvalidationScope::id(plan_id)
                .with_date(date)
                .with_slot(slot),
        )
        .related(),
    ]
}

/// Progress rows recomputed by a write, plus the plan's progress list.
fn progress_requests<'a>(
    refreshed: impl IntoIterator<Item = &'a ProgressRef>,
) -> Vec<InvalidationRequest> {
    refreshed
        .into_iter()
        .flat_map(|progress| {
            [
                InvalidationRequest::new(
                    DataType::DailyProgress,
                    InvalidationScope::id(progress.id),
                ),
                InvalidationRequest::new(
                    DataType::ProgressList,
                    InvalidationScope::id(progress.plan_id),
                ),
            ]
        })
        .collect()
}

fn planned_change_requests(
    plan_id: i64,
    date: Date,
    slot: MealSlot,
    change: &PlannedMealChange,
) -> Vec<InvalidationRequest> {
    let mut requests = plan_day_requests(plan_id, date, slot);
    requests.extend(progress_requests(&change.progress));
    requests
}

// Progress

#[derive(Debug, Clone, Copy)]
pub struct MarkMealConsumedVariables {
    pub daily_progress_id: i64,
    pub meal_id: i64,
    pub daily_plan_meal_id: i64,
    pub consumed: bool,
    /// Portion eaten; a full portion when absent.
    pub percentage: Option<f64>,
}

pub struct MarkMealConsumed {
    progress: ProgressService,
}

impl MarkMealConsumed {
    pub fn new(progress: ProgressService) -> Self {
        Self { progress }
    }
}

#[async_trait]
impl Mutation for MarkMealConsumed {
    const NAME: &'static str = "mark_meal_consumed";
    type Variables = MarkMealConsumedVariables;
    type Output = DailyProgressRecord;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<Self::Output> {
        self.progress
            .mark_meal_as_consumed(MarkConsumedParams {
                daily_progress_id: variables.daily_progress_id,
                meal_id: variables.meal_id,
                daily_plan_meal_id: variables.daily_plan_meal_id,
                consumed: variables.consumed,
                percentage: variables.percentage.unwrap_or(FULL_PORTION),
            })
            .await
    }

    fn invalidations(
        &self,
        variables: &Self::Variables,
        _: &Self::Output,
    ) -> Vec<InvalidationRequest> {
        vec![InvalidationRequest::new(
            DataType::DailyProgress,
            InvalidationScope::id(variables.daily_progress_id),
        )]
    }
}

// Daily plan entries

#[derive(Debug, Clone, Copy)]
pub struct RemoveMealVariables {
    pub plan_id: i64,
    pub date: Date,
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub slot: MealSlot,
}

pub struct RemoveMealFromDailyPlan {
    plans: PlanService,
}

impl RemoveMealFromDailyPlan {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for RemoveMealFromDailyPlan {
    const NAME: &'static str = "remove_meal_from_daily_plan";
    type Variables = RemoveMealVariables;
    type Output = PlannedMealChange;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<Self::Output> {
        self.plans
            .remove_meal_from_daily_plan(PlannedMealRef {
                daily_plan_id: variables.daily_plan_id,
                meal_id: variables.meal_id,
                slot: variables.slot,
            })
            .await
    }

    fn invalidations(
        &self,
        variables: &Self::Variables,
        output: &Self::Output,
    ) -> Vec<InvalidationRequest> {
        planned_change_requests(variables.plan_id, variables.date, variables.slot, output)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddMealVariables {
    pub plan_id: i64,
    pub date: Date,
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub quantity: f64,
    /// Defaults to the meal's own slot.
    pub slot: Option<MealSlot>,
}

pub struct AddMealToDailyPlan {
    plans: PlanService,
}

impl AddMealToDailyPlan {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for AddMealToDailyPlan {
    const NAME: &'static str = "add_meal_to_daily_plan";
    type Variables = AddMealVariables;
    type Output = PlannedMealChange;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<Self::Output> {
        self.plans
            .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
                daily_plan_id: variables.daily_plan_id,
                meal_id: variables.meal_id,
                quantity: variables.quantity,
                slot: variables.slot,
            })
            .await
    }

    fn invalidations(
        &self,
        variables: &Self::Variables,
        output: &Self::Output,
    ) -> Vec<InvalidationRequest> {
        planned_change_requests(variables.plan_id, variables.date, output.entry.slot, output)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateQuantityVariables {
    pub plan_id: i64,
    pub date: Date,
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub slot: MealSlot,
    pub quantity: f64,
}

pub struct UpdateMealQuantity {
    plans: PlanService,
}

impl UpdateMealQuantity {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for UpdateMealQuantity {
    const NAME: &'static str = "update_meal_quantity";
    type Variables = UpdateQuantityVariables;
    type Output = PlannedMealChange;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<Self::Output> {
        self.plans
            .update_meal_quantity(
                PlannedMealRef {
                    daily_plan_id: variables.daily_plan_id,
                    meal_id: variables.meal_id,
                    slot: variables.slot,
                },
                variables.quantity,
            )
            .await
    }

    fn invalidations(
        &self,
        variables: &Self::Variables,
        output: &Self::Output,
    ) -> Vec<InvalidationRequest> {
        planned_change_requests(variables.plan_id, variables.date, variables.slot, output)
    }
}

// Plans

#[derive(Debug, Clone, Copy)]
pub struct UpdateGoalsVariables {
    pub plan_id: i64,
    pub goals: Macros,
}

pub struct UpdateNutritionGoals {
    plans: PlanService,
}

impl UpdateNutritionGoals {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for UpdateNutritionGoals {
    const NAME: &'static str = "update_nutrition_goals";
    type Variables = UpdateGoalsVariables;
    type Output = PlanRecord;

    async fn write(&self, variables: &Self::Variables) -> OperationResult<PlanRecord> {
        self.plans
            .update_nutrition_goals(variables.plan_id, variables.goals)
            .await
    }

    fn invalidations(
        &self,
        variables: &Self::Variables,
        _: &PlanRecord,
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Plan, InvalidationScope::id(variables.plan_id))
                .related(),
        ]
    }
}

pub struct CreatePlan {
    plans: PlanService,
}

impl CreatePlan {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for CreatePlan {
    const NAME: &'static str = "create_plan";
    type Variables = CreatePlanCommand;
    type Output = PlanRecord;

    async fn write(&self, variables: &CreatePlanCommand) -> OperationResult<PlanRecord> {
        self.plans.create_plan(variables.clone()).await
    }

    fn invalidations(&self, _: &CreatePlanCommand, _: &PlanRecord) -> Vec<InvalidationRequest> {
        vec![InvalidationRequest::new(DataType::PlansList, InvalidationScope::all())]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanIdVariables {
    pub plan_id: i64,
}

pub struct DeletePlan {
    plans: PlanService,
}

impl DeletePlan {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for DeletePlan {
    const NAME: &'static str = "delete_plan";
    type Variables = PlanIdVariables;
    type Output = ();

    async fn write(&self, variables: &PlanIdVariables) -> OperationResult<()> {
        self.plans.delete_plan(variables.plan_id).await
    }

    fn invalidations(&self, variables: &PlanIdVariables, _: &()) -> Vec<InvalidationRequest> {
        let scope = InvalidationScope::id(variables.plan_id);
        vec![
            InvalidationRequest::new(DataType::Plan, scope).related(),
            InvalidationRequest::new(DataType::PlansList, InvalidationScope::all()),
            InvalidationRequest::new(DataType::ProgressList, scope),
        ]
    }
}

pub struct SetCurrentPlan {
    plans: PlanService,
}

impl SetCurrentPlan {
    pub fn new(plans: PlanService) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl Mutation for SetCurrentPlan {
    const NAME: &'static str = "set_current_plan";
    type Variables = PlanIdVariables;
    type Output = PlanRecord;

    async fn write(&self, variables: &PlanIdVariables) -> OperationResult<PlanRecord> {
        self.plans.set_current_plan(variables.plan_id).await
    }

    /// The previous current plan is unknown here and its detail also flips.
    fn invalidations(&self, _: &PlanIdVariables, _: &PlanRecord) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Plan, InvalidationScope::all()),
            InvalidationRequest::new(DataType::PlansList, InvalidationScope::all()),
        ]
    }
}

// Meals

pub struct CreateMeal {
    meals: MealService,
}

impl CreateMeal {
    pub fn new(meals: MealService) -> Self {
        Self { meals }
    }
}

#[async_trait]
impl Mutation for CreateMeal {
    const NAME: &'static str = "create_meal";
    type Variables = CreateMealCommand;
    type Output = MealRecord;

    async fn write(&self, variables: &CreateMealCommand) -> OperationResult<MealRecord> {
        self.meals.create_meal(variables.clone()).await
    }

    fn invalidations(&self, _: &CreateMealCommand, _: &MealRecord) -> Vec<InvalidationRequest> {
        vec![InvalidationRequest::new(DataType::MealsList, InvalidationScope::all())]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MealIdVariables {
    pub meal_id: i64,
}

pub struct DeleteMeal {
    meals: MealService,
}

impl DeleteMeal {
    pub fn new(meals: MealService) -> Self {
        Self { meals }
    }
}

#[async_trait]
impl Mutation for DeleteMeal {
    const NAME: &'static str = "delete_meal";
    type Variables = MealIdVariables;
    type Output = Vec<ProgressRef>;

    async fn write(&self, variables: &MealIdVariables) -> OperationResult<Vec<ProgressRef>> {
        self.meals.delete_meal(variables.meal_id).await
    }

    /// Any plan may have embedded the meal, so plan data is invalidated type-wide.
    fn invalidations(
        &self,
        variables: &MealIdVariables,
        refreshed: &Vec<ProgressRef>,
    ) -> Vec<InvalidationRequest> {
        let mut requests = vec![
            InvalidationRequest::new(DataType::Meal, InvalidationScope::id(variables.meal_id))
                .related(),
            InvalidationRequest::new(DataType::Plan, InvalidationScope::all()).related(),
        ];
        requests.extend(progress_requests(refreshed));
        requests
    }
}

pub struct ToggleFavoriteMeal {
    meals: MealService,
}

impl ToggleFavoriteMeal {
    pub fn new(meals: MealService) -> Self {
        Self { meals }
    }
}

#[async_trait]
impl Mutation for ToggleFavoriteMeal {
    const NAME: &'static str = "toggle_favorite_meal";
    type Variables = MealIdVariables;
    type Output = MealRecord;

    async fn write(&self, variables: &MealIdVariables) -> OperationResult<MealRecord> {
        self.meals.toggle_favorite(variables.meal_id).await
    }

    fn invalidations(
        &self,
        variables: &MealIdVariables,
        _: &MealRecord,
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Meal, InvalidationScope::id(variables.meal_id))
                .related(),
        ]
    }
}

// Ingredients

pub struct CreateIngredient {
    ingredients: IngredientService,
}

impl CreateIngredient {
    pub fn new(ingredients: IngredientService) -> Self {
        Self { ingredients }
    }
}

#[async_trait]
impl Mutation for CreateIngredient {
    const NAME: &'static str = "create_ingredient";
    type Variables = CreateIngredientCommand;
    type Output = IngredientRecord;

    async fn write(
        &self,
        variables: &CreateIngredientCommand,
    ) -> OperationResult<IngredientRecord> {
        self.ingredients.create_ingredient(variables.clone()).await
    }

    fn invalidations(
        &self,
        _: &CreateIngredientCommand,
        output: &IngredientRecord,
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Ingredient, InvalidationScope::id(output.id))
                .related(),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngredientIdVariables {
    pub ingredient_id: i64,
}

pub struct DeleteIngredient {
    ingredients: IngredientService,
}

impl DeleteIngredient {
    pub fn new(ingredients: IngredientService) -> Self {
        Self { ingredients }
    }
}

#[async_trait]
impl Mutation for DeleteIngredient {
    const NAME: &'static str = "delete_ingredient";
    type Variables = IngredientIdVariables;
    type Output = ();

    async fn write(&self, variables: &IngredientIdVariables) -> OperationResult<()> {
        self.ingredients
            .delete_ingredient(variables.ingredient_id)
            .await
    }

    fn invalidations(
        &self,
        variables: &IngredientIdVariables,
        _: &(),
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(
                DataType::Ingredient,
                InvalidationScope::id(variables.ingredient_id),
            )
            .related(),
        ]
    }
}

pub struct AddIngredientToMeal {
    ingredients: IngredientService,
}

impl AddIngredientToMeal {
    pub fn new(ingredients: IngredientService) -> Self {
        Self { ingredients }
    }
}

#[async_trait]
impl Mutation for AddIngredientToMeal {
    const NAME: &'static str = "add_ingredient_to_meal";
    type Variables = AddIngredientToMealCommand;
    type Output = MealComposition;

    async fn write(
        &self,
        variables: &AddIngredientToMealCommand,
    ) -> OperationResult<MealComposition> {
        self.ingredients.add_ingredient_to_meal(*variables).await
    }

    /// The meal key prefixes its composition key.
    fn invalidations(
        &self,
        variables: &AddIngredientToMealCommand,
        _: &MealComposition,
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Meal, InvalidationScope::id(variables.meal_id))
                .related(),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveIngredientVariables {
    pub meal_id: i64,
    pub meal_ingredient_id: i64,
}

pub struct RemoveIngredientFromMeal {
    ingredients: IngredientService,
}

impl RemoveIngredientFromMeal {
    pub fn new(ingredients: IngredientService) -> Self {
        Self { ingredients }
    }
}

#[async_trait]
impl Mutation for RemoveIngredientFromMeal {
    const NAME: &'static str = "remove_ingredient_from_meal";
    type Variables = RemoveIngredientVariables;
    type Output = MealComposition;

    async fn write(
        &self,
        variables: &RemoveIngredientVariables,
    ) -> OperationResult<MealComposition> {
        self.ingredients
            .remove_ingredient_from_meal(variables.meal_id, variables.meal_ingredient_id)
            .await
    }

    fn invalidations(
        &self,
        variables: &RemoveIngredientVariables,
        _: &MealComposition,
    ) -> Vec<InvalidationRequest> {
        vec![
            InvalidationRequest::new(DataType::Meal, InvalidationScope::id(variables.meal_id))
                .related(),
        ]
    }
}
