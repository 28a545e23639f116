use std::sync::Arc;

use time::Date;
use tracing::info;

use crate::application::operation::{OperationError, OperationResult};
use crate::application::repos::{
    AddPlannedMealParams, CreatePlanParams, PlannedMealRef, PlansRepo, RepoError,
};
use crate::domain::entities::{
    DailyNutrition, DailyPlanRecord, PlanDetails, PlanRecord, PlannedMeal, PlannedMealChange,
};
use crate::domain::nutrition::{Macros, validate_quantity};
use crate::domain::types::{MealSlot, PlanGoal};

const MAX_DURATION_WEEKS: u32 = 52;

#[derive(Debug, Clone)]
pub struct CreatePlanCommand {
    pub name: String,
    pub goal: PlanGoal,
    pub start_date: Date,
    pub duration_weeks: u32,
    pub goals: Macros,
}

#[derive(Debug, Clone)]
pub struct AddMealToDailyPlanCommand {
    pub daily_plan_id: i64,
    pub meal_id: i64,
    pub quantity: f64,
    pub slot: Option<MealSlot>,
}

#[derive(Clone)]
pub struct PlanService {
    plans: Arc<dyn PlansRepo>,
}

impl PlanService {
    pub fn new(plans: Arc<dyn PlansRepo>) -> Self {
        Self { plans }
    }

    pub async fn create_plan(&self, command: CreatePlanCommand) -> OperationResult<PlanRecord> {
        let name = command.name.trim();
        if name.is_empty() {
            return Err(OperationError::validation("plan name must not be empty"));
        }
        if command.duration_weeks == 0 || command.duration_weeks > MAX_DURATION_WEEKS {
            return Err(OperationError::validation(format!(
                "duration must be between 1 and {MAX_DURATION_WEEKS} weeks"
            )));
        }
        command.goals.validate_goal()?;

        let plan = self
            .plans
            .create_plan(CreatePlanParams {
                name: name.to_string(),
                goal: command.goal,
                start_date: command.start_date,
                duration_weeks: command.duration_weeks,
                goals: command.goals,
            })
            .await?;
        info!(
            category = "plans",
            plan_id = plan.id,
            days = plan.duration_weeks * 7,
            "Plan created"
        );
        Ok(plan)
    }

    pub async fn get_plan_details(&self, plan_id: i64) -> OperationResult<Option<PlanDetails>> {
        let Some(plan) = self.plans.find_plan(plan_id).await? else {
            return Ok(None);
        };
        let daily_plans = self.plans.list_daily_plans(plan_id).await?;
        Ok(Some(PlanDetails { plan, daily_plans }))
    }

    pub async fn list_plans(&self) -> OperationResult<Vec<PlanRecord>> {
        Ok(self.plans.list_plans().await?)
    }

    pub async fn delete_plan(&self, plan_id: i64) -> OperationResult<()> {
        self.plans.delete_plan(plan_id).await?;
        info!(category = "plans", plan_id, "Plan deleted");
        Ok(())
    }

    pub async fn set_current_plan(&self, plan_id: i64) -> OperationResult<PlanRecord> {
        Ok(self.plans.set_current_plan(plan_id).await?)
    }

    pub async fn current_plan(&self) -> OperationResult<Option<PlanRecord>> {
        Ok(self.plans.current_plan().await?)
    }

    pub async fn nutrition_goals(&self, plan_id: i64) -> OperationResult<Option<Macros>> {
        let plan = self.plans.find_plan(plan_id).await?;
        Ok(plan.map(|plan| plan.goals))
    }

    pub async fn update_nutrition_goals(
        &self,
        plan_id: i64,
        goals: Macros,
    ) -> OperationResult<PlanRecord> {
        goals.validate_goal()?;
        Ok(self.plans.update_goals(plan_id, goals).await?)
    }

    pub async fn daily_plan(
        &self,
        plan_id: i64,
        date: Date,
    ) -> OperationResult<Option<DailyPlanRecord>> {
        Ok(self.plans.find_daily_plan(plan_id, date).await?)
    }

    pub async fn add_meal_to_daily_plan(
        &self,
        command: AddMealToDailyPlanCommand,
    ) -> OperationResult<PlannedMealChange> {
        validate_quantity(command.quantity)?;
        let change = self
            .plans
            .add_planned_meal(AddPlannedMealParams {
                daily_plan_id: command.daily_plan_id,
                meal_id: command.meal_id,
                quantity: command.quantity,
                slot: command.slot,
            })
            .await?;
        info!(
            category = "plans",
            daily_plan_id = change.entry.daily_plan_id,
            meal_id = change.entry.meal_id,
            slot = %change.entry.slot,
            progress_refreshed = change.progress.is_some(),
            "Meal added to daily plan"
        );
        Ok(change)
    }

    pub async fn remove_meal_from_daily_plan(
        &self,
        target: PlannedMealRef,
    ) -> OperationResult<PlannedMealChange> {
        let change = self.plans.remove_planned_meal(target).await?;
        info!(
            category = "plans",
            daily_plan_id = target.daily_plan_id,
            meal_id = target.meal_id,
            slot = %target.slot,
            progress_refreshed = change.progress.is_some(),
            "Meal removed from daily plan"
        );
        Ok(change)
    }

    pub async fn update_meal_quantity(
        &self,
        target: PlannedMealRef,
        quantity: f64,
    ) -> OperationResult<PlannedMealChange> {
        validate_quantity(quantity)?;
        Ok(self.plans.update_planned_quantity(target, quantity).await?)
    }

    /// Rounded totals of every entry planned for `date`.
    pub async fn daily_nutrition(
        &self,
        plan_id: i64,
        date: Date,
    ) -> OperationResult<Option<DailyNutrition>> {
        let Some(plan) = self.plans.find_plan(plan_id).await? else {
            return Ok(None);
        };
        let Some(daily_plan) = self.plans.find_daily_plan(plan_id, date).await? else {
            return Ok(None);
        };
        let entries = self.plans.list_planned_meals(daily_plan.id, None).await?;

        let totals: Macros = entries.iter().map(|planned| planned.entry.macros).sum();
        let total_weight = entries.iter().map(|planned| planned.entry.quantity).sum::<f64>();
        Ok(Some(DailyNutrition {
            plan_id,
            date,
            totals: totals.rounded(),
            total_weight: total_weight.round(),
            split: totals.split(),
            goals: plan.goals,
        }))
    }

    /// Entries planned for one slot of one day. Empty when the day is unplanned.
    pub async fn meals_by_slot(
        &self,
        plan_id: i64,
        date: Date,
        slot: MealSlot,
    ) -> OperationResult<Vec<PlannedMeal>> {
        match self.plans.find_daily_plan(plan_id, date).await? {
            Some(daily_plan) => Ok(self
                .plans
                .list_planned_meals(daily_plan.id, Some(slot))
                .await?),
            None => Ok(Vec::new()),
        }
    }

    /// Resolve the daily plan for a date, failing when the plan has none.
    pub async fn require_daily_plan(
        &self,
        plan_id: i64,
        date: Date,
    ) -> OperationResult<DailyPlanRecord> {
        match self.plans.find_daily_plan(plan_id, date).await? {
            Some(daily_plan) => Ok(daily_plan),
            None => {
                if self.plans.find_plan(plan_id).await?.is_none() {
                    return Err(RepoError::not_found("Plan", plan_id).into());
                }
                Err(OperationError::not_found(format!(
                    "Plan {plan_id} has no daily plan on {date}"
                )))
            }
        }
    }
}
