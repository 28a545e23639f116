use std::sync::Arc;

use tracing::info;

use crate::application::operation::{OperationError, OperationResult};
use crate::application::repos::{CreateMealParams, MealQueryFilter, MealsRepo, RepoError};
use crate::domain::entities::{MealRecord, ProgressRef};
use crate::domain::nutrition::{DEFAULT_REFERENCE_QUANTITY, Macros, validate_quantity};
use crate::domain::types::{MealSlot, MealUnit};

#[derive(Debug, Clone)]
pub struct CreateMealCommand {
    pub name: String,
    pub slot: MealSlot,
    pub unit: MealUnit,
    /// Reference quantity for `macros`; 100 when absent.
    pub quantity: Option<f64>,
    pub macros: Macros,
}

#[derive(Clone)]
pub struct MealService {
    meals: Arc<dyn MealsRepo>,
}

impl MealService {
    pub fn new(meals: Arc<dyn MealsRepo>) -> Self {
        Self { meals }
    }

    pub async fn create_meal(&self, command: CreateMealCommand) -> OperationResult<MealRecord> {
        let name = command.name.trim();
        if name.is_empty() {
            return Err(OperationError::validation("meal name must not be empty"));
        }
        let quantity = command.quantity.unwrap_or(DEFAULT_REFERENCE_QUANTITY);
        validate_quantity(quantity)?;
        command.macros.validate_goal()?;

        let meal = self
            .meals
            .create_meal(CreateMealParams {
                name: name.to_string(),
                slot: command.slot,
                unit: command.unit,
                quantity,
                macros: command.macros,
            })
            .await?;
        info!(category = "meals", meal_id = meal.id, "Meal created");
        Ok(meal)
    }

    pub async fn get_meal(&self, meal_id: i64) -> OperationResult<Option<MealRecord>> {
        Ok(self.meals.find_meal(meal_id).await?)
    }

    pub async fn list_meals(&self, filter: &MealQueryFilter) -> OperationResult<Vec<MealRecord>> {
        Ok(self.meals.list_meals(filter).await?)
    }

    pub async fn delete_meal(&self, meal_id: i64) -> OperationResult<Vec<ProgressRef>> {
        let refreshed = self.meals.delete_meal(meal_id).await?;
        info!(
            category = "meals",
            meal_id,
            progress_refreshed = refreshed.len(),
            "Meal deleted"
        );
        Ok(refreshed)
    }

    pub async fn toggle_favorite(&self, meal_id: i64) -> OperationResult<MealRecord> {
        let meal = self
            .meals
            .find_meal(meal_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Meal", meal_id))?;
        Ok(self.meals.set_favorite(meal_id, !meal.is_favorite).await?)
    }
}
