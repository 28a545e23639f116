use std::sync::Arc;

use tracing::info;

use crate::application::operation::{OperationError, OperationResult};
use crate::application::repos::{
    AddMealIngredientParams, CreateIngredientParams, IngredientsRepo,
};
use crate::domain::entities::{IngredientRecord, MealComposition, MealIngredientRecord};
use crate::domain::nutrition::{DEFAULT_REFERENCE_QUANTITY, Macros, validate_quantity};
use crate::domain::types::MealUnit;

#[derive(Debug, Clone)]
pub struct CreateIngredientCommand {
    pub name: String,
    pub unit: MealUnit,
    /// Reference quantity for `macros`; 100 when absent.
    pub quantity: Option<f64>,
    pub macros: Macros,
}

#[derive(Debug, Clone, Copy)]
pub struct AddIngredientToMealCommand {
    pub meal_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
}

/// Ingredient catalogue and meal composition.
///
/// A meal that has ingredients takes its macros from them: every portion
/// added or removed recomputes the meal. Entries already planned keep the
/// macros they were planned with.
#[derive(Clone)]
pub struct IngredientService {
    ingredients: Arc<dyn IngredientsRepo>,
}

impl IngredientService {
    pub fn new(ingredients: Arc<dyn IngredientsRepo>) -> Self {
        Self { ingredients }
    }

    pub async fn create_ingredient(
        &self,
        command: CreateIngredientCommand,
    ) -> OperationResult<IngredientRecord> {
        let name = command.name.trim();
        if name.is_empty() {
            return Err(OperationError::validation("ingredient name must not be empty"));
        }
        let quantity = command.quantity.unwrap_or(DEFAULT_REFERENCE_QUANTITY);
        validate_quantity(quantity)?;
        command.macros.validate_goal()?;

        let ingredient = self
            .ingredients
            .create_ingredient(CreateIngredientParams {
                name: name.to_string(),
                unit: command.unit,
                quantity,
                macros: command.macros,
            })
            .await?;
        info!(
            category = "ingredients",
            ingredient_id = ingredient.id,
            "Ingredient created"
        );
        Ok(ingredient)
    }

    pub async fn get_ingredient(
        &self,
        ingredient_id: i64,
    ) -> OperationResult<Option<IngredientRecord>> {
        Ok(self.ingredients.find_ingredient(ingredient_id).await?)
    }

    pub async fn list_ingredients(
        &self,
        search: Option<&str>,
    ) -> OperationResult<Vec<IngredientRecord>> {
        Ok(self.ingredients.list_ingredients(search).await?)
    }

    pub async fn delete_ingredient(&self, ingredient_id: i64) -> OperationResult<()> {
        self.ingredients.delete_ingredient(ingredient_id).await?;
        info!(category = "ingredients", ingredient_id, "Ingredient deleted");
        Ok(())
    }

    pub async fn add_ingredient_to_meal(
        &self,
        command: AddIngredientToMealCommand,
    ) -> OperationResult<MealComposition> {
        validate_quantity(command.quantity)?;
        let composition = self
            .ingredients
            .add_meal_ingredient(AddMealIngredientParams {
                meal_id: command.meal_id,
                ingredient_id: command.ingredient_id,
                quantity: command.quantity,
            })
            .await?;
        info!(
            category = "ingredients",
            meal_id = command.meal_id,
            ingredient_id = command.ingredient_id,
            ingredient_count = composition.ingredients.len(),
            "Ingredient added to meal"
        );
        Ok(composition)
    }

    pub async fn remove_ingredient_from_meal(
        &self,
        meal_id: i64,
        meal_ingredient_id: i64,
    ) -> OperationResult<MealComposition> {
        let composition = self
            .ingredients
            .remove_meal_ingredient(meal_id, meal_ingredient_id)
            .await?;
        info!(
            category = "ingredients",
            meal_id,
            meal_ingredient_id,
            ingredient_count = composition.ingredients.len(),
            "Ingredient removed from meal"
        );
        Ok(composition)
    }

    pub async fn meal_ingredients(
        &self,
        meal_id: i64,
    ) -> OperationResult<Vec<MealIngredientRecord>> {
        Ok(self.ingredients.list_meal_ingredients(meal_id).await?)
    }
}
