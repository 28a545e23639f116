use async_trait::async_trait;
use sqlx::{Executor, QueryBuilder, Sqlite, Transaction};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        AddMealIngredientParams, CreateIngredientParams, IngredientsRepo, RepoError,
    },
    domain::entities::{IngredientRecord, MealComposition, MealIngredientRecord},
    domain::nutrition::Macros,
    domain::types::MealUnit,
};

use super::{
    SqliteRepositories,
    meals::fetch_meal,
    util::{macros, map_sqlx_error},
};

const INGREDIENT_COLUMNS: &str =
    "id, name, unit, quantity, calories, carbs, fat, protein, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct IngredientRow {
    id: i64,
    name: String,
    unit: MealUnit,
    quantity: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<IngredientRow> for IngredientRecord {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            unit: row.unit,
            quantity: row.quantity,
            macros: macros(row.calories, row.carbs, row.fat, row.protein),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MealIngredientRow {
    id: i64,
    meal_id: i64,
    ingredient_id: i64,
    name: String,
    unit: MealUnit,
    quantity: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

impl From<MealIngredientRow> for MealIngredientRecord {
    fn from(row: MealIngredientRow) -> Self {
        Self {
            id: row.id,
            meal_id: row.meal_id,
            ingredient_id: row.ingredient_id,
            name: row.name,
            unit: row.unit,
            quantity: row.quantity,
            macros: macros(row.calories, row.carbs, row.fat, row.protein),
        }
    }
}

async fn fetch_ingredient<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<IngredientRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?");
    let row = sqlx::query_as::<_, IngredientRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(IngredientRecord::from))
}

async fn fetch_meal_ingredients<'e, E>(
    executor: E,
    meal_id: i64,
) -> Result<Vec<MealIngredientRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, MealIngredientRow>(
        r#"
        SELECT
            mi.id, mi.meal_id, mi.ingredient_id, i.name, i.unit,
            mi.quantity, mi.calories, mi.carbs, mi.fat, mi.protein
        FROM meal_ingredients mi
        INNER JOIN ingredients i ON i.id = mi.ingredient_id
        WHERE mi.meal_id = ?
        ORDER BY mi.id
        "#,
    )
    .bind(meal_id)
    .fetch_all(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(MealIngredientRecord::from).collect())
}

/// Derive a meal's reference quantity and macros from its ingredient portions.
///
/// A meal left without ingredients keeps its quantity and drops to zero macros.
async fn recompose_meal(
    tx: &mut Transaction<'_, Sqlite>,
    meal_id: i64,
) -> Result<MealComposition, RepoError> {
    let ingredients = fetch_meal_ingredients(&mut **tx, meal_id).await?;
    let totals = ingredients
        .iter()
        .map(|ingredient| ingredient.macros)
        .sum::<Macros>()
        .round2();
    let quantity = (!ingredients.is_empty())
        .then(|| ingredients.iter().map(|ingredient| ingredient.quantity).sum::<f64>());

    sqlx::query(
        r#"
        UPDATE meals
        SET quantity = COALESCE(?, quantity),
            calories = ?, carbs = ?, fat = ?, protein = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(quantity)
    .bind(totals.calories)
    .bind(totals.carbs)
    .bind(totals.fat)
    .bind(totals.protein)
    .bind(OffsetDateTime::now_utc())
    .bind(meal_id)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    let meal = fetch_meal(&mut **tx, meal_id)
        .await?
        .ok_or_else(|| RepoError::not_found("Meal", meal_id))?;
    Ok(MealComposition { meal, ingredients })
}

#[async_trait]
impl IngredientsRepo for SqliteRepositories {
    async fn create_ingredient(
        &self,
        params: CreateIngredientParams,
    ) -> Result<IngredientRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO ingredients (
                name, unit, quantity, calories, carbs, fat, protein, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&params.name)
        .bind(params.unit)
        .bind(params.quantity)
        .bind(params.macros.calories)
        .bind(params.macros.carbs)
        .bind(params.macros.fat)
        .bind(params.macros.protein)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|err| match map_sqlx_error(err) {
            RepoError::Conflict { .. } => {
                RepoError::conflict(format!("Ingredient `{}` already exists", params.name))
            }
            other => other,
        })?;

        let id = result.last_insert_rowid();
        fetch_ingredient(self.pool(), id)
            .await?
            .ok_or_else(|| RepoError::not_found("Ingredient", id))
    }

    async fn find_ingredient(&self, id: i64) -> Result<Option<IngredientRecord>, RepoError> {
        fetch_ingredient(self.pool(), id).await
    }

    async fn list_ingredients(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<IngredientRecord>, RepoError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE 1 = 1"
        ));
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            qb.push(" AND name LIKE ");
            qb.push_bind(format!("%{search}%"));
        }
        qb.push(" ORDER BY name COLLATE NOCASE, id");

        let rows = qb
            .build_query_as::<IngredientRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(IngredientRecord::from).collect())
    }

    async fn delete_ingredient(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if fetch_ingredient(&mut *tx, id).await?.is_none() {
            return Err(RepoError::not_found("Ingredient", id));
        }
        let used_by = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT meal_id) FROM meal_ingredients WHERE ingredient_id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if used_by > 0 {
            return Err(RepoError::conflict(format!(
                "Ingredient is used by {used_by} meal(s)"
            )));
        }

        sqlx::query("DELETE FROM ingredients WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn add_meal_ingredient(
        &self,
        params: AddMealIngredientParams,
    ) -> Result<MealComposition, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if fetch_meal(&mut *tx, params.meal_id).await?.is_none() {
            return Err(RepoError::not_found("Meal", params.meal_id));
        }
        let ingredient = fetch_ingredient(&mut *tx, params.ingredient_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Ingredient", params.ingredient_id))?;
        let scaled = ingredient
            .macros
            .for_quantity(params.quantity, ingredient.quantity)
            .round2();

        sqlx::query(
            r#"
            INSERT INTO meal_ingredients (
                meal_id, ingredient_id, quantity, calories, carbs, fat, protein
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(params.meal_id)
        .bind(params.ingredient_id)
        .bind(params.quantity)
        .bind(scaled.calories)
        .bind(scaled.carbs)
        .bind(scaled.fat)
        .bind(scaled.protein)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let composition = recompose_meal(&mut tx, params.meal_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(composition)
    }

    async fn remove_meal_ingredient(
        &self,
        meal_id: i64,
        meal_ingredient_id: i64,
    ) -> Result<MealComposition, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM meal_ingredients WHERE id = ? AND meal_id = ?")
            .bind(meal_ingredient_id)
            .bind(meal_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::missing("Ingredient is not part of this meal"));
        }

        let composition = recompose_meal(&mut tx, meal_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(composition)
    }

    async fn list_meal_ingredients(
        &self,
        meal_id: i64,
    ) -> Result<Vec<MealIngredientRecord>, RepoError> {
        fetch_meal_ingredients(self.pool(), meal_id).await
    }
}
