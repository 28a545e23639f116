use async_trait::async_trait;
use sqlx::{Executor, QueryBuilder, Sqlite};
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateMealParams, MealQueryFilter, MealsRepo, RepoError},
    domain::entities::{DailyPlanMealRecord, MealRecord, ProgressRef},
    domain::types::{MealSlot, MealUnit},
};

use super::{
    SqliteRepositories,
    plans::{PlanEntryRow, subtract_from_daily_totals},
    progress::refresh_day_progress,
    util::{macros, map_sqlx_error},
};

pub(super) const MEAL_COLUMNS: &str = "id, name, meal_type, unit, quantity, calories, carbs, fat, \
    protein, is_favorite, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(super) struct MealRow {
    id: i64,
    name: String,
    meal_type: MealSlot,
    unit: MealUnit,
    quantity: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
    is_favorite: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MealRow> for MealRecord {
    fn from(row: MealRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slot: row.meal_type,
            unit: row.unit,
            quantity: row.quantity,
            macros: macros(row.calories, row.carbs, row.fat, row.protein),
            is_favorite: row.is_favorite,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) async fn fetch_meal<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<MealRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?");
    let row = sqlx::query_as::<_, MealRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(MealRecord::from))
}

#[async_trait]
impl MealsRepo for SqliteRepositories {
    async fn create_meal(&self, params: CreateMealParams) -> Result<MealRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO meals (
                name, meal_type, unit, quantity, calories, carbs, fat, protein,
                is_favorite, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&params.name)
        .bind(params.slot)
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
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();
        fetch_meal(self.pool(), id)
            .await?
            .ok_or_else(|| RepoError::not_found("Meal", id))
    }

    async fn find_meal(&self, id: i64) -> Result<Option<MealRecord>, RepoError> {
        fetch_meal(self.pool(), id).await
    }

    async fn list_meals(&self, filter: &MealQueryFilter) -> Result<Vec<MealRecord>, RepoError> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {MEAL_COLUMNS} FROM meals WHERE 1 = 1"));

        if let Some(slot) = filter.slot {
            qb.push(" AND meal_type = ");
            qb.push_bind(slot);
        }
        if let Some(search) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            qb.push(" AND name LIKE ");
            qb.push_bind(format!("%{search}%"));
        }
        if filter.favorites_only {
            qb.push(" AND is_favorite = 1");
        }
        qb.push(" ORDER BY is_favorite DESC, name COLLATE NOCASE, id");

        let rows = qb
            .build_query_as::<MealRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(MealRecord::from).collect())
    }

    async fn delete_meal(&self, id: i64) -> Result<Vec<ProgressRef>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if fetch_meal(&mut *tx, id).await?.is_none() {
            return Err(RepoError::not_found("Meal", id));
        }

        let entries = sqlx::query_as::<_, PlanEntryRow>(
            r#"
            SELECT id, daily_plan_id, meal_id, meal_type, quantity, calories, carbs, fat, protein
            FROM daily_plan_meals
            WHERE meal_id = ?
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut days = Vec::new();
        for entry in entries {
            let entry = DailyPlanMealRecord::from(entry);
            subtract_from_daily_totals(&mut tx, entry.daily_plan_id, entry.macros).await?;
            if !days.contains(&entry.daily_plan_id) {
                days.push(entry.daily_plan_id);
            }
        }

        sqlx::query("DELETE FROM meals WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Entries and their meal progress are gone by cascade now.
        let mut refreshed = Vec::new();
        for daily_plan_id in days {
            if let Some(progress) = refresh_day_progress(&mut tx, daily_plan_id).await? {
                refreshed.push(progress);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(refreshed)
    }

    async fn set_favorite(&self, id: i64, favorite: bool) -> Result<MealRecord, RepoError> {
        let result = sqlx::query("UPDATE meals SET is_favorite = ?, updated_at = ? WHERE id = ?")
            .bind(favorite)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Meal", id));
        }

        fetch_meal(self.pool(), id)
            .await?
            .ok_or_else(|| RepoError::not_found("Meal", id))
    }
}
