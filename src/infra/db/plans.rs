use async_trait::async_trait;
use sqlx::{Executor, QueryBuilder, Sqlite, Transaction};
use time::{Date, Duration, OffsetDateTime};

use crate::{
    application::repos::{
        AddPlannedMealParams, CreatePlanParams, PlannedMealRef, PlansRepo, RepoError,
    },
    domain::entities::{
        DailyPlanMealRecord, DailyPlanRecord, MealRecord, PlanRecord, PlannedMeal,
        PlannedMealChange,
    },
    domain::nutrition::Macros,
    domain::types::{MealSlot, MealUnit, PlanGoal},
};

use super::{
    SqliteRepositories,
    meals::fetch_meal,
    progress::refresh_day_progress,
    util::{macros, map_sqlx_error, to_u32},
};

const PLAN_COLUMNS: &str = "id, name, goal, start_date, duration_weeks, is_current, calories, \
    carbs, fat, protein, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: i64,
    name: String,
    goal: PlanGoal,
    start_date: Date,
    duration_weeks: i64,
    is_current: bool,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PlanRow> for PlanRecord {
    type Error = RepoError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            goal: row.goal,
            start_date: row.start_date,
            duration_weeks: to_u32(row.duration_weeks, "duration_weeks")?,
            is_current: row.is_current,
            goals: macros(row.calories, row.carbs, row.fat, row.protein),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DailyPlanRow {
    id: i64,
    plan_id: i64,
    date: Date,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

impl From<DailyPlanRow> for DailyPlanRecord {
    fn from(row: DailyPlanRow) -> Self {
        Self {
            id: row.id,
            plan_id: row.plan_id,
            date: row.date,
            totals: macros(row.calories, row.carbs, row.fat, row.protein),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct PlanEntryRow {
    id: i64,
    daily_plan_id: i64,
    meal_id: i64,
    meal_type: MealSlot,
    quantity: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

impl From<PlanEntryRow> for DailyPlanMealRecord {
    fn from(row: PlanEntryRow) -> Self {
        Self {
            id: row.id,
            daily_plan_id: row.daily_plan_id,
            meal_id: row.meal_id,
            slot: row.meal_type,
            quantity: row.quantity,
            macros: macros(row.calories, row.carbs, row.fat, row.protein),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlannedMealRow {
    entry_id: i64,
    daily_plan_id: i64,
    meal_id: i64,
    entry_meal_type: MealSlot,
    entry_quantity: f64,
    entry_calories: f64,
    entry_carbs: f64,
    entry_fat: f64,
    entry_protein: f64,
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

impl From<PlannedMealRow> for PlannedMeal {
    fn from(row: PlannedMealRow) -> Self {
        Self {
            entry: DailyPlanMealRecord {
                id: row.entry_id,
                daily_plan_id: row.daily_plan_id,
                meal_id: row.meal_id,
                slot: row.entry_meal_type,
                quantity: row.entry_quantity,
                macros: macros(
                    row.entry_calories,
                    row.entry_carbs,
                    row.entry_fat,
                    row.entry_protein,
                ),
            },
            meal: MealRecord {
                id: row.meal_id,
                name: row.name,
                slot: row.meal_type,
                unit: row.unit,
                quantity: row.quantity,
                macros: macros(row.calories, row.carbs, row.fat, row.protein),
                is_favorite: row.is_favorite,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

async fn fetch_plan<'e, E>(executor: E, id: i64) -> Result<Option<PlanRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?");
    sqlx::query_as::<_, PlanRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?
        .map(PlanRecord::try_from)
        .transpose()
}

pub(super) async fn fetch_daily_plan<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<DailyPlanRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DailyPlanRow>(
        "SELECT id, plan_id, date, calories, carbs, fat, protein FROM daily_plans WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(row.map(DailyPlanRecord::from))
}

pub(super) async fn fetch_entry<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<DailyPlanMealRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PlanEntryRow>(
        r#"
        SELECT id, daily_plan_id, meal_id, meal_type, quantity, calories, carbs, fat, protein
        FROM daily_plan_meals
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(row.map(DailyPlanMealRecord::from))
}

/// First entry matching a meal in a slot of a daily plan.
async fn find_entry(
    tx: &mut Transaction<'_, Sqlite>,
    target: PlannedMealRef,
) -> Result<Option<DailyPlanMealRecord>, RepoError> {
    let row = sqlx::query_as::<_, PlanEntryRow>(
        r#"
        SELECT id, daily_plan_id, meal_id, meal_type, quantity, calories, carbs, fat, protein
        FROM daily_plan_meals
        WHERE daily_plan_id = ? AND meal_id = ? AND meal_type = ?
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(target.daily_plan_id)
    .bind(target.meal_id)
    .bind(target.slot)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(row.map(DailyPlanMealRecord::from))
}

async fn adjust_daily_totals(
    tx: &mut Transaction<'_, Sqlite>,
    daily_plan_id: i64,
    adjust: impl FnOnce(Macros) -> Macros + Send,
) -> Result<(), RepoError> {
    let daily_plan = fetch_daily_plan(&mut **tx, daily_plan_id)
        .await?
        .ok_or_else(|| RepoError::not_found("Daily plan", daily_plan_id))?;
    let totals = adjust(daily_plan.totals).round2();

    sqlx::query(
        "UPDATE daily_plans SET calories = ?, carbs = ?, fat = ?, protein = ? WHERE id = ?",
    )
    .bind(totals.calories)
    .bind(totals.carbs)
    .bind(totals.fat)
    .bind(totals.protein)
    .bind(daily_plan_id)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

pub(super) async fn subtract_from_daily_totals(
    tx: &mut Transaction<'_, Sqlite>,
    daily_plan_id: i64,
    amount: Macros,
) -> Result<(), RepoError> {
    adjust_daily_totals(tx, daily_plan_id, |totals| totals.saturating_sub(amount)).await
}

#[async_trait]
impl PlansRepo for SqliteRepositories {
    async fn create_plan(&self, params: CreatePlanParams) -> Result<PlanRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO plans (
                name, goal, start_date, duration_weeks, is_current,
                calories, carbs, fat, protein, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&params.name)
        .bind(params.goal)
        .bind(params.start_date)
        .bind(i64::from(params.duration_weeks))
        .bind(params.goals.calories)
        .bind(params.goals.carbs)
        .bind(params.goals.fat)
        .bind(params.goals.protein)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let plan_id = result.last_insert_rowid();

        for offset in 0..i64::from(params.duration_weeks) * 7 {
            let date = params
                .start_date
                .checked_add(Duration::days(offset))
                .ok_or_else(|| RepoError::invalid_input("plan runs past the supported calendar"))?;
            sqlx::query("INSERT INTO daily_plans (plan_id, date) VALUES (?, ?)")
                .bind(plan_id)
                .bind(date)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        fetch_plan(self.pool(), plan_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Plan", plan_id))
    }

    async fn find_plan(&self, id: i64) -> Result<Option<PlanRecord>, RepoError> {
        fetch_plan(self.pool(), id).await
    }

    async fn list_plans(&self) -> Result<Vec<PlanRecord>, RepoError> {
        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY is_current DESC, created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PlanRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PlanRecord::try_from).collect()
    }

    async fn delete_plan(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Plan", id));
        }
        Ok(())
    }

    async fn set_current_plan(&self, id: i64) -> Result<PlanRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if fetch_plan(&mut *tx, id).await?.is_none() {
            return Err(RepoError::not_found("Plan", id));
        }

        sqlx::query("UPDATE plans SET is_current = 0 WHERE is_current = 1 AND id <> ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query("UPDATE plans SET is_current = 1, updated_at = ? WHERE id = ?")
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        fetch_plan(self.pool(), id)
            .await?
            .ok_or_else(|| RepoError::not_found("Plan", id))
    }

    async fn current_plan(&self) -> Result<Option<PlanRecord>, RepoError> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE is_current = 1 LIMIT 1");
        sqlx::query_as::<_, PlanRow>(&sql)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(PlanRecord::try_from)
            .transpose()
    }

    async fn update_goals(&self, plan_id: i64, goals: Macros) -> Result<PlanRecord, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE plans
            SET calories = ?, carbs = ?, fat = ?, protein = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(goals.calories)
        .bind(goals.carbs)
        .bind(goals.fat)
        .bind(goals.protein)
        .bind(OffsetDateTime::now_utc())
        .bind(plan_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Plan", plan_id));
        }

        fetch_plan(self.pool(), plan_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Plan", plan_id))
    }

    async fn list_daily_plans(&self, plan_id: i64) -> Result<Vec<DailyPlanRecord>, RepoError> {
        let rows = sqlx::query_as::<_, DailyPlanRow>(
            r#"
            SELECT id, plan_id, date, calories, carbs, fat, protein
            FROM daily_plans
            WHERE plan_id = ?
            ORDER BY date
            "#,
        )
        .bind(plan_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DailyPlanRecord::from).collect())
    }

    async fn find_daily_plan(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<Option<DailyPlanRecord>, RepoError> {
        let row = sqlx::query_as::<_, DailyPlanRow>(
            r#"
            SELECT id, plan_id, date, calories, carbs, fat, protein
            FROM daily_plans
            WHERE plan_id = ? AND date = ?
            "#,
        )
        .bind(plan_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DailyPlanRecord::from))
    }

    async fn add_planned_meal(
        &self,
        params: AddPlannedMealParams,
    ) -> Result<PlannedMealChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let meal = fetch_meal(&mut *tx, params.meal_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Meal", params.meal_id))?;
        if fetch_daily_plan(&mut *tx, params.daily_plan_id).await?.is_none() {
            return Err(RepoError::not_found("Daily plan", params.daily_plan_id));
        }

        let slot = params.slot.unwrap_or(meal.slot);
        let scaled = meal
            .macros
            .for_quantity(params.quantity, meal.quantity)
            .round2();

        let result = sqlx::query(
            r#"
            INSERT INTO daily_plan_meals (
                daily_plan_id, meal_id, meal_type, quantity, calories, carbs, fat, protein
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(params.daily_plan_id)
        .bind(params.meal_id)
        .bind(slot)
        .bind(params.quantity)
        .bind(scaled.calories)
        .bind(scaled.carbs)
        .bind(scaled.fat)
        .bind(scaled.protein)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let entry_id = result.last_insert_rowid();

        adjust_daily_totals(&mut tx, params.daily_plan_id, |totals| totals + scaled).await?;
        let progress = refresh_day_progress(&mut tx, params.daily_plan_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PlannedMealChange {
            entry: DailyPlanMealRecord {
                id: entry_id,
                daily_plan_id: params.daily_plan_id,
                meal_id: params.meal_id,
                slot,
                quantity: params.quantity,
                macros: scaled,
            },
            progress,
        })
    }

    async fn remove_planned_meal(
        &self,
        target: PlannedMealRef,
    ) -> Result<PlannedMealChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let entry = find_entry(&mut tx, target)
            .await?
            .ok_or_else(|| RepoError::missing("Meal is not in this daily plan"))?;

        sqlx::query("DELETE FROM daily_plan_meals WHERE id = ?")
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        subtract_from_daily_totals(&mut tx, entry.daily_plan_id, entry.macros).await?;
        let progress = refresh_day_progress(&mut tx, entry.daily_plan_id).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PlannedMealChange { entry, progress })
    }

    async fn update_planned_quantity(
        &self,
        target: PlannedMealRef,
        quantity: f64,
    ) -> Result<PlannedMealChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let entry = find_entry(&mut tx, target)
            .await?
            .ok_or_else(|| RepoError::missing("Meal is not in this daily plan"))?;
        let meal = fetch_meal(&mut *tx, entry.meal_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Meal", entry.meal_id))?;
        let scaled = meal.macros.for_quantity(quantity, meal.quantity).round2();

        sqlx::query(
            r#"
            UPDATE daily_plan_meals
            SET quantity = ?, calories = ?, carbs = ?, fat = ?, protein = ?
            WHERE id = ?
            "#,
        )
        .bind(quantity)
        .bind(scaled.calories)
        .bind(scaled.carbs)
        .bind(scaled.fat)
        .bind(scaled.protein)
        .bind(entry.id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let previous = entry.macros;
        adjust_daily_totals(&mut tx, entry.daily_plan_id, |totals| {
            totals.saturating_sub(previous) + scaled
        })
        .await?;
        let progress = refresh_day_progress(&mut tx, entry.daily_plan_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PlannedMealChange {
            entry: DailyPlanMealRecord {
                quantity,
                macros: scaled,
                ..entry
            },
            progress,
        })
    }

    async fn list_planned_meals(
        &self,
        daily_plan_id: i64,
        slot: Option<MealSlot>,
    ) -> Result<Vec<PlannedMeal>, RepoError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                e.id AS entry_id, e.daily_plan_id, e.meal_id,
                e.meal_type AS entry_meal_type, e.quantity AS entry_quantity,
                e.calories AS entry_calories, e.carbs AS entry_carbs,
                e.fat AS entry_fat, e.protein AS entry_protein,
                m.name, m.meal_type, m.unit, m.quantity,
                m.calories, m.carbs, m.fat, m.protein,
                m.is_favorite, m.created_at, m.updated_at
            FROM daily_plan_meals e
            INNER JOIN meals m ON m.id = e.meal_id
            WHERE e.daily_plan_id = "#,
        );
        qb.push_bind(daily_plan_id);
        if let Some(slot) = slot {
            qb.push(" AND e.meal_type = ");
            qb.push_bind(slot);
        }
        qb.push(" ORDER BY e.id");

        let rows = qb
            .build_query_as::<PlannedMealRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PlannedMeal::from).collect())
    }
}
