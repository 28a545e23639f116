use async_trait::async_trait;
use sqlx::{Executor, Sqlite, Transaction};
use time::Date;

use crate::{
    application::repos::{MarkConsumedParams, ProgressRepo, RepoError},
    domain::entities::{DailyMealProgressRecord, DailyProgressRecord, ProgressRef},
    domain::nutrition::Macros,
};

use super::{
    SqliteRepositories,
    plans::{fetch_daily_plan, fetch_entry},
    util::{macros, map_sqlx_error},
};

const PROGRESS_COLUMNS: &str =
    "id, plan_id, date, completion_percentage, calories, carbs, fat, protein";

#[derive(sqlx::FromRow)]
struct DailyProgressRow {
    id: i64,
    plan_id: i64,
    date: Date,
    completion_percentage: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

impl From<DailyProgressRow> for DailyProgressRecord {
    fn from(row: DailyProgressRow) -> Self {
        Self {
            id: row.id,
            plan_id: row.plan_id,
            date: row.date,
            completion_percentage: row.completion_percentage,
            consumed: macros(row.calories, row.carbs, row.fat, row.protein),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MealProgressRow {
    id: i64,
    daily_progress_id: i64,
    meal_id: i64,
    daily_plan_meal_id: i64,
    consumed: bool,
    consumed_percentage: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

impl From<MealProgressRow> for DailyMealProgressRecord {
    fn from(row: MealProgressRow) -> Self {
        Self {
            id: row.id,
            daily_progress_id: row.daily_progress_id,
            meal_id: row.meal_id,
            daily_plan_meal_id: row.daily_plan_meal_id,
            consumed: row.consumed,
            consumed_percentage: row.consumed_percentage,
            effective: macros(row.calories, row.carbs, row.fat, row.protein),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConsumedTotalsRow {
    consumed_count: i64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

async fn fetch_progress<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<DailyProgressRecord>, RepoError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {PROGRESS_COLUMNS} FROM daily_progress WHERE id = ?");
    let row = sqlx::query_as::<_, DailyProgressRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(DailyProgressRecord::from))
}

#[derive(sqlx::FromRow)]
struct ConsumedEntryRow {
    id: i64,
    consumed_percentage: f64,
    calories: f64,
    carbs: f64,
    fat: f64,
    protein: f64,
}

/// Share of planned entries marked consumed, in percent with two decimals.
fn completion(consumed: i64, planned: i64) -> f64 {
    if planned <= 0 {
        return 0.0;
    }
    let pct = (consumed as f64 / planned as f64 * 100.0).min(100.0);
    (pct * 100.0).round() / 100.0
}

/// Store the consumed totals and completion of a progress row, derived from
/// its consumed meal rows and the entries planned for `daily_plan_id`.
async fn recompute_totals(
    tx: &mut Transaction<'_, Sqlite>,
    daily_progress_id: i64,
    daily_plan_id: i64,
) -> Result<(f64, Macros), RepoError> {
    let totals = sqlx::query_as::<_, ConsumedTotalsRow>(
        r#"
        SELECT
            COUNT(*) AS consumed_count,
            COALESCE(SUM(calories), 0.0) AS calories,
            COALESCE(SUM(carbs), 0.0) AS carbs,
            COALESCE(SUM(fat), 0.0) AS fat,
            COALESCE(SUM(protein), 0.0) AS protein
        FROM daily_meal_progress
        WHERE daily_progress_id = ? AND consumed = 1
        "#,
    )
    .bind(daily_progress_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    let planned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM daily_plan_meals WHERE daily_plan_id = ?",
    )
    .bind(daily_plan_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    let consumed = macros(totals.calories, totals.carbs, totals.fat, totals.protein).round2();
    let completion_percentage = completion(totals.consumed_count, planned);

    sqlx::query(
        r#"
        UPDATE daily_progress
        SET completion_percentage = ?, calories = ?, carbs = ?, fat = ?, protein = ?
        WHERE id = ?
        "#,
    )
    .bind(completion_percentage)
    .bind(consumed.calories)
    .bind(consumed.carbs)
    .bind(consumed.fat)
    .bind(consumed.protein)
    .bind(daily_progress_id)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok((completion_percentage, consumed))
}

/// Bring the progress row of a plan day back in line with its planned entries.
///
/// Consumed rows are rescaled to their entry's current macros, then totals and
/// completion are recomputed. Days nobody tracked yet are left alone.
pub(super) async fn refresh_day_progress(
    tx: &mut Transaction<'_, Sqlite>,
    daily_plan_id: i64,
) -> Result<Option<ProgressRef>, RepoError> {
    let Some(daily_plan) = fetch_daily_plan(&mut **tx, daily_plan_id).await? else {
        return Ok(None);
    };
    let progress_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM daily_progress WHERE plan_id = ? AND date = ?",
    )
    .bind(daily_plan.plan_id)
    .bind(daily_plan.date)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    let Some(progress_id) = progress_id else {
        return Ok(None);
    };

    let consumed_rows = sqlx::query_as::<_, ConsumedEntryRow>(
        r#"
        SELECT mp.id, mp.consumed_percentage, e.calories, e.carbs, e.fat, e.protein
        FROM daily_meal_progress mp
        INNER JOIN daily_plan_meals e ON e.id = mp.daily_plan_meal_id
        WHERE mp.daily_progress_id = ? AND mp.consumed = 1
        "#,
    )
    .bind(progress_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    for row in consumed_rows {
        let effective = macros(row.calories, row.carbs, row.fat, row.protein)
            .percentage(row.consumed_percentage)
            .round2();
        sqlx::query(
            r#"
            UPDATE daily_meal_progress
            SET calories = ?, carbs = ?, fat = ?, protein = ?
            WHERE id = ?
            "#,
        )
        .bind(effective.calories)
        .bind(effective.carbs)
        .bind(effective.fat)
        .bind(effective.protein)
        .bind(row.id)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    recompute_totals(tx, progress_id, daily_plan_id).await?;
    Ok(Some(ProgressRef {
        id: progress_id,
        plan_id: daily_plan.plan_id,
    }))
}

#[async_trait]
impl ProgressRepo for SqliteRepositories {
    async fn get_or_create_daily_progress(
        &self,
        plan_id: i64,
        date: Date,
    ) -> Result<DailyProgressRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let plan_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plans WHERE id = ?")
            .bind(plan_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if plan_exists == 0 {
            return Err(RepoError::not_found("Plan", plan_id));
        }

        sqlx::query(
            r#"
            INSERT INTO daily_progress (plan_id, date)
            VALUES (?, ?)
            ON CONFLICT (plan_id, date) DO NOTHING
            "#,
        )
        .bind(plan_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let sql =
            format!("SELECT {PROGRESS_COLUMNS} FROM daily_progress WHERE plan_id = ? AND date = ?");
        let row = sqlx::query_as::<_, DailyProgressRow>(&sql)
            .bind(plan_id)
            .bind(date)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_daily_progress(
        &self,
        id: i64,
    ) -> Result<Option<DailyProgressRecord>, RepoError> {
        fetch_progress(self.pool(), id).await
    }

    async fn mark_meal_consumed(
        &self,
        params: MarkConsumedParams,
    ) -> Result<DailyProgressRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let progress = fetch_progress(&mut *tx, params.daily_progress_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Daily progress", params.daily_progress_id))?;
        let entry = fetch_entry(&mut *tx, params.daily_plan_meal_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Planned meal", params.daily_plan_meal_id))?;
        if entry.meal_id != params.meal_id {
            return Err(RepoError::invalid_input(format!(
                "meal {} is not planned in entry {}",
                params.meal_id, entry.id
            )));
        }
        let daily_plan = fetch_daily_plan(&mut *tx, entry.daily_plan_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Daily plan", entry.daily_plan_id))?;
        if daily_plan.plan_id != progress.plan_id || daily_plan.date != progress.date {
            return Err(RepoError::invalid_input(format!(
                "entry {} is not planned for this day",
                entry.id
            )));
        }

        let effective = if params.consumed {
            entry.macros.percentage(params.percentage).round2()
        } else {
            Macros::ZERO
        };

        sqlx::query(
            r#"
            INSERT INTO daily_meal_progress (
                daily_progress_id, meal_id, daily_plan_meal_id, consumed,
                consumed_percentage, calories, carbs, fat, protein
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (daily_progress_id, daily_plan_meal_id) DO UPDATE SET
                consumed = excluded.consumed,
                consumed_percentage = excluded.consumed_percentage,
                calories = excluded.calories,
                carbs = excluded.carbs,
                fat = excluded.fat,
                protein = excluded.protein
            "#,
        )
        .bind(progress.id)
        .bind(params.meal_id)
        .bind(entry.id)
        .bind(params.consumed)
        .bind(params.percentage)
        .bind(effective.calories)
        .bind(effective.carbs)
        .bind(effective.fat)
        .bind(effective.protein)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let (completion_percentage, consumed) =
            recompute_totals(&mut tx, progress.id, daily_plan.id).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(DailyProgressRecord {
            completion_percentage,
            consumed,
            ..progress
        })
    }

    async fn list_meal_progress(
        &self,
        daily_progress_id: i64,
    ) -> Result<Vec<DailyMealProgressRecord>, RepoError> {
        let rows = sqlx::query_as::<_, MealProgressRow>(
            r#"
            SELECT
                id, daily_progress_id, meal_id, daily_plan_meal_id, consumed,
                consumed_percentage, calories, carbs, fat, protein
            FROM daily_meal_progress
            WHERE daily_progress_id = ?
            ORDER BY id
            "#,
        )
        .bind(daily_progress_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DailyMealProgressRecord::from).collect())
    }

    async fn list_progress_for_plan(
        &self,
        plan_id: i64,
    ) -> Result<Vec<DailyProgressRecord>, RepoError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM daily_progress WHERE plan_id = ? ORDER BY date"
        );
        let rows = sqlx::query_as::<_, DailyProgressRow>(&sql)
            .bind(plan_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DailyProgressRecord::from).collect())
    }
}
