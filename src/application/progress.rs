use std::sync::Arc;

use time::Date;
use tracing::info;

use crate::application::operation::OperationResult;
use crate::application::repos::{MarkConsumedParams, ProgressRepo};
use crate::domain::entities::{DailyMealProgressRecord, DailyProgressRecord};
use crate::domain::nutrition::validate_percentage;

pub const FULL_PORTION: f64 = 100.0;

#[derive(Clone)]
pub struct ProgressService {
    progress: Arc<dyn ProgressRepo>,
}

impl ProgressService {
    pub fn new(progress: Arc<dyn ProgressRepo>) -> Self {
        Self { progress }
    }

    pub async fn get_or_create_daily_progress(
        &self,
        plan_id: i64,
        date: Date,
    ) -> OperationResult<DailyProgressRecord> {
        Ok(self.progress.get_or_create_daily_progress(plan_id, date).await?)
    }

    pub async fn daily_progress(
        &self,
        daily_progress_id: i64,
    ) -> OperationResult<Option<DailyProgressRecord>> {
        Ok(self.progress.find_daily_progress(daily_progress_id).await?)
    }

    /// Record how much of a planned meal was eaten and refresh the day totals.
    pub async fn mark_meal_as_consumed(
        &self,
        params: MarkConsumedParams,
    ) -> OperationResult<DailyProgressRecord> {
        validate_percentage(params.percentage)?;
        let progress = self.progress.mark_meal_consumed(params).await?;
        info!(
            category = "progress",
            daily_progress_id = progress.id,
            meal_id = params.meal_id,
            consumed = params.consumed,
            completion = progress.completion_percentage,
            "Meal consumption updated"
        );
        Ok(progress)
    }

    pub async fn meal_progress(
        &self,
        daily_progress_id: i64,
    ) -> OperationResult<Vec<DailyMealProgressRecord>> {
        Ok(self.progress.list_meal_progress(daily_progress_id).await?)
    }

    pub async fn list_progress_for_plan(
        &self,
        plan_id: i64,
    ) -> OperationResult<Vec<DailyProgressRecord>> {
        Ok(self.progress.list_progress_for_plan(plan_id).await?)
    }
}
