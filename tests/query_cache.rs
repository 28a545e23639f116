//! Query hooks and mutation hooks sharing one cache.

use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use nutrio::application::ingredients::{
    AddIngredientToMealCommand, CreateIngredientCommand, IngredientService,
};
use nutrio::application::meals::{CreateMealCommand, MealService};
use nutrio::application::mutations::{
    AddIngredientToMeal, AddMealToDailyPlan, AddMealVariables, MarkMealConsumed,
    MarkMealConsumedVariables, MutationRunner, PlanIdVariables, SetCurrentPlan,
};
use nutrio::application::plans::{CreatePlanCommand, PlanService};
use nutrio::application::progress::ProgressService;
use nutrio::application::queries::{IngredientQueries, PlanQueries, ProgressQueries};
use nutrio::cache::{CacheConfig, InvalidationMode, InvalidationTrigger, QueryClient, keys};
use nutrio::domain::nutrition::Macros;
use nutrio::domain::types::{MealSlot, MealUnit, PlanGoal};
use nutrio::infra::db::SqliteRepositories;
use nutrio::presentation::query_state::{QueryStateView, RenderState};
use time::{Date, macros::date};

const DAY: Date = date!(2024 - 01 - 01);

struct App {
    client: Arc<QueryClient>,
    runner: MutationRunner,
    plans: PlanService,
    meals: MealService,
    progress: ProgressService,
    ingredients: IngredientService,
    plan_queries: PlanQueries,
    progress_queries: ProgressQueries,
    ingredient_queries: IngredientQueries,
}

async fn app(mode: InvalidationMode) -> App {
    let pool = SqliteRepositories::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("migrations apply");
    let repos = Arc::new(SqliteRepositories::new(pool));

    let config = CacheConfig {
        invalidation_mode: mode,
        ..CacheConfig::default()
    };
    let client = Arc::new(QueryClient::new(config.clone()));
    let trigger = Arc::new(InvalidationTrigger::new(config, client.clone()));

    let plans = PlanService::new(repos.clone());
    let meals = MealService::new(repos.clone());
    let progress = ProgressService::new(repos.clone());
    let ingredients = IngredientService::new(repos);

    App {
        runner: MutationRunner::new(trigger),
        plan_queries: PlanQueries::new(client.clone(), plans.clone()),
        progress_queries: ProgressQueries::new(client.clone(), progress.clone()),
        ingredient_queries: IngredientQueries::new(client.clone(), ingredients.clone()),
        client,
        plans,
        meals,
        progress,
        ingredients,
    }
}

async fn seed_plan_and_meal(app: &App) -> (i64, i64, i64) {
    let plan = app
        .plans
        .create_plan(CreatePlanCommand {
            name: "Plan".to_string(),
            goal: PlanGoal::Maintain,
            start_date: DAY,
            duration_weeks: 1,
            goals: Macros::new(2000.0, 220.0, 70.0, 120.0),
        })
        .await
        .unwrap();
    let meal = app
        .meals
        .create_meal(CreateMealCommand {
            name: "Yogurt".to_string(),
            slot: MealSlot::Breakfast,
            unit: MealUnit::Gram,
            quantity: None,
            macros: Macros::new(60.0, 4.7, 3.3, 3.5),
        })
        .await
        .unwrap();
    let daily_plan = app.plans.require_daily_plan(plan.id, DAY).await.unwrap();
    (plan.id, daily_plan.id, meal.id)
}

async fn plan_meal(app: &App, plan_id: i64, daily_plan_id: i64, meal_id: i64) -> i64 {
    app.runner
        .mutate(
            &AddMealToDailyPlan::new(app.plans.clone()),
            AddMealVariables {
                plan_id,
                date: DAY,
                daily_plan_id,
                meal_id,
                quantity: 150.0,
                slot: None,
            },
        )
        .await
        .expect("meal planned")
        .entry
        .id
}

#[tokio::test]
async fn planned_meal_shows_up_after_invalidation() {
    let app = app(InvalidationMode::Await).await;
    let (plan_id, daily_plan_id, meal_id) = seed_plan_and_meal(&app).await;

    let before = app
        .plan_queries
        .meals_by_slot(plan_id, DAY, MealSlot::Breakfast)
        .await
        .unwrap();
    assert!(before.is_empty());
    let nutrition = app
        .plan_queries
        .daily_nutrition(plan_id, DAY)
        .await
        .unwrap()
        .expect("day exists");
    assert_eq!(nutrition.totals.calories, 0.0);

    plan_meal(&app, plan_id, daily_plan_id, meal_id).await;

    let slot_key = keys::meals_by_slot(plan_id, DAY, MealSlot::Breakfast);
    assert_eq!(app.client.is_stale(&slot_key), Some(true));
    assert_eq!(
        app.client.is_stale(&keys::daily_nutrition(plan_id, DAY)),
        Some(true)
    );

    let after = app
        .plan_queries
        .meals_by_slot(plan_id, DAY, MealSlot::Breakfast)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].entry.macros.calories, 90.0);
    assert_eq!(app.client.is_stale(&slot_key), Some(false));

    let nutrition = app
        .plan_queries
        .daily_nutrition(plan_id, DAY)
        .await
        .unwrap()
        .expect("day exists");
    assert_eq!(nutrition.totals.calories, 90.0);
}

#[tokio::test]
async fn consumption_leaves_plan_queries_fresh() {
    let app = app(InvalidationMode::Await).await;
    let (plan_id, daily_plan_id, meal_id) = seed_plan_and_meal(&app).await;
    let entry_id = plan_meal(&app, plan_id, daily_plan_id, meal_id).await;

    app.plan_queries.daily_nutrition(plan_id, DAY).await.unwrap();
    let progress = app
        .progress
        .get_or_create_daily_progress(plan_id, DAY)
        .await
        .unwrap();
    let cached = app
        .progress_queries
        .daily_progress(progress.id)
        .await
        .unwrap()
        .expect("progress exists");
    assert_eq!(cached.completion_percentage, 0.0);

    app.runner
        .mutate(
            &MarkMealConsumed::new(app.progress.clone()),
            MarkMealConsumedVariables {
                daily_progress_id: progress.id,
                meal_id,
                daily_plan_meal_id: entry_id,
                consumed: true,
                percentage: None,
            },
        )
        .await
        .expect("consumption recorded");

    assert_eq!(
        app.client.is_stale(&keys::daily_nutrition(plan_id, DAY)),
        Some(false)
    );
    assert_eq!(
        app.client.is_stale(&keys::daily_progress(progress.id)),
        Some(true)
    );

    let refreshed = app
        .progress_queries
        .daily_progress(progress.id)
        .await
        .unwrap()
        .expect("progress exists");
    assert_eq!(refreshed.completion_percentage, 100.0);
    assert_eq!(refreshed.consumed.calories, 90.0);
}

#[tokio::test]
async fn deferred_invalidation_lands_after_flush() {
    let app = app(InvalidationMode::Deferred).await;
    let (plan_id, daily_plan_id, meal_id) = seed_plan_and_meal(&app).await;
    app.plan_queries
        .meals_by_slot(plan_id, DAY, MealSlot::Breakfast)
        .await
        .unwrap();

    plan_meal(&app, plan_id, daily_plan_id, meal_id).await;
    app.runner.trigger().flush().await;

    assert_eq!(
        app.client
            .is_stale(&keys::meals_by_slot(plan_id, DAY, MealSlot::Breakfast)),
        Some(true)
    );
    assert!(app.runner.trigger().queue().is_empty());
}

#[tokio::test]
async fn switching_current_plan_refreshes_both_plan_details() {
    let app = app(InvalidationMode::Await).await;
    let (first, _, _) = seed_plan_and_meal(&app).await;
    let second = app
        .plans
        .create_plan(CreatePlanCommand {
            name: "Second".to_string(),
            goal: PlanGoal::GainMuscle,
            start_date: DAY,
            duration_weeks: 1,
            goals: Macros::new(2800.0, 320.0, 90.0, 180.0),
        })
        .await
        .unwrap()
        .id;
    app.plans.set_current_plan(first).await.unwrap();

    for plan_id in [first, second] {
        app.plan_queries.plan_details(plan_id).await.unwrap();
    }

    app.runner
        .mutate(
            &SetCurrentPlan::new(app.plans.clone()),
            PlanIdVariables { plan_id: second },
        )
        .await
        .expect("current plan switched");

    assert_eq!(app.client.is_stale(&keys::plan(first)), Some(true));
    assert_eq!(app.client.is_stale(&keys::plan(second)), Some(true));

    let previous = app.plan_queries.plan_details(first).await.unwrap().unwrap();
    let current = app.plan_queries.plan_details(second).await.unwrap().unwrap();
    assert!(!previous.plan.is_current);
    assert!(current.plan.is_current);
}

#[tokio::test]
async fn adding_an_ingredient_refreshes_the_meal_composition() {
    let app = app(InvalidationMode::Await).await;
    let (_, _, meal_id) = seed_plan_and_meal(&app).await;
    let honey = app
        .ingredients
        .create_ingredient(CreateIngredientCommand {
            name: "Honey".to_string(),
            unit: MealUnit::Gram,
            quantity: None,
            macros: Macros::new(304.0, 82.0, 0.0, 0.3),
        })
        .await
        .unwrap();
    assert!(app.ingredient_queries.meal_ingredients(meal_id).await.unwrap().is_empty());
    app.ingredient_queries.ingredients_list().await.unwrap();

    app.runner
        .mutate(
            &AddIngredientToMeal::new(app.ingredients.clone()),
            AddIngredientToMealCommand {
                meal_id,
                ingredient_id: honey.id,
                quantity: 20.0,
            },
        )
        .await
        .expect("ingredient added");

    assert_eq!(app.client.is_stale(&keys::meal_ingredients(meal_id)), Some(true));
    assert_eq!(app.client.is_stale(&keys::ingredients_list()), Some(false));
    let composition = app.ingredient_queries.meal_ingredients(meal_id).await.unwrap();
    assert_eq!(composition.len(), 1);
    assert_eq!(composition[0].macros.calories, 60.8);
}

#[tokio::test]
async fn snapshots_resolve_to_render_states() {
    let app = app(InvalidationMode::Await).await;
    let (plan_id, _, _) = seed_plan_and_meal(&app).await;

    let pending = app.plan_queries.plan_details_snapshot(plan_id).unwrap();
    assert_eq!(QueryStateView::from_snapshot(&pending).state(), RenderState::Loading);

    app.plan_queries.plan_details(plan_id).await.unwrap();
    let ready = app.plan_queries.plan_details_snapshot(plan_id).unwrap();
    let name = QueryStateView::from_snapshot(&ready).render(
        || None,
        || None,
        |details| Some(details.plan.name.clone()),
    );
    assert_eq!(name.as_deref(), Some("Plan"));

    app.plan_queries.plan_details(999).await.unwrap();
    let missing = app.plan_queries.plan_details_snapshot(999).unwrap();
    assert_eq!(QueryStateView::from_snapshot(&missing).state(), RenderState::NotFound);
}

#[test]
fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let app = app(InvalidationMode::Deferred).await;
            let (plan_id, daily_plan_id, meal_id) = seed_plan_and_meal(&app).await;
            app.plan_queries.plans_list().await.unwrap();
            app.plan_queries.plans_list().await.unwrap();
            plan_meal(&app, plan_id, daily_plan_id, meal_id).await;
            app.plan_queries.plan_details(plan_id).await.unwrap();
            app.runner.trigger().flush().await;
        })
    });

    let names: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();
    for expected in [
        "nutrio_query_cache_hit_total",
        "nutrio_query_cache_miss_total",
        "nutrio_invalidation_queue_len",
        "nutrio_invalidation_consume_ms",
    ] {
        assert!(
            names.iter().any(|name| name == expected),
            "missing {expected} in {names:?}"
        );
    }
}
