use std::{process, sync::Arc};

use nutrio::{
    application::{
        error::AppError,
        ingredients::{AddIngredientToMealCommand, CreateIngredientCommand, IngredientService},
        meals::{CreateMealCommand, MealService},
        mutations::{
            AddIngredientToMeal, AddMealToDailyPlan, AddMealVariables, CreateIngredient,
            CreateMeal, CreatePlan, DeleteIngredient, DeleteMeal, DeletePlan,
            IngredientIdVariables, MarkMealConsumed, MarkMealConsumedVariables, MealIdVariables,
            MutationRunner, PlanIdVariables, RemoveIngredientFromMeal, RemoveIngredientVariables,
            RemoveMealFromDailyPlan, RemoveMealVariables, SetCurrentPlan, ToggleFavoriteMeal,
            UpdateGoalsVariables, UpdateMealQuantity, UpdateNutritionGoals,
            UpdateQuantityVariables,
        },
        operation::OperationOutcome,
        plans::{CreatePlanCommand, PlanService},
        progress::ProgressService,
        queries::{IngredientQueries, MealQueries, PlanQueries, ProgressQueries},
        repos::MealQueryFilter,
    },
    cache::{CacheConfig, InvalidationMode, InvalidationTrigger, QueryClient, QuerySnapshot},
    config::{self, Command, IngredientsCommand, MealsCommand, PlansCommand, ProgressCommand},
    infra::{db::SqliteRepositories, error::InfraError, telemetry},
    presentation::query_state::{QueryStateView, RenderState},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = init_repositories(&settings).await?;
    if matches!(cli_args.command, Command::Migrate) {
        info!(url = %settings.database.url, "Database migrations applied");
        return Ok(());
    }

    let app = AppContext::new(repositories, CacheConfig::from(&settings.cache));
    let auto_consume = (app.trigger.config().invalidation_mode == InvalidationMode::Deferred)
        .then(|| app.trigger.spawn_auto_consume());
    let garbage_collector = app
        .client
        .config()
        .is_enabled()
        .then(|| app.client.spawn_garbage_collector());

    let result = match cli_args.command {
        Command::Migrate => Ok(()),
        Command::Meals(command) => run_meals(&app, command).await,
        Command::Plans(command) => run_plans(&app, command).await,
        Command::Progress(command) => run_progress(&app, command).await,
        Command::Ingredients(command) => run_ingredients(&app, command).await,
    };

    // Deferred invalidations must land before the process exits.
    let report = app.trigger.flush().await;
    if report.events > 0 {
        info!(
            category = "cache",
            events = report.events,
            invalidated = report.invalidated,
            failed = report.failed,
            "Flushed pending invalidations"
        );
    }
    for handle in [auto_consume, garbage_collector].into_iter().flatten() {
        handle.abort();
    }

    result
}

async fn init_repositories(settings: &config::Settings) -> Result<SqliteRepositories, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    let repositories = SqliteRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(repositories)
}

struct AppContext {
    client: Arc<QueryClient>,
    trigger: Arc<InvalidationTrigger>,
    runner: MutationRunner,
    plans: PlanService,
    meals: MealService,
    progress: ProgressService,
    ingredients: IngredientService,
    plan_queries: PlanQueries,
    meal_queries: MealQueries,
    progress_queries: ProgressQueries,
    ingredient_queries: IngredientQueries,
}

impl AppContext {
    fn new(repositories: SqliteRepositories, cache: CacheConfig) -> Self {
        let repositories = Arc::new(repositories);
        let client = Arc::new(QueryClient::new(cache.clone()));
        let trigger = Arc::new(InvalidationTrigger::new(cache, client.clone()));

        let plans = PlanService::new(repositories.clone());
        let meals = MealService::new(repositories.clone());
        let progress = ProgressService::new(repositories.clone());
        let ingredients = IngredientService::new(repositories);

        Self {
            runner: MutationRunner::new(trigger.clone()),
            trigger,
            plan_queries: PlanQueries::new(client.clone(), plans.clone()),
            meal_queries: MealQueries::new(client.clone(), meals.clone()),
            progress_queries: ProgressQueries::new(client.clone(), progress.clone()),
            ingredient_queries: IngredientQueries::new(client.clone(), ingredients.clone()),
            client,
            plans,
            meals,
            progress,
            ingredients,
        }
    }
}

#[derive(Serialize)]
struct Rendered<'a, T> {
    state: RenderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{encoded}");
    Ok(())
}

fn print_outcome<T, E>(result: Result<T, E>) -> Result<(), AppError>
where
    T: Serialize,
    E: std::fmt::Display,
{
    print_json(&OperationOutcome::from(result))
}

/// Print a cached query the way a view would render it.
fn print_snapshot<T: Serialize>(snapshot: &QuerySnapshot<T>) -> Result<(), AppError> {
    let view = QueryStateView::from_snapshot(snapshot);
    let rendered = view.render(
        || Rendered {
            state: RenderState::Loading,
            data: None,
        },
        || Rendered {
            state: RenderState::NotFound,
            data: None,
        },
        |data| Rendered {
            state: RenderState::Ready,
            data: Some(data),
        },
    );
    print_json(&rendered)
}

async fn run_meals(app: &AppContext, command: MealsCommand) -> Result<(), AppError> {
    match command {
        MealsCommand::Create(args) => {
            let command = CreateMealCommand {
                name: args.name,
                slot: args.slot,
                unit: args.unit,
                quantity: args.quantity,
                macros: args.macros.into(),
            };
            let mutation = CreateMeal::new(app.meals.clone());
            print_outcome(app.runner.mutate(&mutation, command).await)
        }
        MealsCommand::List(args) => {
            let filter = MealQueryFilter {
                slot: args.slot,
                search: args.search,
                favorites_only: args.favorites,
            };
            if filter.slot.is_none() && filter.search.is_none() && !filter.favorites_only {
                app.meal_queries.meals_list().await?;
                print_snapshot(&app.meal_queries.meals_list_snapshot()?)
            } else {
                print_outcome(app.meals.list_meals(&filter).await)
            }
        }
        MealsCommand::Show { id } => {
            app.meal_queries.meal(id).await?;
            print_snapshot(&app.meal_queries.meal_snapshot(id)?)
        }
        MealsCommand::Delete { id } => {
            let mutation = DeleteMeal::new(app.meals.clone());
            let variables = MealIdVariables { meal_id: id };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        MealsCommand::Favorite { id } => {
            let mutation = ToggleFavoriteMeal::new(app.meals.clone());
            let variables = MealIdVariables { meal_id: id };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        MealsCommand::AddIngredient(args) => {
            let mutation = AddIngredientToMeal::new(app.ingredients.clone());
            let command = AddIngredientToMealCommand {
                meal_id: args.meal_id,
                ingredient_id: args.ingredient_id,
                quantity: args.quantity,
            };
            print_outcome(app.runner.mutate(&mutation, command).await)
        }
        MealsCommand::RemoveIngredient {
            meal_id,
            meal_ingredient_id,
        } => {
            let mutation = RemoveIngredientFromMeal::new(app.ingredients.clone());
            let variables = RemoveIngredientVariables {
                meal_id,
                meal_ingredient_id,
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        MealsCommand::Ingredients { id } => {
            app.ingredient_queries.meal_ingredients(id).await?;
            print_snapshot(&app.ingredient_queries.meal_ingredients_snapshot(id)?)
        }
    }
}

async fn run_ingredients(app: &AppContext, command: IngredientsCommand) -> Result<(), AppError> {
    match command {
        IngredientsCommand::Create(args) => {
            let command = CreateIngredientCommand {
                name: args.name,
                unit: args.unit,
                quantity: args.quantity,
                macros: args.macros.into(),
            };
            let mutation = CreateIngredient::new(app.ingredients.clone());
            print_outcome(app.runner.mutate(&mutation, command).await)
        }
        IngredientsCommand::List { search } => match search {
            Some(search) => print_outcome(app.ingredients.list_ingredients(Some(&search)).await),
            None => {
                app.ingredient_queries.ingredients_list().await?;
                print_snapshot(&app.ingredient_queries.ingredients_list_snapshot()?)
            }
        },
        IngredientsCommand::Show { id } => {
            app.ingredient_queries.ingredient(id).await?;
            print_snapshot(&app.ingredient_queries.ingredient_snapshot(id)?)
        }
        IngredientsCommand::Delete { id } => {
            let mutation = DeleteIngredient::new(app.ingredients.clone());
            let variables = IngredientIdVariables { ingredient_id: id };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
    }
}

async fn run_plans(app: &AppContext, command: PlansCommand) -> Result<(), AppError> {
    match command {
        PlansCommand::Create(args) => {
            let command = CreatePlanCommand {
                name: args.name,
                goal: args.goal,
                start_date: args.start_date,
                duration_weeks: args.weeks,
                goals: args.goals.into(),
            };
            let mutation = CreatePlan::new(app.plans.clone());
            print_outcome(app.runner.mutate(&mutation, command).await)
        }
        PlansCommand::List => {
            app.plan_queries.plans_list().await?;
            print_snapshot(&app.plan_queries.plans_list_snapshot()?)
        }
        PlansCommand::Show { id } => {
            app.plan_queries.plan_details(id).await?;
            print_snapshot(&app.plan_queries.plan_details_snapshot(id)?)
        }
        PlansCommand::Delete { id } => {
            let mutation = DeletePlan::new(app.plans.clone());
            let variables = PlanIdVariables { plan_id: id };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::SetCurrent { id } => {
            let mutation = SetCurrentPlan::new(app.plans.clone());
            let variables = PlanIdVariables { plan_id: id };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::Goals(args) => {
            let mutation = UpdateNutritionGoals::new(app.plans.clone());
            let variables = UpdateGoalsVariables {
                plan_id: args.plan_id,
                goals: args.goals.into(),
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::AddMeal(args) => {
            let daily_plan = app
                .plans
                .require_daily_plan(args.day.plan_id, args.day.date)
                .await?;
            let mutation = AddMealToDailyPlan::new(app.plans.clone());
            let variables = AddMealVariables {
                plan_id: args.day.plan_id,
                date: args.day.date,
                daily_plan_id: daily_plan.id,
                meal_id: args.meal_id,
                quantity: args.quantity,
                slot: args.slot,
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::RemoveMeal(args) => {
            let daily_plan = app
                .plans
                .require_daily_plan(args.day.plan_id, args.day.date)
                .await?;
            let mutation = RemoveMealFromDailyPlan::new(app.plans.clone());
            let variables = RemoveMealVariables {
                plan_id: args.day.plan_id,
                date: args.day.date,
                daily_plan_id: daily_plan.id,
                meal_id: args.meal_id,
                slot: args.slot,
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::UpdateQuantity(args) => {
            let day = args.target.day;
            let daily_plan = app.plans.require_daily_plan(day.plan_id, day.date).await?;
            let mutation = UpdateMealQuantity::new(app.plans.clone());
            let variables = UpdateQuantityVariables {
                plan_id: day.plan_id,
                date: day.date,
                daily_plan_id: daily_plan.id,
                meal_id: args.target.meal_id,
                slot: args.target.slot,
                quantity: args.quantity,
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        PlansCommand::Nutrition(day) => {
            app.plan_queries.daily_nutrition(day.plan_id, day.date).await?;
            print_snapshot(
                &app.plan_queries
                    .daily_nutrition_snapshot(day.plan_id, day.date)?,
            )
        }
        PlansCommand::Slot(args) => {
            let day = args.day;
            app.plan_queries
                .meals_by_slot(day.plan_id, day.date, args.slot)
                .await?;
            print_snapshot(
                &app.plan_queries
                    .meals_by_slot_snapshot(day.plan_id, day.date, args.slot)?,
            )
        }
    }
}

async fn run_progress(app: &AppContext, command: ProgressCommand) -> Result<(), AppError> {
    match command {
        ProgressCommand::Mark(args) => {
            let progress = app
                .progress
                .get_or_create_daily_progress(args.day.plan_id, args.day.date)
                .await?;
            let mutation = MarkMealConsumed::new(app.progress.clone());
            let variables = MarkMealConsumedVariables {
                daily_progress_id: progress.id,
                meal_id: args.meal_id,
                daily_plan_meal_id: args.daily_plan_meal_id,
                consumed: !args.undo,
                percentage: args.percentage,
            };
            print_outcome(app.runner.mutate(&mutation, variables).await)
        }
        ProgressCommand::Show(day) => {
            let progress = app
                .progress
                .get_or_create_daily_progress(day.plan_id, day.date)
                .await?;
            app.progress_queries.daily_progress(progress.id).await?;
            print_snapshot(&app.progress_queries.daily_progress_snapshot(progress.id)?)
        }
        ProgressCommand::List { plan_id } => {
            app.progress_queries.progress_list(plan_id).await?;
            print_snapshot(&app.progress_queries.progress_list_snapshot(plan_id)?)
        }
    }
}
