//! SQLite repositories: running totals, completion and error messages.

use std::sync::Arc;

use nutrio::application::ingredients::{
    AddIngredientToMealCommand, CreateIngredientCommand, IngredientService,
};
use nutrio::application::meals::{CreateMealCommand, MealService};
use nutrio::application::operation::OperationErrorKind;
use nutrio::application::plans::{AddMealToDailyPlanCommand, CreatePlanCommand, PlanService};
use nutrio::application::progress::ProgressService;
use nutrio::application::repos::{MarkConsumedParams, MealQueryFilter, PlannedMealRef};
use nutrio::domain::entities::ProgressRef;
use nutrio::domain::nutrition::Macros;
use nutrio::domain::types::{MealSlot, MealUnit, PlanGoal};
use nutrio::infra::db::SqliteRepositories;
use time::{Date, macros::date};

const DAY: Date = date!(2024 - 01 - 01);

struct Fixture {
    plans: PlanService,
    meals: MealService,
    progress: ProgressService,
    ingredients: IngredientService,
}

async fn fixture() -> Fixture {
    let pool = SqliteRepositories::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("migrations apply");
    let repos = Arc::new(SqliteRepositories::new(pool));
    Fixture {
        plans: PlanService::new(repos.clone()),
        meals: MealService::new(repos.clone()),
        progress: ProgressService::new(repos.clone()),
        ingredients: IngredientService::new(repos),
    }
}

async fn create_plan(fixture: &Fixture, name: &str, weeks: u32) -> i64 {
    fixture
        .plans
        .create_plan(CreatePlanCommand {
            name: name.to_string(),
            goal: PlanGoal::Maintain,
            start_date: DAY,
            duration_weeks: weeks,
            goals: Macros::new(2200.0, 250.0, 70.0, 140.0),
        })
        .await
        .expect("plan created")
        .id
}

async fn create_meal(fixture: &Fixture, name: &str, slot: MealSlot, macros: Macros) -> i64 {
    fixture
        .meals
        .create_meal(CreateMealCommand {
            name: name.to_string(),
            slot,
            unit: MealUnit::Gram,
            quantity: None,
            macros,
        })
        .await
        .expect("meal created")
        .id
}

#[tokio::test]
async fn plan_creation_lays_out_every_day() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Four weeks", 4).await;

    let details = fixture
        .plans
        .get_plan_details(plan_id)
        .await
        .unwrap()
        .expect("plan exists");
    assert_eq!(details.daily_plans.len(), 28);
    assert_eq!(details.daily_plans[0].date, DAY);
    assert_eq!(details.daily_plans[27].date, date!(2024 - 01 - 28));
    assert!(details.daily_plans.iter().all(|day| day.totals == Macros::ZERO));
}

#[tokio::test]
async fn planned_meals_scale_and_accumulate_day_totals() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Bulk", 1).await;
    let rice = create_meal(
        &fixture,
        "Rice",
        MealSlot::Lunch,
        Macros::new(130.0, 28.0, 0.3, 2.7),
    )
    .await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let entry = fixture
        .plans
        .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
            daily_plan_id: daily_plan.id,
            meal_id: rice,
            quantity: 200.0,
            slot: None,
        })
        .await
        .unwrap()
        .entry;
    assert_eq!(entry.slot, MealSlot::Lunch);
    assert_eq!(entry.macros, Macros::new(260.0, 56.0, 0.6, 5.4));

    let nutrition = fixture
        .plans
        .daily_nutrition(plan_id, DAY)
        .await
        .unwrap()
        .expect("day exists");
    assert_eq!(nutrition.totals.calories, 260.0);
    assert_eq!(nutrition.total_weight, 200.0);

    let updated = fixture
        .plans
        .update_meal_quantity(
            PlannedMealRef {
                daily_plan_id: daily_plan.id,
                meal_id: rice,
                slot: MealSlot::Lunch,
            },
            100.0,
        )
        .await
        .unwrap();
    assert_eq!(updated.entry.macros.calories, 130.0);
    assert_eq!(updated.progress, None, "untracked day");

    let day = fixture
        .plans
        .daily_plan(plan_id, DAY)
        .await
        .unwrap()
        .expect("day exists");
    assert_eq!(day.totals.calories, 130.0);

    let by_slot = fixture
        .plans
        .meals_by_slot(plan_id, DAY, MealSlot::Lunch)
        .await
        .unwrap();
    assert_eq!(by_slot.len(), 1);
    assert_eq!(by_slot[0].meal.name, "Rice");
    assert!(
        fixture
            .plans
            .meals_by_slot(plan_id, DAY, MealSlot::Dinner)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn removing_an_unplanned_meal_is_not_found() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Empty", 1).await;
    let meal = create_meal(
        &fixture,
        "Apple",
        MealSlot::Snack,
        Macros::new(52.0, 14.0, 0.2, 0.3),
    )
    .await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let err = fixture
        .plans
        .remove_meal_from_daily_plan(PlannedMealRef {
            daily_plan_id: daily_plan.id,
            meal_id: meal,
            slot: MealSlot::Snack,
        })
        .await
        .expect_err("nothing planned");

    assert_eq!(err.kind, OperationErrorKind::NotFound);
    assert_eq!(err.message, "Meal is not in this daily plan");
}

#[tokio::test]
async fn missing_records_use_entity_messages() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Plan", 1).await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let err = fixture
        .plans
        .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
            daily_plan_id: daily_plan.id,
            meal_id: 999,
            quantity: 50.0,
            slot: None,
        })
        .await
        .expect_err("meal does not exist");
    assert_eq!(err.message, "Meal with ID 999 not found");

    let err = fixture.plans.delete_plan(404).await.expect_err("no such plan");
    assert_eq!(err.message, "Plan with ID 404 not found");
}

#[tokio::test]
async fn deleting_a_meal_takes_it_out_of_day_totals() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Plan", 1).await;
    let eggs = create_meal(
        &fixture,
        "Eggs",
        MealSlot::Breakfast,
        Macros::new(155.0, 1.1, 11.0, 13.0),
    )
    .await;
    let toast = create_meal(
        &fixture,
        "Toast",
        MealSlot::Breakfast,
        Macros::new(265.0, 49.0, 3.2, 9.0),
    )
    .await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    for meal_id in [eggs, toast] {
        fixture
            .plans
            .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
                daily_plan_id: daily_plan.id,
                meal_id,
                quantity: 100.0,
                slot: None,
            })
            .await
            .unwrap();
    }

    let refreshed = fixture.meals.delete_meal(eggs).await.unwrap();
    assert!(refreshed.is_empty(), "no progress tracked");

    let day = fixture.plans.daily_plan(plan_id, DAY).await.unwrap().unwrap();
    assert_eq!(day.totals.calories, 265.0);
    assert!(fixture.meals.get_meal(eggs).await.unwrap().is_none());
}

#[tokio::test]
async fn only_one_plan_is_current() {
    let fixture = fixture().await;
    let first = create_plan(&fixture, "First", 1).await;
    let second = create_plan(&fixture, "Second", 1).await;

    fixture.plans.set_current_plan(first).await.unwrap();
    fixture.plans.set_current_plan(second).await.unwrap();

    let plans = fixture.plans.list_plans().await.unwrap();
    let current: Vec<i64> = plans
        .iter()
        .filter(|plan| plan.is_current)
        .map(|plan| plan.id)
        .collect();
    assert_eq!(current, vec![second]);
    assert_eq!(plans[0].id, second);
    assert_eq!(
        fixture.plans.current_plan().await.unwrap().map(|plan| plan.id),
        Some(second)
    );
}

#[tokio::test]
async fn consumption_updates_totals_and_completion() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Tracked", 1).await;
    let oats = create_meal(
        &fixture,
        "Oats",
        MealSlot::Breakfast,
        Macros::new(380.0, 60.0, 7.0, 13.0),
    )
    .await;
    let soup = create_meal(
        &fixture,
        "Soup",
        MealSlot::Dinner,
        Macros::new(80.0, 10.0, 3.0, 4.0),
    )
    .await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let mut entries = Vec::new();
    for (meal_id, quantity) in [(oats, 50.0), (soup, 300.0)] {
        entries.push(
            fixture
                .plans
                .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
                    daily_plan_id: daily_plan.id,
                    meal_id,
                    quantity,
                    slot: None,
                })
                .await
                .unwrap()
                .entry,
        );
    }

    let progress = fixture
        .progress
        .get_or_create_daily_progress(plan_id, DAY)
        .await
        .unwrap();
    let again = fixture
        .progress
        .get_or_create_daily_progress(plan_id, DAY)
        .await
        .unwrap();
    assert_eq!(progress.id, again.id);

    let after_oats = fixture
        .progress
        .mark_meal_as_consumed(MarkConsumedParams {
            daily_progress_id: progress.id,
            meal_id: oats,
            daily_plan_meal_id: entries[0].id,
            consumed: true,
            percentage: 50.0,
        })
        .await
        .unwrap();
    assert_eq!(after_oats.completion_percentage, 50.0);
    assert_eq!(after_oats.consumed.calories, 95.0);

    let after_soup = fixture
        .progress
        .mark_meal_as_consumed(MarkConsumedParams {
            daily_progress_id: progress.id,
            meal_id: soup,
            daily_plan_meal_id: entries[1].id,
            consumed: true,
            percentage: 100.0,
        })
        .await
        .unwrap();
    assert_eq!(after_soup.completion_percentage, 100.0);
    assert_eq!(after_soup.consumed.calories, 335.0);

    let undone = fixture
        .progress
        .mark_meal_as_consumed(MarkConsumedParams {
            daily_progress_id: progress.id,
            meal_id: oats,
            daily_plan_meal_id: entries[0].id,
            consumed: false,
            percentage: 100.0,
        })
        .await
        .unwrap();
    assert_eq!(undone.completion_percentage, 50.0);
    assert_eq!(undone.consumed.calories, 240.0);

    let meal_progress = fixture.progress.meal_progress(progress.id).await.unwrap();
    assert_eq!(meal_progress.len(), 2);
    assert_eq!(
        fixture
            .progress
            .list_progress_for_plan(plan_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

struct TrackedDay {
    plan_id: i64,
    daily_plan_id: i64,
    oats: i64,
    soup: i64,
    progress_id: i64,
}

/// Oats (380 kcal) and soup (240 kcal) planned, oats fully eaten.
async fn tracked_day(fixture: &Fixture) -> TrackedDay {
    let plan_id = create_plan(fixture, "Tracked", 1).await;
    let oats = create_meal(
        fixture,
        "Oats",
        MealSlot::Breakfast,
        Macros::new(380.0, 60.0, 7.0, 13.0),
    )
    .await;
    let soup = create_meal(
        fixture,
        "Soup",
        MealSlot::Dinner,
        Macros::new(80.0, 10.0, 3.0, 4.0),
    )
    .await;
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let mut entries = Vec::new();
    for (meal_id, quantity) in [(oats, 100.0), (soup, 300.0)] {
        let change = fixture
            .plans
            .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
                daily_plan_id: daily_plan.id,
                meal_id,
                quantity,
                slot: None,
            })
            .await
            .unwrap();
        entries.push(change.entry.id);
    }

    let progress = fixture
        .progress
        .get_or_create_daily_progress(plan_id, DAY)
        .await
        .unwrap();
    let after = fixture
        .progress
        .mark_meal_as_consumed(MarkConsumedParams {
            daily_progress_id: progress.id,
            meal_id: oats,
            daily_plan_meal_id: entries[0],
            consumed: true,
            percentage: 100.0,
        })
        .await
        .unwrap();
    assert_eq!(after.consumed.calories, 380.0);
    assert_eq!(after.completion_percentage, 50.0);

    TrackedDay {
        plan_id,
        daily_plan_id: daily_plan.id,
        oats,
        soup,
        progress_id: progress.id,
    }
}

#[tokio::test]
async fn removing_a_consumed_meal_refreshes_progress() {
    let fixture = fixture().await;
    let day = tracked_day(&fixture).await;

    let change = fixture
        .plans
        .remove_meal_from_daily_plan(PlannedMealRef {
            daily_plan_id: day.daily_plan_id,
            meal_id: day.oats,
            slot: MealSlot::Breakfast,
        })
        .await
        .unwrap();
    assert_eq!(
        change.progress,
        Some(ProgressRef {
            id: day.progress_id,
            plan_id: day.plan_id,
        })
    );

    let progress = fixture
        .progress
        .daily_progress(day.progress_id)
        .await
        .unwrap()
        .expect("progress row kept");
    assert_eq!(progress.consumed.calories, 0.0);
    assert_eq!(progress.completion_percentage, 0.0);
    assert!(
        fixture
            .progress
            .meal_progress(day.progress_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn planning_another_meal_lowers_completion() {
    let fixture = fixture().await;
    let day = tracked_day(&fixture).await;
    let apple = create_meal(
        &fixture,
        "Apple",
        MealSlot::Snack,
        Macros::new(52.0, 14.0, 0.2, 0.3),
    )
    .await;

    let change = fixture
        .plans
        .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
            daily_plan_id: day.daily_plan_id,
            meal_id: apple,
            quantity: 100.0,
            slot: None,
        })
        .await
        .unwrap();
    assert!(change.progress.is_some());

    let progress = fixture
        .progress
        .daily_progress(day.progress_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.completion_percentage, 33.33);
    assert_eq!(progress.consumed.calories, 380.0);
}

#[tokio::test]
async fn quantity_update_rescales_consumed_macros() {
    let fixture = fixture().await;
    let day = tracked_day(&fixture).await;

    fixture
        .plans
        .update_meal_quantity(
            PlannedMealRef {
                daily_plan_id: day.daily_plan_id,
                meal_id: day.oats,
                slot: MealSlot::Breakfast,
            },
            50.0,
        )
        .await
        .unwrap();

    let progress = fixture
        .progress
        .daily_progress(day.progress_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.consumed.calories, 190.0);
    assert_eq!(progress.completion_percentage, 50.0);
    let meal_progress = fixture.progress.meal_progress(day.progress_id).await.unwrap();
    assert_eq!(meal_progress[0].effective.calories, 190.0);
}

#[tokio::test]
async fn deleting_a_tracked_meal_refreshes_progress() {
    let fixture = fixture().await;
    let day = tracked_day(&fixture).await;

    let refreshed = fixture.meals.delete_meal(day.oats).await.unwrap();
    assert_eq!(
        refreshed,
        vec![ProgressRef {
            id: day.progress_id,
            plan_id: day.plan_id,
        }]
    );

    let progress = fixture
        .progress
        .daily_progress(day.progress_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.consumed.calories, 0.0);
    assert_eq!(progress.completion_percentage, 0.0);

    let nutrition = fixture
        .plans
        .daily_nutrition(day.plan_id, DAY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nutrition.totals.calories, 240.0);
    assert!(fixture.meals.get_meal(day.soup).await.unwrap().is_some());
}

#[tokio::test]
async fn consumption_percentage_is_validated() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Tracked", 1).await;
    let progress = fixture
        .progress
        .get_or_create_daily_progress(plan_id, DAY)
        .await
        .unwrap();

    let err = fixture
        .progress
        .mark_meal_as_consumed(MarkConsumedParams {
            daily_progress_id: progress.id,
            meal_id: 1,
            daily_plan_meal_id: 1,
            consumed: true,
            percentage: 150.0,
        })
        .await
        .expect_err("over 100 percent");
    assert_eq!(err.kind, OperationErrorKind::Validation);
}

#[tokio::test]
async fn meal_filters_narrow_the_catalogue() {
    let fixture = fixture().await;
    let apple = create_meal(
        &fixture,
        "Apple",
        MealSlot::Snack,
        Macros::new(52.0, 14.0, 0.2, 0.3),
    )
    .await;
    create_meal(&fixture, "Pasta", MealSlot::Dinner, Macros::new(160.0, 31.0, 0.9, 5.8)).await;
    fixture.meals.toggle_favorite(apple).await.unwrap();

    let favorites = fixture
        .meals
        .list_meals(&MealQueryFilter {
            favorites_only: true,
            ..MealQueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, apple);

    let search = fixture
        .meals
        .list_meals(&MealQueryFilter {
            search: Some("pas".to_string()),
            ..MealQueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(search.len(), 1);
    assert_eq!(search[0].name, "Pasta");

    let all = fixture
        .meals
        .list_meals(&MealQueryFilter::default())
        .await
        .unwrap();
    assert_eq!(all[0].id, apple, "favorites sort first");
}

async fn create_ingredient(fixture: &Fixture, name: &str, macros: Macros) -> i64 {
    fixture
        .ingredients
        .create_ingredient(CreateIngredientCommand {
            name: name.to_string(),
            unit: MealUnit::Gram,
            quantity: None,
            macros,
        })
        .await
        .expect("ingredient created")
        .id
}

#[tokio::test]
async fn composing_a_meal_recomputes_its_macros() {
    let fixture = fixture().await;
    let bowl = create_meal(&fixture, "Bowl", MealSlot::Lunch, Macros::ZERO).await;
    let rice = create_ingredient(&fixture, "Rice", Macros::new(130.0, 28.0, 0.3, 2.7)).await;
    let chicken =
        create_ingredient(&fixture, "Chicken", Macros::new(165.0, 0.0, 3.6, 31.0)).await;

    fixture
        .ingredients
        .add_ingredient_to_meal(AddIngredientToMealCommand {
            meal_id: bowl,
            ingredient_id: rice,
            quantity: 150.0,
        })
        .await
        .unwrap();
    let composed = fixture
        .ingredients
        .add_ingredient_to_meal(AddIngredientToMealCommand {
            meal_id: bowl,
            ingredient_id: chicken,
            quantity: 100.0,
        })
        .await
        .unwrap();

    assert_eq!(composed.ingredients.len(), 2);
    assert_eq!(composed.ingredients[0].name, "Rice");
    assert_eq!(composed.ingredients[0].macros.calories, 195.0);
    assert_eq!(composed.meal.quantity, 250.0);
    assert_eq!(composed.meal.macros.calories, 360.0);
    assert_eq!(composed.meal.macros.protein, 35.05);

    let chicken_portion = composed.ingredients[1].id;
    let trimmed = fixture
        .ingredients
        .remove_ingredient_from_meal(bowl, chicken_portion)
        .await
        .unwrap();
    assert_eq!(trimmed.meal.quantity, 150.0);
    assert_eq!(trimmed.meal.macros.calories, 195.0);

    let rice_portion = trimmed.ingredients[0].id;
    let emptied = fixture
        .ingredients
        .remove_ingredient_from_meal(bowl, rice_portion)
        .await
        .unwrap();
    assert!(emptied.ingredients.is_empty());
    assert_eq!(emptied.meal.macros, Macros::ZERO);
    assert_eq!(emptied.meal.quantity, 150.0);

    let err = fixture
        .ingredients
        .remove_ingredient_from_meal(bowl, rice_portion)
        .await
        .expect_err("already removed");
    assert_eq!(err.message, "Ingredient is not part of this meal");
}

#[tokio::test]
async fn composed_meals_scale_when_planned() {
    let fixture = fixture().await;
    let plan_id = create_plan(&fixture, "Plan", 1).await;
    let shake = create_meal(&fixture, "Shake", MealSlot::Snack, Macros::ZERO).await;
    let milk = create_ingredient(&fixture, "Milk", Macros::new(64.0, 4.8, 3.6, 3.4)).await;
    fixture
        .ingredients
        .add_ingredient_to_meal(AddIngredientToMealCommand {
            meal_id: shake,
            ingredient_id: milk,
            quantity: 250.0,
        })
        .await
        .unwrap();
    let daily_plan = fixture.plans.require_daily_plan(plan_id, DAY).await.unwrap();

    let change = fixture
        .plans
        .add_meal_to_daily_plan(AddMealToDailyPlanCommand {
            daily_plan_id: daily_plan.id,
            meal_id: shake,
            quantity: 125.0,
            slot: None,
        })
        .await
        .unwrap();

    // Half of the 250 g composition.
    assert_eq!(change.entry.macros.calories, 80.0);
}

#[tokio::test]
async fn ingredients_in_use_cannot_be_deleted() {
    let fixture = fixture().await;
    let meal = create_meal(&fixture, "Toast", MealSlot::Breakfast, Macros::ZERO).await;
    let bread = create_ingredient(&fixture, "Bread", Macros::new(265.0, 49.0, 3.2, 9.0)).await;
    let composed = fixture
        .ingredients
        .add_ingredient_to_meal(AddIngredientToMealCommand {
            meal_id: meal,
            ingredient_id: bread,
            quantity: 60.0,
        })
        .await
        .unwrap();

    let err = fixture
        .ingredients
        .delete_ingredient(bread)
        .await
        .expect_err("used by toast");
    assert_eq!(err.kind, OperationErrorKind::Conflict);
    assert_eq!(err.message, "Ingredient is used by 1 meal(s)");

    fixture
        .ingredients
        .remove_ingredient_from_meal(meal, composed.ingredients[0].id)
        .await
        .unwrap();
    fixture.ingredients.delete_ingredient(bread).await.unwrap();
    assert!(fixture.ingredients.get_ingredient(bread).await.unwrap().is_none());
}

#[tokio::test]
async fn ingredient_names_are_unique_and_searchable() {
    let fixture = fixture().await;
    create_ingredient(&fixture, "Oat flakes", Macros::new(370.0, 59.0, 7.0, 13.0)).await;
    create_ingredient(&fixture, "Almonds", Macros::new(579.0, 22.0, 50.0, 21.0)).await;

    let err = fixture
        .ingredients
        .create_ingredient(CreateIngredientCommand {
            name: "almonds".to_string(),
            unit: MealUnit::Gram,
            quantity: None,
            macros: Macros::ZERO,
        })
        .await
        .expect_err("names ignore case");
    assert_eq!(err.kind, OperationErrorKind::Conflict);
    assert_eq!(err.message, "Ingredient `almonds` already exists");

    let all = fixture.ingredients.list_ingredients(None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|ingredient| ingredient.name.as_str()).collect();
    assert_eq!(names, vec!["Almonds", "Oat flakes"]);

    let found = fixture.ingredients.list_ingredients(Some("oat")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Oat flakes");
}
