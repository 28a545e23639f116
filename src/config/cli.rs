use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use time::{Date, macros::format_description};

use crate::domain::nutrition::Macros;
use crate::domain::types::{MealSlot, MealUnit, PlanGoal};

/// Command-line arguments for the nutrio binary.
#[derive(Debug, Parser)]
#[command(name = "nutrio", version, about = "Nutrition planning and tracking")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "NUTRIO_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT", global = true)]
    pub database_max_connections: Option<u32>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// How mutations invalidate cached queries (await|deferred).
    #[arg(long = "invalidation-mode", value_name = "MODE", global = true)]
    pub invalidation_mode: Option<String>,

    /// Toggle cache invalidation entirely.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Meal catalogue operations.
    #[command(subcommand)]
    Meals(MealsCommand),
    /// Plan and daily plan operations.
    #[command(subcommand)]
    Plans(PlansCommand),
    /// Consumption tracking.
    #[command(subcommand)]
    Progress(ProgressCommand),
    /// Ingredient catalogue operations.
    #[command(subcommand)]
    Ingredients(IngredientsCommand),
}

#[derive(Debug, Args, Default, Clone, Copy)]
pub struct MacroArgs {
    #[arg(long, default_value_t = 0.0)]
    pub calories: f64,
    #[arg(long, default_value_t = 0.0)]
    pub carbs: f64,
    #[arg(long, default_value_t = 0.0)]
    pub fat: f64,
    #[arg(long, default_value_t = 0.0)]
    pub protein: f64,
}

impl From<MacroArgs> for Macros {
    fn from(args: MacroArgs) -> Self {
        Macros::new(args.calories, args.carbs, args.fat, args.protein)
    }
}

/// Addresses one day of a plan.
#[derive(Debug, Args, Clone, Copy)]
pub struct PlanDayArgs {
    #[arg(long = "plan-id", value_name = "ID")]
    pub plan_id: i64,

    /// Day in `YYYY-MM-DD` form.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub date: Date,
}

#[derive(Debug, Subcommand, Clone)]
pub enum MealsCommand {
    /// Add a meal to the catalogue.
    Create(CreateMealArgs),
    /// List catalogue meals.
    List(ListMealsArgs),
    /// Show one meal and how it renders.
    Show { id: i64 },
    /// Delete a meal and take it out of every daily plan.
    Delete { id: i64 },
    /// Flip the favorite flag of a meal.
    Favorite { id: i64 },
    /// Add an ingredient portion and recompute the meal from its ingredients.
    AddIngredient(AddIngredientArgs),
    /// Remove an ingredient portion from a meal.
    RemoveIngredient {
        #[arg(long = "meal-id", value_name = "ID")]
        meal_id: i64,
        #[arg(long = "meal-ingredient-id", value_name = "ID")]
        meal_ingredient_id: i64,
    },
    /// List the ingredients a meal is made of.
    Ingredients { id: i64 },
}

#[derive(Debug, Args, Clone)]
pub struct AddIngredientArgs {
    #[arg(long = "meal-id", value_name = "ID")]
    pub meal_id: i64,

    #[arg(long = "ingredient-id", value_name = "ID")]
    pub ingredient_id: i64,

    #[arg(long, value_name = "AMOUNT")]
    pub quantity: f64,
}

#[derive(Debug, Args, Clone)]
pub struct CreateMealArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, value_name = "SLOT")]
    pub slot: MealSlot,

    #[arg(long, value_name = "UNIT", default_value = "GRAM")]
    pub unit: MealUnit,

    /// Reference quantity the macros are given for.
    #[arg(long, value_name = "AMOUNT")]
    pub quantity: Option<f64>,

    #[command(flatten)]
    pub macros: MacroArgs,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ListMealsArgs {
    #[arg(long, value_name = "SLOT")]
    pub slot: Option<MealSlot>,

    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub favorites: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PlansCommand {
    /// Create a plan with one daily plan per day.
    Create(CreatePlanArgs),
    /// List plans, current first.
    List,
    /// Show a plan with its daily plans.
    Show { id: i64 },
    /// Delete a plan and everything planned under it.
    Delete { id: i64 },
    /// Make a plan the current one.
    SetCurrent { id: i64 },
    /// Replace the daily nutrition goals of a plan.
    Goals(UpdateGoalsArgs),
    /// Plan a meal on a day.
    AddMeal(AddMealArgs),
    /// Remove a planned meal from a day.
    RemoveMeal(PlannedMealArgs),
    /// Change the quantity of a planned meal.
    UpdateQuantity(UpdateQuantityArgs),
    /// Totals, macro split and goals for a day.
    Nutrition(PlanDayArgs),
    /// Meals planned in one slot of a day.
    Slot(SlotArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CreatePlanArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, value_name = "GOAL", default_value = "MAINTAIN")]
    pub goal: PlanGoal,

    #[arg(long = "start-date", value_name = "DATE", value_parser = parse_date)]
    pub start_date: Date,

    #[arg(long, value_name = "COUNT", default_value_t = 4)]
    pub weeks: u32,

    #[command(flatten)]
    pub goals: MacroArgs,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateGoalsArgs {
    #[arg(long = "plan-id", value_name = "ID")]
    pub plan_id: i64,

    #[command(flatten)]
    pub goals: MacroArgs,
}

#[derive(Debug, Args, Clone)]
pub struct AddMealArgs {
    #[command(flatten)]
    pub day: PlanDayArgs,

    #[arg(long = "meal-id", value_name = "ID")]
    pub meal_id: i64,

    #[arg(long, value_name = "AMOUNT")]
    pub quantity: f64,

    /// Defaults to the meal's own slot.
    #[arg(long, value_name = "SLOT")]
    pub slot: Option<MealSlot>,
}

#[derive(Debug, Args, Clone)]
pub struct PlannedMealArgs {
    #[command(flatten)]
    pub day: PlanDayArgs,

    #[arg(long = "meal-id", value_name = "ID")]
    pub meal_id: i64,

    #[arg(long, value_name = "SLOT")]
    pub slot: MealSlot,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateQuantityArgs {
    #[command(flatten)]
    pub target: PlannedMealArgs,

    #[arg(long, value_name = "AMOUNT")]
    pub quantity: f64,
}

#[derive(Debug, Args, Clone)]
pub struct SlotArgs {
    #[command(flatten)]
    pub day: PlanDayArgs,

    #[arg(long, value_name = "SLOT")]
    pub slot: MealSlot,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProgressCommand {
    /// Mark a planned meal as eaten, fully or partly.
    Mark(MarkConsumedArgs),
    /// Show the progress of a day, creating it when missing.
    Show(PlanDayArgs),
    /// Progress of every tracked day of a plan.
    List {
        #[arg(long = "plan-id", value_name = "ID")]
        plan_id: i64,
    },
}

#[derive(Debug, Args, Clone)]
pub struct MarkConsumedArgs {
    #[command(flatten)]
    pub day: PlanDayArgs,

    #[arg(long = "meal-id", value_name = "ID")]
    pub meal_id: i64,

    #[arg(long = "daily-plan-meal-id", value_name = "ID")]
    pub daily_plan_meal_id: i64,

    /// Portion eaten, 0 to 100. Defaults to the whole meal.
    #[arg(long, value_name = "PERCENT")]
    pub percentage: Option<f64>,

    /// Clear the consumption instead of recording it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub undo: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum IngredientsCommand {
    /// Add an ingredient to the catalogue.
    Create(CreateIngredientArgs),
    /// List catalogue ingredients.
    List {
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
    },
    /// Show one ingredient.
    Show { id: i64 },
    /// Delete an ingredient no meal uses.
    Delete { id: i64 },
}

#[derive(Debug, Args, Clone)]
pub struct CreateIngredientArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, value_name = "UNIT", default_value = "GRAM")]
    pub unit: MealUnit,

    /// Reference quantity the macros are given for.
    #[arg(long, value_name = "AMOUNT")]
    pub quantity: Option<f64>,

    #[command(flatten)]
    pub macros: MacroArgs,
}

pub fn parse_date(value: &str) -> Result<Date, String> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| format!("invalid date `{value}`: {err}"))
}
