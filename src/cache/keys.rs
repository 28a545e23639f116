//! Query key definitions.
//!
//! Every cached query is addressed by a [`QueryKey`]: a data-type tag followed
//! by its scoping parameters in a fixed order. Invalidation matches keys by
//! prefix, so `["plan", 1]` covers `["plan", 1, ...]` but never `["plan", 10]`.

use std::fmt;

use serde::{Serialize, Serializer};
use time::Date;

use crate::domain::types::MealSlot;

/// Logical category of persisted data, used to group cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Plan,
    PlansList,
    NutritionGoals,
    DailyNutrition,
    MealSlots,
    DailyPlan,
    Meal,
    MealsList,
    DailyProgress,
    ProgressList,
    Ingredient,
    IngredientsList,
}

impl DataType {
    pub const ALL: [DataType; 12] = [
        DataType::Plan,
        DataType::PlansList,
        DataType::NutritionGoals,
        DataType::DailyNutrition,
        DataType::MealSlots,
        DataType::DailyPlan,
        DataType::Meal,
        DataType::MealsList,
        DataType::DailyProgress,
        DataType::ProgressList,
        DataType::Ingredient,
        DataType::IngredientsList,
    ];

    /// Stable tag used as the first key segment.
    pub fn tag(self) -> &'static str {
        match self {
            DataType::Plan => "plan",
            DataType::PlansList => "plans-list",
            DataType::NutritionGoals => "nutritionGoals",
            DataType::DailyNutrition => "dailyNutrition",
            DataType::MealSlots => "mealsBySlot",
            DataType::DailyPlan => "daily-plan",
            DataType::Meal => "meal",
            DataType::MealsList => "meals-list",
            DataType::DailyProgress => "dailyProgress",
            DataType::ProgressList => "progress-list",
            DataType::Ingredient => "ingredient",
            DataType::IngredientsList => "ingredients-list",
        }
    }

    /// Whether keys of this type carry no entity id.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            DataType::PlansList | DataType::MealsList | DataType::IngredientsList
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    Int(i64),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<Date> for KeyPart {
    fn from(value: Date) -> Self {
        KeyPart::Str(format_date(value))
    }
}

impl From<MealSlot> for KeyPart {
    fn from(value: MealSlot) -> Self {
        KeyPart::Str(value.as_str().to_string())
    }
}

impl Serialize for KeyPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeyPart::Str(value) => serializer.serialize_str(value),
            KeyPart::Int(value) => serializer.serialize_i64(*value),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(value) => write!(f, "{value:?}"),
            KeyPart::Int(value) => write!(f, "{value}"),
        }
    }
}

/// Hierarchical cache key. The first segment is always a [`DataType`] tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    /// Single-segment key covering every entry of a data type.
    pub fn tag_of(data_type: DataType) -> Self {
        Self(vec![KeyPart::from(data_type.tag())])
    }

    fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Data type this key belongs to, recovered from the tag segment.
    pub fn data_type(&self) -> Option<DataType> {
        match self.0.first()? {
            KeyPart::Str(tag) => DataType::ALL.into_iter().find(|ty| ty.tag() == tag),
            KeyPart::Int(_) => None,
        }
    }

    /// Segment-wise prefix test used by invalidation.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.0.len() >= self.0.len() && other.0.iter().zip(&self.0).all(|(a, b)| a == b)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// `YYYY-MM-DD`, the only date form that appears in keys.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn plan(plan_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::Plan).with(plan_id)
}

pub fn plans_list() -> QueryKey {
    QueryKey::tag_of(DataType::PlansList)
}

pub fn nutrition_goals(plan_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::NutritionGoals).with(plan_id)
}

pub fn daily_nutrition(plan_id: i64, date: Date) -> QueryKey {
    QueryKey::tag_of(DataType::DailyNutrition)
        .with(plan_id)
        .with(date)
}

pub fn meals_by_slot(plan_id: i64, date: Date, slot: MealSlot) -> QueryKey {
    QueryKey::tag_of(DataType::MealSlots)
        .with(plan_id)
        .with(date)
        .with(slot)
}

pub fn daily_plan(daily_plan_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::DailyPlan).with(daily_plan_id)
}

pub fn meal(meal_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::Meal).with(meal_id)
}

/// Composition of a meal; sits under the meal's key so meal invalidation covers it.
pub fn meal_ingredients(meal_id: i64) -> QueryKey {
    meal(meal_id).with("ingredients")
}

pub fn meals_list() -> QueryKey {
    QueryKey::tag_of(DataType::MealsList)
}

pub fn daily_progress(daily_progress_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::DailyProgress).with(daily_progress_id)
}

pub fn progress_list(plan_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::ProgressList).with(plan_id)
}

pub fn ingredient(ingredient_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::Ingredient).with(ingredient_id)
}

pub fn ingredients_list() -> QueryKey {
    QueryKey::tag_of(DataType::IngredientsList)
}

/// Partial keys used when a scope lacks the narrower parameters.
pub(crate) fn daily_nutrition_for_plan(plan_id: i64) -> QueryKey {
    QueryKey::tag_of(DataType::DailyNutrition).with(plan_id)
}

pub(crate) fn meals_by_slot_for_day(plan_id: i64, date: Option<Date>) -> QueryKey {
    let key = QueryKey::tag_of(DataType::MealSlots).with(plan_id);
    match date {
        Some(date) => key.with(date),
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::macros::date;

    use super::*;

    #[test]
    fn builders_are_stable() {
        let day = date!(2024 - 01 - 01);
        assert_eq!(plan(1), plan(1));
        assert_eq!(
            meals_by_slot(1, day, MealSlot::Breakfast),
            meals_by_slot(1, day, MealSlot::Breakfast)
        );
        assert_eq!(
            meals_by_slot(1, day, MealSlot::Breakfast).to_string(),
            r#"["mealsBySlot",1,"2024-01-01","BREAKFAST"]"#
        );
    }

    #[test]
    fn distinct_queries_never_collide() {
        let day = date!(2024 - 01 - 01);
        let next = date!(2024 - 01 - 02);
        let keys = vec![
            plan(1),
            plan(2),
            plans_list(),
            nutrition_goals(1),
            daily_nutrition(1, day),
            daily_nutrition(1, next),
            daily_nutrition(2, day),
            meals_by_slot(1, day, MealSlot::Breakfast),
            meals_by_slot(1, day, MealSlot::Lunch),
            meals_by_slot(1, next, MealSlot::Breakfast),
            daily_plan(1),
            meal(1),
            meals_list(),
            daily_progress(1),
            progress_list(1),
            ingredient(1),
            ingredients_list(),
            meal_ingredients(1),
        ];
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn every_tag_is_unique_and_round_trips() {
        let tags: HashSet<_> = DataType::ALL.iter().map(|ty| ty.tag()).collect();
        assert_eq!(tags.len(), DataType::ALL.len());
        for ty in DataType::ALL {
            assert_eq!(QueryKey::tag_of(ty).data_type(), Some(ty));
        }
    }

    #[test]
    fn meal_composition_sits_under_its_meal() {
        assert!(meal(4).is_prefix_of(&meal_ingredients(4)));
        assert!(!meal(40).is_prefix_of(&meal_ingredients(4)));
        assert_eq!(meal_ingredients(4).data_type(), Some(DataType::Meal));
        assert_eq!(meal_ingredients(4).to_string(), r#"["meal",4,"ingredients"]"#);
    }

    #[test]
    fn prefix_matching_is_segment_wise() {
        let day = date!(2024 - 03 - 09);
        assert!(plan(1).is_prefix_of(&plan(1)));
        assert!(QueryKey::tag_of(DataType::Plan).is_prefix_of(&plan(7)));
        assert!(!plan(1).is_prefix_of(&plan(10)));
        assert!(daily_nutrition_for_plan(1).is_prefix_of(&daily_nutrition(1, day)));
        assert!(!daily_nutrition(1, day).is_prefix_of(&daily_nutrition_for_plan(1)));
        assert!(
            meals_by_slot_for_day(1, Some(day))
                .is_prefix_of(&meals_by_slot(1, day, MealSlot::Snack))
        );
    }

    #[test]
    fn serializes_as_json_array() {
        let key = daily_nutrition(3, date!(2024 - 12 - 31));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["dailyNutrition",3,"2024-12-31"]"#);
        assert_eq!(json, key.to_string());
    }
}
