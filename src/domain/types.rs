//! Shared domain enumerations aligned with persisted text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Meal slot within a day. Stored and keyed by its upper-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealSlot {
    pub const ALL: [MealSlot; 4] = [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Dinner,
        MealSlot::Snack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "BREAKFAST",
            MealSlot::Lunch => "LUNCH",
            MealSlot::Dinner => "DINNER",
            MealSlot::Snack => "SNACK",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BREAKFAST" => Ok(MealSlot::Breakfast),
            "LUNCH" => Ok(MealSlot::Lunch),
            "DINNER" => Ok(MealSlot::Dinner),
            "SNACK" => Ok(MealSlot::Snack),
            other => Err(DomainError::validation(format!(
                "unknown meal slot `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanGoal {
    WeightLoss,
    Maintain,
    GainMuscle,
}

impl PlanGoal {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanGoal::WeightLoss => "WEIGHT_LOSS",
            PlanGoal::Maintain => "MAINTAIN",
            PlanGoal::GainMuscle => "GAIN_MUSCLE",
        }
    }
}

impl FromStr for PlanGoal {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "WEIGHT_LOSS" => Ok(PlanGoal::WeightLoss),
            "MAINTAIN" => Ok(PlanGoal::Maintain),
            "GAIN_MUSCLE" => Ok(PlanGoal::GainMuscle),
            other => Err(DomainError::validation(format!("unknown plan goal `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealUnit {
    Gram,
    Milliliter,
    Piece,
}

impl MealUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MealUnit::Gram => "GRAM",
            MealUnit::Milliliter => "MILLILITER",
            MealUnit::Piece => "PIECE",
        }
    }
}

impl FromStr for MealUnit {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GRAM" | "G" => Ok(MealUnit::Gram),
            "MILLILITER" | "ML" => Ok(MealUnit::Milliliter),
            "PIECE" => Ok(MealUnit::Piece),
            other => Err(DomainError::validation(format!("unknown meal unit `{other}`"))),
        }
    }
}
