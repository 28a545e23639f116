//! Macro-nutrient arithmetic shared by plans, meals and progress tracking.
//!
//! Meal macros are stored per reference quantity (usually 100 g). Planned and
//! consumed entries persist the macros already scaled to their own quantity.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

pub const DEFAULT_REFERENCE_QUANTITY: f64 = 100.0;

const KCAL_PER_GRAM_CARBS: f64 = 4.0;
const KCAL_PER_GRAM_PROTEIN: f64 = 4.0;
const KCAL_PER_GRAM_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub carbs: f64,
    pub fat: f64,
    pub protein: f64,
}

impl Macros {
    pub const ZERO: Macros = Macros {
        calories: 0.0,
        carbs: 0.0,
        fat: 0.0,
        protein: 0.0,
    };

    pub fn new(calories: f64, carbs: f64, fat: f64, protein: f64) -> Self {
        Self {
            calories,
            carbs,
            fat,
            protein,
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
            protein: self.protein * factor,
        }
    }

    /// Scale macros expressed for `reference_quantity` to `quantity`.
    ///
    /// A non-positive reference falls back to 100, matching how meals without
    /// an explicit reference are stored.
    pub fn for_quantity(self, quantity: f64, reference_quantity: f64) -> Self {
        let reference = if reference_quantity > 0.0 {
            reference_quantity
        } else {
            DEFAULT_REFERENCE_QUANTITY
        };
        self.scale(quantity / reference)
    }

    /// Portion of the macros actually eaten, `percentage` in `0..=100`.
    pub fn percentage(self, percentage: f64) -> Self {
        self.scale(percentage / 100.0)
    }

    /// Component-wise subtraction clamped at zero.
    pub fn saturating_sub(self, other: Macros) -> Self {
        Self {
            calories: (self.calories - other.calories).max(0.0),
            carbs: (self.carbs - other.carbs).max(0.0),
            fat: (self.fat - other.fat).max(0.0),
            protein: (self.protein - other.protein).max(0.0),
        }
    }

    pub fn rounded(self) -> Self {
        Self {
            calories: self.calories.round(),
            carbs: self.carbs.round(),
            fat: self.fat.round(),
            protein: self.protein.round(),
        }
    }

    pub fn round2(self) -> Self {
        fn r(value: f64) -> f64 {
            (value * 100.0).round() / 100.0
        }
        Self {
            calories: r(self.calories),
            carbs: r(self.carbs),
            fat: r(self.fat),
            protein: r(self.protein),
        }
    }

    pub fn split(&self) -> MacroSplit {
        MacroSplit::from_macros(self)
    }

    pub fn validate_goal(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("calories", self.calories),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("protein", self.protein),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::validation(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

impl Add for Macros {
    type Output = Macros;

    fn add(self, rhs: Macros) -> Macros {
        Macros {
            calories: self.calories + rhs.calories,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
            protein: self.protein + rhs.protein,
        }
    }
}

impl AddAssign for Macros {
    fn add_assign(&mut self, rhs: Macros) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Macros {
    fn sum<I: Iterator<Item = Macros>>(iter: I) -> Self {
        iter.fold(Macros::ZERO, |acc, item| acc + item)
    }
}

/// Share of energy coming from each macro, in whole percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroSplit {
    pub carbs_pct: f64,
    pub protein_pct: f64,
    pub fat_pct: f64,
}

impl MacroSplit {
    pub fn from_macros(macros: &Macros) -> Self {
        let carbs = macros.carbs * KCAL_PER_GRAM_CARBS;
        let protein = macros.protein * KCAL_PER_GRAM_PROTEIN;
        let fat = macros.fat * KCAL_PER_GRAM_FAT;
        let total = carbs + protein + fat;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            carbs_pct: (carbs / total * 100.0).round(),
            protein_pct: (protein / total * 100.0).round(),
            fat_pct: (fat / total * 100.0).round(),
        }
    }
}

pub fn validate_quantity(quantity: f64) -> Result<(), DomainError> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(DomainError::validation("quantity must be greater than zero"))
    }
}

pub fn validate_percentage(percentage: f64) -> Result<(), DomainError> {
    if percentage.is_finite() && (0.0..=100.0).contains(&percentage) {
        Ok(())
    } else {
        Err(DomainError::validation(
            "consumed percentage must be between 0 and 100",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_macros_by_quantity() {
        let per_100g = Macros::new(200.0, 30.0, 5.0, 10.0);
        let scaled = per_100g.for_quantity(150.0, 100.0);
        assert_eq!(scaled, Macros::new(300.0, 45.0, 7.5, 15.0));
    }

    #[test]
    fn zero_reference_quantity_falls_back_to_100() {
        let macros = Macros::new(100.0, 10.0, 10.0, 10.0);
        assert_eq!(macros.for_quantity(50.0, 0.0), macros.scale(0.5));
    }

    #[test]
    fn saturating_sub_never_goes_negative() {
        let total = Macros::new(100.0, 10.0, 5.0, 5.0);
        let removed = Macros::new(150.0, 5.0, 5.0, 8.0);
        assert_eq!(total.saturating_sub(removed), Macros::new(0.0, 5.0, 0.0, 0.0));
    }

    #[test]
    fn sum_and_rounding() {
        let total: Macros = [Macros::new(100.4, 1.5, 2.2, 3.7), Macros::new(0.4, 0.0, 0.0, 0.0)]
            .into_iter()
            .sum();
        assert_eq!(total.rounded(), Macros::new(101.0, 2.0, 2.0, 4.0));
    }

    #[test]
    fn split_is_zero_without_energy() {
        assert_eq!(Macros::ZERO.split(), MacroSplit::default());
        let split = Macros::new(0.0, 25.0, 0.0, 25.0).split();
        assert_eq!(split.carbs_pct, 50.0);
        assert_eq!(split.protein_pct, 50.0);
        assert_eq!(split.fat_pct, 0.0);
    }

    #[test]
    fn validation_rejects_bad_inputs() {
        assert!(validate_quantity(0.0).is_err());
        assert!(validate_quantity(f64::NAN).is_err());
        assert!(validate_quantity(12.5).is_ok());
        assert!(validate_percentage(101.0).is_err());
        assert!(validate_percentage(100.0).is_ok());
        assert!(Macros::new(-1.0, 0.0, 0.0, 0.0).validate_goal().is_err());
    }
}
