//! # Nutrition Module
//!
//! Meal entries and the aggregation that folds them into daily totals.
//!
//! A report never stores a hand-set total: every structural change to a meal
//! list goes through [`aggregate`], so the stored total is always the sum of
//! its meals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of meal an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Other,
}

impl MealType {
    pub const ALL: [MealType; 5] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
        MealType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
            MealType::Other => "other",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MealType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown meal type: {s}"))
    }
}

/// Where a meal entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSource {
    /// Added as a single meal with the meal command
    Manual,
    /// Imported from the nutrition diary service
    Diary,
    /// Calories not itemized as meals, answered in the report dialogue
    Dialogue,
}

/// A single meal with its macro values.
///
/// Every macro is optional; an unset value counts as zero when totals are
/// computed. Units: calories in kcal, sodium in mg, everything else in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub meal_type: MealType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub sugar: Option<f64>,
    #[serde(default)]
    pub sodium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MealSource>,
    /// Reference to an attached image (transport file id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// Reasons a meal is rejected before it reaches a report
#[derive(Debug, Clone, PartialEq)]
pub enum MealValidationError {
    Negative(&'static str),
    NotFinite(&'static str),
}

impl fmt::Display for MealValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealValidationError::Negative(field) => write!(f, "{field} must not be negative"),
            MealValidationError::NotFinite(field) => write!(f, "{field} must be a finite number"),
        }
    }
}

impl std::error::Error for MealValidationError {}

impl Meal {
    /// Create an empty meal of the given type
    pub fn new(meal_type: MealType) -> Self {
        Self {
            meal_type,
            name: None,
            calories: None,
            protein: None,
            carbs: None,
            fat: None,
            fiber: None,
            sugar: None,
            sodium: None,
            source: None,
            image_ref: None,
        }
    }

    /// The calorie answer of the report dialogue
    pub fn dialogue_calories(calories: f64) -> Self {
        Self {
            calories: Some(calories),
            source: Some(MealSource::Dialogue),
            ..Self::new(MealType::Other)
        }
    }

    pub fn with_source(mut self, source: MealSource) -> Self {
        self.source = Some(source);
        self
    }

    fn fields(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("fiber", self.fiber),
            ("sugar", self.sugar),
            ("sodium", self.sodium),
        ]
    }

    /// Check that every set macro is a finite, non-negative number
    pub fn validate(&self) -> Result<(), MealValidationError> {
        for (field, value) in self.fields() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(MealValidationError::NotFinite(field));
                }
                if v < 0.0 {
                    return Err(MealValidationError::Negative(field));
                }
            }
        }
        Ok(())
    }
}

/// Summed macro values of a meal list
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

impl NutritionTotals {
    fn add(mut self, meal: &Meal) -> Self {
        self.calories += meal.calories.unwrap_or(0.0);
        self.protein += meal.protein.unwrap_or(0.0);
        self.carbs += meal.carbs.unwrap_or(0.0);
        self.fat += meal.fat.unwrap_or(0.0);
        self.fiber += meal.fiber.unwrap_or(0.0);
        self.sugar += meal.sugar.unwrap_or(0.0);
        self.sodium += meal.sodium.unwrap_or(0.0);
        self
    }
}

/// Fold a meal list into its totals.
///
/// Total over any finite sequence; the empty list yields all zeros.
pub fn aggregate<'a, I>(meals: I) -> NutritionTotals
where
    I: IntoIterator<Item = &'a Meal>,
{
    meals
        .into_iter()
        .fold(NutritionTotals::default(), NutritionTotals::add)
}

/// A food entry as returned by the nutrition diary service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionDiaryEntry {
    pub name: String,
    pub serving_description: Option<String>,
    pub quantity: Option<f64>,
    pub meal_type: MealType,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
}

impl From<NutritionDiaryEntry> for Meal {
    fn from(entry: NutritionDiaryEntry) -> Self {
        Meal {
            meal_type: entry.meal_type,
            name: Some(entry.name),
            calories: entry.calories,
            protein: entry.protein,
            carbs: entry.carbs,
            fat: entry.fat,
            fiber: entry.fiber,
            sugar: entry.sugar,
            sodium: entry.sodium,
            source: Some(MealSource::Diary),
            image_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meal(calories: f64, protein: f64) -> Meal {
        Meal {
            calories: Some(calories),
            protein: Some(protein),
            ..Meal::new(MealType::Lunch)
        }
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        assert_eq!(aggregate(&[]), NutritionTotals::default());
    }

    #[test]
    fn test_aggregate_sums_every_field() {
        let meals = vec![
            meal(500.0, 20.0),
            Meal {
                sodium: Some(300.0),
                fiber: Some(4.5),
                ..meal(250.0, 10.0)
            },
        ];

        let totals = aggregate(&meals);

        assert_eq!(totals.calories, 750.0);
        assert_eq!(totals.protein, 30.0);
        assert_eq!(totals.sodium, 300.0);
        assert_eq!(totals.fiber, 4.5);
        assert_eq!(totals.fat, 0.0);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let meals = vec![meal(120.5, 3.0), meal(80.0, 1.5), Meal::dialogue_calories(900.0)];
        assert_eq!(aggregate(&meals), aggregate(&meals));
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        let negative = Meal {
            fat: Some(-1.0),
            ..Meal::new(MealType::Snack)
        };
        assert_eq!(
            negative.validate(),
            Err(MealValidationError::Negative("fat"))
        );

        let nan = Meal {
            calories: Some(f64::NAN),
            ..Meal::new(MealType::Snack)
        };
        assert_eq!(nan.validate(), Err(MealValidationError::NotFinite("calories")));

        assert!(meal(0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_diary_entry_becomes_diary_meal() {
        let entry = NutritionDiaryEntry {
            name: "Oatmeal".to_string(),
            serving_description: Some("1 cup".to_string()),
            quantity: Some(1.0),
            meal_type: MealType::Breakfast,
            calories: Some(166.0),
            protein: Some(5.9),
            carbs: Some(28.1),
            fat: Some(3.6),
            fiber: None,
            sugar: None,
            sodium: Some(9.0),
        };

        let meal = Meal::from(entry);
        assert_eq!(meal.source, Some(MealSource::Diary));
        assert_eq!(meal.name.as_deref(), Some("Oatmeal"));
        assert_eq!(aggregate([&meal]).calories, 166.0);
    }

    #[test]
    fn test_meal_type_round_trips_through_str() {
        for t in MealType::ALL {
            assert_eq!(t.as_str().parse::<MealType>(), Ok(t));
        }
        assert!("brunch".parse::<MealType>().is_err());
    }
}
