//! # Daily Report Data Model
//!
//! The finalized daily report, its field types, and the scratch builder that
//! collects fields across dialogue steps.
//!
//! ## Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use wellness::report_model::ReportDraft;
//!
//! let draft = ReportDraft {
//!     weight_kg: Some(80.0),
//!     calories: Some(2000.0),
//!     ..Default::default()
//! };
//! let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! let report = draft.into_report("42", date);
//! assert_eq!(report.total_nutrition().calories, 2000.0);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::nutrition::{aggregate, Meal, MealSource, NutritionTotals};

/// Type of training done during the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingType {
    Running,
    Cycling,
    Gym,
    Swimming,
    Walking,
    Other,
}

impl TrainingType {
    pub const ALL: [TrainingType; 6] = [
        TrainingType::Running,
        TrainingType::Cycling,
        TrainingType::Gym,
        TrainingType::Swimming,
        TrainingType::Walking,
        TrainingType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingType::Running => "running",
            TrainingType::Cycling => "cycling",
            TrainingType::Gym => "gym",
            TrainingType::Swimming => "swimming",
            TrainingType::Walking => "walking",
            TrainingType::Other => "other",
        }
    }
}

/// Self-reported mood of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Excellent,
    Good,
    Neutral,
    Bad,
    Terrible,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Excellent,
        Mood::Good,
        Mood::Neutral,
        Mood::Bad,
        Mood::Terrible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Excellent => "excellent",
            Mood::Good => "good",
            Mood::Neutral => "neutral",
            Mood::Bad => "bad",
            Mood::Terrible => "terrible",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!(concat!("unknown ", $what, ": {}"), s))
            }
        }
    };
}

impl_str_enum!(TrainingType, "training type");
impl_str_enum!(Mood, "mood");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
}

/// How a weight value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightSource {
    Manual,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub value: f64,
    pub unit: WeightUnit,
    pub source: WeightSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepEntry {
    pub hours: f64,
    #[serde(default)]
    pub quality: Option<SleepQuality>,
}

/// AI-generated feedback attached to a saved report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiFeedback {
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub health_score: Option<f64>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// One finalized submission per user per calendar date.
///
/// The meal list and its totals are private: the only ways to change meals
/// are the methods below, each of which recomputes the totals.
///
/// `revision` counts the submissions merged into the report. Feedback is only
/// attached for the revision it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub user_id: String,
    pub date: NaiveDate,
    pub weight: Option<WeightEntry>,
    pub sleep: Option<SleepEntry>,
    pub steps: Option<u32>,
    meals: Vec<Meal>,
    total_nutrition: NutritionTotals,
    pub training: Option<TrainingType>,
    pub mood: Option<Mood>,
    pub comments: Option<String>,
    pub ai_feedback: Option<AiFeedback>,
    #[serde(skip)]
    revision: u32,
}

impl DailyReport {
    pub fn new(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            weight: None,
            sleep: None,
            steps: None,
            meals: Vec::new(),
            total_nutrition: NutritionTotals::default(),
            training: None,
            mood: None,
            comments: None,
            ai_feedback: None,
            revision: 0,
        }
    }

    pub fn meals(&self) -> &[Meal] {
        &self.meals
    }

    pub fn total_nutrition(&self) -> NutritionTotals {
        self.total_nutrition
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    fn recompute_totals(&mut self) {
        self.total_nutrition = aggregate(&self.meals);
    }

    pub fn add_meal(&mut self, meal: Meal) {
        self.meals.push(meal);
        self.recompute_totals();
    }

    /// Remove the meal at `index`, returning it if it existed
    pub fn remove_meal(&mut self, index: usize) -> Option<Meal> {
        if index >= self.meals.len() {
            return None;
        }
        let removed = self.meals.remove(index);
        self.recompute_totals();
        Some(removed)
    }

    pub fn replace_meals(&mut self, meals: Vec<Meal>) {
        self.meals = meals;
        self.recompute_totals();
    }

    /// Replace the meals tagged with `source`, keeping every other meal
    pub fn replace_meals_from(&mut self, source: MealSource, meals: Vec<Meal>) {
        self.meals.retain(|m| m.source != Some(source));
        self.meals.extend(meals);
        self.recompute_totals();
    }

    /// Merge a newer submission for the same (user, date) into this one.
    ///
    /// Fields the newer report carries win; fields it lacks are kept. Meals of
    /// each source present in the newer report replace the stored meals of
    /// that source. Feedback is dropped because it described the old content.
    pub fn merge(&mut self, newer: DailyReport) {
        if newer.weight.is_some() {
            self.weight = newer.weight;
        }
        if newer.sleep.is_some() {
            self.sleep = newer.sleep;
        }
        if newer.steps.is_some() {
            self.steps = newer.steps;
        }
        if newer.training.is_some() {
            self.training = newer.training;
        }
        if newer.mood.is_some() {
            self.mood = newer.mood;
        }
        if newer.comments.is_some() {
            self.comments = newer.comments;
        }

        if !newer.meals.is_empty() {
            let sources: HashSet<Option<MealSource>> =
                newer.meals.iter().map(|m| m.source).collect();
            self.meals.retain(|m| !sources.contains(&m.source));
            self.meals.extend(newer.meals);
        }
        self.recompute_totals();
        self.ai_feedback = None;
        self.revision = self.revision.saturating_add(1);
    }

    /// Rebuild a report from stored parts, recomputing totals from the meals
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        user_id: String,
        date: NaiveDate,
        weight: Option<WeightEntry>,
        sleep: Option<SleepEntry>,
        steps: Option<u32>,
        meals: Vec<Meal>,
        training: Option<TrainingType>,
        mood: Option<Mood>,
        comments: Option<String>,
        ai_feedback: Option<AiFeedback>,
        revision: u32,
    ) -> Self {
        let total_nutrition = aggregate(&meals);
        Self {
            user_id,
            date,
            weight,
            sleep,
            steps,
            meals,
            total_nutrition,
            training,
            mood,
            comments,
            ai_feedback,
            revision,
        }
    }
}

/// Fields collected so far in an unfinished report dialogue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl ReportDraft {
    pub fn is_empty(&self) -> bool {
        *self == ReportDraft::default()
    }

    /// Assemble the report for `date` from the collected fields
    pub fn into_report(self, user_id: &str, date: NaiveDate) -> DailyReport {
        let mut report = DailyReport::new(user_id, date);
        report.weight = self.weight_kg.map(|value| WeightEntry {
            value,
            unit: WeightUnit::Kg,
            source: WeightSource::Manual,
        });
        report.sleep = self.sleep_hours.map(|hours| SleepEntry {
            hours,
            quality: None,
        });
        report.steps = self.steps;
        report.training = self.training;
        report.mood = self.mood;
        report.comments = self.comments;
        if let Some(calories) = self.calories {
            report.add_meal(Meal::dialogue_calories(calories));
        }
        report
    }
}
