//! # Report Parser Module
//!
//! Stateless converters from free text to validated report values.
//!
//! Every parser returns `None` for input it cannot accept (non-numeric,
//! out of range, unknown keyword). None of them error on malformed input,
//! which lets the dialogue re-ask uniformly at every step.
//!
//! | Field    | Accepted                                   | Bounds      |
//! |----------|--------------------------------------------|-------------|
//! | weight   | decimal, `.` or `,`, optional kg keyword   | 20–300 kg   |
//! | steps    | integer, optional space/`'` grouping       | 0–100000    |
//! | sleep    | `H:MM`, decimal hours, decimal + hours word| 0–24 h      |
//! | calories | decimal, optional kcal keyword             | 0–10000     |
//! | training | keyword table                              | enum        |
//! | mood     | keyword table                              | enum        |

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::keywords::KeywordTable;
use crate::nutrition::{Meal, MealSource};
use crate::report_model::{Mood, TrainingType};

pub const MIN_WEIGHT_KG: f64 = 20.0;
pub const MAX_WEIGHT_KG: f64 = 300.0;
pub const MAX_STEPS: u32 = 100_000;
pub const MAX_SLEEP_HOURS: f64 = 24.0;
pub const MAX_CALORIES: f64 = 10_000.0;
pub const MAX_COMMENT_LENGTH: usize = 1000;

lazy_static! {
    static ref DECIMAL_REGEX: Regex =
        Regex::new(r"^\d+(?:[.,]\d+)?$").expect("Decimal pattern should be valid");
    static ref CLOCK_REGEX: Regex =
        Regex::new(r"^(\d{1,2}):([0-5]\d)$").expect("Clock pattern should be valid");
    static ref STEPS_REGEX: Regex =
        Regex::new(r"^\d{1,3}(?:[ '’]\d{3})+$|^\d+$").expect("Steps pattern should be valid");
}

/// Parse a non-negative decimal with either separator ("7,5" or "7.5")
pub fn parse_decimal(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if !DECIMAL_REGEX.is_match(trimmed) {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn in_range(value: f64, min: f64, max: f64) -> Option<f64> {
    (min..=max).contains(&value).then_some(value)
}

/// Body weight in kilograms
pub fn parse_weight(input: &str, keywords: &KeywordTable) -> Option<f64> {
    let number = keywords
        .strip_kilograms(input)
        .unwrap_or_else(|| input.to_string());
    let value = parse_decimal(&number)?;
    trace!(value, "Parsed weight candidate");
    in_range(value, MIN_WEIGHT_KG, MAX_WEIGHT_KG)
}

/// Daily step count
pub fn parse_steps(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if !STEPS_REGEX.is_match(trimmed) {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<u32>().ok().filter(|steps| *steps <= MAX_STEPS)
}

/// Sleep duration in hours
pub fn parse_sleep(input: &str, keywords: &KeywordTable) -> Option<f64> {
    let trimmed = input.trim();

    if let Some(caps) = CLOCK_REGEX.captures(trimmed) {
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        return in_range(hours + minutes / 60.0, 0.0, MAX_SLEEP_HOURS);
    }

    let number = keywords
        .strip_hours(trimmed)
        .unwrap_or_else(|| trimmed.to_string());
    in_range(parse_decimal(&number)?, 0.0, MAX_SLEEP_HOURS)
}

/// Calories eaten over the day, in kcal
pub fn parse_calories(input: &str, keywords: &KeywordTable) -> Option<f64> {
    let number = keywords
        .strip_kilocalories(input)
        .unwrap_or_else(|| input.to_string());
    in_range(parse_decimal(&number)?, 0.0, MAX_CALORIES)
}

pub fn parse_training(input: &str, keywords: &KeywordTable) -> Option<TrainingType> {
    keywords.training(input)
}

pub fn parse_mood(input: &str, keywords: &KeywordTable) -> Option<Mood> {
    keywords.mood(input)
}

/// Free-text comment; empty or oversized text is rejected
pub fn parse_comment(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return None;
    }
    Some(trimmed.to_string())
}

/// Parse the arguments of a meal command: `<type> <kcal> [protein] [carbs] [fat]`
pub fn parse_meal_command(args: &str, keywords: &KeywordTable) -> Option<Meal> {
    let mut parts = args.split_whitespace();
    let meal_type = keywords.meal_type(parts.next()?)?;
    let calories = parse_calories(parts.next()?, keywords)?;

    let macros: Vec<f64> = parts.map(parse_decimal).collect::<Option<Vec<_>>>()?;
    if macros.len() > 3 {
        return None;
    }

    let mut meal = Meal::new(meal_type).with_source(MealSource::Manual);
    meal.calories = Some(calories);
    meal.protein = macros.first().copied();
    meal.carbs = macros.get(1).copied();
    meal.fat = macros.get(2).copied();
    meal.validate().ok()?;
    Some(meal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::MealType;

    fn kw() -> &'static KeywordTable {
        KeywordTable::builtin()
    }

    #[test]
    fn test_parse_weight_valid() {
        assert_eq!(parse_weight("75.5", kw()), Some(75.5));
        assert_eq!(parse_weight("75,5", kw()), Some(75.5));
        assert_eq!(parse_weight(" 80 ", kw()), Some(80.0));
        assert_eq!(parse_weight("82.3 kg", kw()), Some(82.3));
        assert_eq!(parse_weight("82кг", kw()), Some(82.0));
        assert_eq!(parse_weight("20", kw()), Some(20.0));
        assert_eq!(parse_weight("300", kw()), Some(300.0));
    }

    #[test]
    fn test_parse_weight_invalid() {
        assert_eq!(parse_weight("abc", kw()), None);
        assert_eq!(parse_weight("19.9", kw()), None);
        assert_eq!(parse_weight("300.1", kw()), None);
        assert_eq!(parse_weight("-80", kw()), None);
        assert_eq!(parse_weight("", kw()), None);
        assert_eq!(parse_weight("kg", kw()), None);
        assert_eq!(parse_weight("1e2", kw()), None);
    }

    #[test]
    fn test_parse_weight_matches_float_across_range() {
        for tenths in (200..=3000).step_by(37) {
            let value = tenths as f64 / 10.0;
            let dot = format!("{value}");
            let comma = dot.replace('.', ",");
            assert_eq!(parse_weight(&dot, kw()), Some(dot.parse::<f64>().unwrap()));
            assert_eq!(parse_weight(&comma, kw()), Some(value));
        }
    }

    #[test]
    fn test_parse_steps() {
        assert_eq!(parse_steps("8000"), Some(8000));
        assert_eq!(parse_steps("0"), Some(0));
        assert_eq!(parse_steps("100000"), Some(100_000));
        assert_eq!(parse_steps("12 345"), Some(12_345));
        assert_eq!(parse_steps("100001"), None);
        assert_eq!(parse_steps("-5"), None);
        assert_eq!(parse_steps("8000.5"), None);
        assert_eq!(parse_steps("lots"), None);
    }

    #[test]
    fn test_parse_sleep_forms() {
        assert_eq!(parse_sleep("7:30", kw()), Some(7.5));
        assert_eq!(parse_sleep("0:45", kw()), Some(0.75));
        assert_eq!(parse_sleep("7.5", kw()), Some(7.5));
        assert_eq!(parse_sleep("6,5", kw()), Some(6.5));
        assert_eq!(parse_sleep("8 hours", kw()), Some(8.0));
        assert_eq!(parse_sleep("7.5h", kw()), Some(7.5));
        assert_eq!(parse_sleep("8 часов", kw()), Some(8.0));
        assert_eq!(parse_sleep("24:00", kw()), Some(24.0));
    }

    #[test]
    fn test_parse_sleep_rejects() {
        assert_eq!(parse_sleep("25", kw()), None);
        assert_eq!(parse_sleep("24:30", kw()), None);
        assert_eq!(parse_sleep("7:75", kw()), None);
        assert_eq!(parse_sleep("a lot", kw()), None);
        assert_eq!(parse_sleep("hours", kw()), None);
    }

    #[test]
    fn test_parse_calories() {
        assert_eq!(parse_calories("2000", kw()), Some(2000.0));
        assert_eq!(parse_calories("1850 kcal", kw()), Some(1850.0));
        assert_eq!(parse_calories("1500 ккал", kw()), Some(1500.0));
        assert_eq!(parse_calories("10001", kw()), None);
        assert_eq!(parse_calories("many", kw()), None);
    }

    #[test]
    fn test_parse_training_and_mood() {
        assert_eq!(parse_training("Gym", kw()), Some(TrainingType::Gym));
        assert_eq!(parse_training("плавание", kw()), Some(TrainingType::Swimming));
        assert_eq!(parse_training("chess", kw()), None);
        assert_eq!(parse_mood("good", kw()), Some(Mood::Good));
        assert_eq!(parse_mood("Ужасно", kw()), Some(Mood::Terrible));
        assert_eq!(parse_mood("good-ish", kw()), None);
    }

    #[test]
    fn test_parse_comment() {
        assert_eq!(parse_comment("  done "), Some("done".to_string()));
        assert_eq!(parse_comment("   "), None);
        assert_eq!(parse_comment(&"x".repeat(MAX_COMMENT_LENGTH + 1)), None);
    }

    #[test]
    fn test_parse_meal_command() {
        let meal = parse_meal_command("lunch 650 30 70 20", kw()).unwrap();
        assert_eq!(meal.meal_type, MealType::Lunch);
        assert_eq!(meal.calories, Some(650.0));
        assert_eq!(meal.protein, Some(30.0));
        assert_eq!(meal.carbs, Some(70.0));
        assert_eq!(meal.fat, Some(20.0));
        assert_eq!(meal.source, Some(MealSource::Manual));

        let meal = parse_meal_command("ужин 400", kw()).unwrap();
        assert_eq!(meal.meal_type, MealType::Dinner);
        assert_eq!(meal.protein, None);

        assert!(parse_meal_command("", kw()).is_none());
        assert!(parse_meal_command("brunch 400", kw()).is_none());
        assert!(parse_meal_command("lunch", kw()).is_none());
        assert!(parse_meal_command("lunch 400 x", kw()).is_none());
        assert!(parse_meal_command("lunch 400 1 2 3 4", kw()).is_none());
    }
}
