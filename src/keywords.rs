//! # Keyword Table Module
//!
//! Maps the surface forms users type ("бег", "Run", "skip") to canonical
//! values. Each language ships a `locales/<lang>/keywords.json` file; the
//! table merges all of them, so every parser accepts every supported
//! language regardless of the user's interface language.
//!
//! Adding a language means adding a JSON file, not touching parser code.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::Path;
use tracing::{debug, info};

use crate::nutrition::MealType;
use crate::report_model::{Mood, TrainingType};

const BUILTIN_LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/keywords.json")),
    ("ru", include_str!("../locales/ru/keywords.json")),
];

lazy_static! {
    static ref BUILTIN_TABLE: KeywordTable = {
        let mut table = KeywordTable::default();
        for (lang, json) in BUILTIN_LOCALES {
            let locale = LocaleKeywords::from_json_str(json)
                .unwrap_or_else(|e| panic!("Built-in {lang} keyword table should be valid: {e}"));
            table.add_locale(locale);
        }
        table
    };
}

/// Keyword lists of one language, as stored on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocaleKeywords {
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default)]
    pub cancel: Vec<String>,
    #[serde(default)]
    pub hours: Vec<String>,
    #[serde(default)]
    pub kilograms: Vec<String>,
    #[serde(default)]
    pub kilocalories: Vec<String>,
    #[serde(default)]
    pub training: HashMap<TrainingType, Vec<String>>,
    #[serde(default)]
    pub mood: HashMap<Mood, Vec<String>>,
    #[serde(default)]
    pub meal_type: HashMap<MealType, Vec<String>>,
}

impl LocaleKeywords {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse keyword table")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keyword table {}", path.display()))?;
        Self::from_json_str(&content)
    }
}

/// Merged, normalized lookup table over all loaded languages
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    skip: HashSet<String>,
    cancel: HashSet<String>,
    /// Unit suffixes, longest first so "hours" is tried before "h"
    hours: Vec<String>,
    kilograms: Vec<String>,
    kilocalories: Vec<String>,
    training: HashMap<String, TrainingType>,
    mood: HashMap<String, Mood>,
    meal_type: HashMap<String, MealType>,
}

/// Lowercase, trim, and collapse inner whitespace
pub fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn insert_forms<T: Copy + Eq + Hash + std::fmt::Debug>(
    target: &mut HashMap<String, T>,
    source: HashMap<T, Vec<String>>,
) {
    for (value, forms) in source {
        for form in forms {
            if let Some(previous) = target.insert(normalize(&form), value) {
                if previous != value {
                    debug!(form = %form, ?previous, ?value, "Keyword remapped by later locale");
                }
            }
        }
    }
}

fn extend_suffixes(target: &mut Vec<String>, forms: Vec<String>) {
    for form in forms {
        let form = normalize(&form);
        if !form.is_empty() && !target.contains(&form) {
            target.push(form);
        }
    }
    target.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
}

impl KeywordTable {
    /// The table built from the bundled language files
    pub fn builtin() -> &'static KeywordTable {
        &BUILTIN_TABLE
    }

    /// Built-in table extended with an extra locale file
    pub fn builtin_with_file(path: &Path) -> Result<Self> {
        let mut table = Self::builtin().clone();
        table.add_locale(LocaleKeywords::from_file(path)?);
        info!(path = %path.display(), "Loaded extra keyword table");
        Ok(table)
    }

    /// Merge one language into the table; later locales win on conflicts
    pub fn add_locale(&mut self, locale: LocaleKeywords) {
        self.skip.extend(locale.skip.iter().map(|s| normalize(s)));
        self.cancel.extend(locale.cancel.iter().map(|s| normalize(s)));
        extend_suffixes(&mut self.hours, locale.hours);
        extend_suffixes(&mut self.kilograms, locale.kilograms);
        extend_suffixes(&mut self.kilocalories, locale.kilocalories);
        insert_forms(&mut self.training, locale.training);
        insert_forms(&mut self.mood, locale.mood);
        insert_forms(&mut self.meal_type, locale.meal_type);
    }

    pub fn is_skip(&self, input: &str) -> bool {
        self.skip.contains(&normalize(input))
    }

    pub fn is_cancel(&self, input: &str) -> bool {
        self.cancel.contains(&normalize(input))
    }

    pub fn training(&self, input: &str) -> Option<TrainingType> {
        self.training.get(&normalize(input)).copied()
    }

    pub fn mood(&self, input: &str) -> Option<Mood> {
        self.mood.get(&normalize(input)).copied()
    }

    pub fn meal_type(&self, input: &str) -> Option<MealType> {
        self.meal_type.get(&normalize(input)).copied()
    }

    /// Strip a trailing hours keyword ("7.5 h" -> "7.5"), if present
    pub fn strip_hours(&self, input: &str) -> Option<String> {
        strip_suffix(&self.hours, input)
    }

    pub fn strip_kilograms(&self, input: &str) -> Option<String> {
        strip_suffix(&self.kilograms, input)
    }

    pub fn strip_kilocalories(&self, input: &str) -> Option<String> {
        strip_suffix(&self.kilocalories, input)
    }
}

fn strip_suffix(suffixes: &[String], input: &str) -> Option<String> {
    let normalized = normalize(input);
    suffixes.iter().find_map(|suffix| {
        normalized
            .strip_suffix(suffix.as_str())
            .map(|rest| rest.trim_end().to_string())
            .filter(|rest| !rest.is_empty())
    })
}
