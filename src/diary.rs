//! Nutrition diary gateway.
//!
//! Reads one day of food entries from the FatSecret platform API and
//! normalizes them into [`NutritionDiaryEntry`] values. Request signing sits
//! behind [`RequestSigner`]; the bundled signer uses a bearer token.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::DiaryConfig;
use crate::errors::{status_error, GatewayError};
use crate::nutrition::{aggregate, Meal, MealType, NutritionDiaryEntry, NutritionTotals};

/// `num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Food entries of one diary day and their totals
#[derive(Debug, Clone, PartialEq)]
pub struct DiaryDay {
    pub entries: Vec<NutritionDiaryEntry>,
    pub totals: NutritionTotals,
}

impl DiaryDay {
    pub fn from_entries(entries: Vec<NutritionDiaryEntry>) -> Self {
        let meals: Vec<Meal> = entries.iter().cloned().map(Meal::from).collect();
        Self {
            totals: aggregate(&meals),
            entries,
        }
    }

    /// Entries as diary-sourced meals
    pub fn into_meals(self) -> Vec<Meal> {
        self.entries.into_iter().map(Meal::from).collect()
    }
}

#[async_trait]
pub trait DiaryGateway: Send + Sync {
    /// Fetch the diary of the account identified by `user_key` for `date`
    async fn fetch_diary_nutrition(
        &self,
        user_key: &str,
        date: NaiveDate,
    ) -> Result<DiaryDay, GatewayError>;
}

/// Adds credentials for `user_key` to an outgoing request
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: reqwest::RequestBuilder, user_key: &str) -> reqwest::RequestBuilder;
}

/// Application bearer token plus the user's account token as a query parameter
#[derive(Clone, Debug)]
pub struct BearerTokenSigner {
    access_token: String,
}

impl BearerTokenSigner {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl RequestSigner for BearerTokenSigner {
    fn sign(&self, request: reqwest::RequestBuilder, user_key: &str) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .query(&[("oauth_token", user_key)])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Number::Float(v) => Some(*v),
            Number::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|v| v.is_finite())
    }
}

fn number(field: &Option<Number>) -> Option<f64> {
    field.as_ref().and_then(Number::value)
}

#[derive(Deserialize)]
struct FoodEntry {
    #[serde(default)]
    food_entry_name: String,
    #[serde(default)]
    food_entry_description: Option<String>,
    #[serde(default)]
    number_of_units: Option<Number>,
    #[serde(default)]
    meal: Option<String>,
    #[serde(default)]
    calories: Option<Number>,
    #[serde(default)]
    protein: Option<Number>,
    #[serde(default)]
    carbohydrate: Option<Number>,
    #[serde(default)]
    fat: Option<Number>,
    #[serde(default)]
    fiber: Option<Number>,
    #[serde(default)]
    sugar: Option<Number>,
    #[serde(default)]
    sodium: Option<Number>,
}

/// The API returns a bare object when there is exactly one entry
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<FoodEntry>),
    One(Box<FoodEntry>),
}

#[derive(Deserialize)]
struct FoodEntries {
    #[serde(default)]
    food_entry: Option<OneOrMany>,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct DiaryResponse {
    #[serde(default)]
    food_entries: Option<FoodEntries>,
    #[serde(default)]
    error: Option<RemoteError>,
}

fn meal_type(label: Option<&str>) -> MealType {
    match label.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("breakfast") => MealType::Breakfast,
        Some("lunch") => MealType::Lunch,
        Some("dinner") => MealType::Dinner,
        Some("snack") | Some("snacks") => MealType::Snack,
        _ => MealType::Other,
    }
}

impl From<FoodEntry> for NutritionDiaryEntry {
    fn from(entry: FoodEntry) -> Self {
        // sodium is reported in mg, like ours
        NutritionDiaryEntry {
            serving_description: entry.food_entry_description,
            quantity: number(&entry.number_of_units),
            meal_type: meal_type(entry.meal.as_deref()),
            calories: number(&entry.calories),
            protein: number(&entry.protein),
            carbs: number(&entry.carbohydrate),
            fat: number(&entry.fat),
            fiber: number(&entry.fiber),
            sugar: number(&entry.sugar),
            sodium: number(&entry.sodium),
            name: entry.food_entry_name,
        }
    }
}

/// Parse a `food_entries.get.v2` response body
pub fn parse_diary_response(body: &str) -> Result<DiaryDay, GatewayError> {
    let response: DiaryResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error {
        let code = error.code.map(|c| format!("{c}: ")).unwrap_or_default();
        return Err(GatewayError::Remote(format!("{code}{}", error.message)));
    }

    let entries = match response.food_entries.and_then(|e| e.food_entry) {
        Some(OneOrMany::Many(entries)) => entries,
        Some(OneOrMany::One(entry)) => vec![*entry],
        None => Vec::new(),
    };

    Ok(DiaryDay::from_entries(
        entries.into_iter().map(NutritionDiaryEntry::from).collect(),
    ))
}

/// Days since 1970-01-01, the API's date format
pub fn diary_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Client for the FatSecret diary endpoint
#[derive(Clone)]
pub struct FatSecretDiaryClient {
    base_url: String,
    signer: Arc<dyn RequestSigner>,
    client: reqwest::Client,
}

impl FatSecretDiaryClient {
    pub fn new(config: &DiaryConfig) -> Result<Self, GatewayError> {
        Self::with_signer(
            config,
            Arc::new(BearerTokenSigner::new(config.access_token.clone())),
        )
    }

    pub fn with_signer(
        config: &DiaryConfig,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            signer,
            client,
        })
    }
}

#[async_trait]
impl DiaryGateway for FatSecretDiaryClient {
    async fn fetch_diary_nutrition(
        &self,
        user_key: &str,
        date: NaiveDate,
    ) -> Result<DiaryDay, GatewayError> {
        let request = self.client.get(&self.base_url).query(&[
            ("method", "food_entries.get.v2".to_string()),
            ("date", diary_date(date).to_string()),
            ("format", "json".to_string()),
        ]);

        let resp = self.signer.sign(request, user_key).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let body = resp.text().await?;
        let day = parse_diary_response(&body)?;
        debug!(date = %date, entries = day.entries.len(), "Diary day fetched");
        Ok(day)
    }
}
