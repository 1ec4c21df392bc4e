//! # Storage Module
//!
//! Store contracts used by the dialogue manager, and an in-memory store.
//!
//! Two records are persisted: one [`UserRecord`] per external identity, which
//! carries the conversation state and draft, and one [`DailyReport`] per
//! (user, date). Every meal mutation is a single read-modify-write that ends
//! with the totals recomputed from the meal list.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::conversation::ConversationState;
use crate::nutrition::{Meal, MealSource};
use crate::report_model::{AiFeedback, DailyReport, ReportDraft};

/// Who sent a message, as reported by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct UserIdentity {
    pub external_id: String,
    pub display_name: Option<String>,
    pub language_code: Option<String>,
}

impl UserIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: None,
            language_code: None,
        }
    }
}

/// A stored user with its dialogue progress
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub external_id: String,
    pub display_name: Option<String>,
    pub language_code: Option<String>,
    pub conversation: ConversationState,
    pub draft: ReportDraft,
    /// Account key for the nutrition diary service
    pub diary_key: Option<String>,
}

impl UserRecord {
    fn from_identity(identity: &UserIdentity) -> Self {
        Self {
            external_id: identity.external_id.clone(),
            display_name: identity.display_name.clone(),
            language_code: identity.language_code.clone(),
            conversation: ConversationState::Idle,
            draft: ReportDraft::default(),
            diary_key: None,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            display_name: self.display_name.clone(),
            language_code: self.language_code.clone(),
        }
    }
}

/// What the analysis service is told about the user
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub language_code: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the user on first contact, or return the existing record.
    ///
    /// The display name is refreshed; the stored language is kept.
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserRecord>;

    /// Persist state and draft together as one write
    async fn save_conversation(
        &self,
        external_id: &str,
        state: ConversationState,
        draft: &ReportDraft,
    ) -> Result<()>;

    async fn set_diary_key(&self, external_id: &str, diary_key: &str) -> Result<()>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert the report, or merge it into the existing one for the same (user, date)
    async fn upsert_report(&self, report: DailyReport) -> Result<DailyReport>;

    async fn get_report(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyReport>>;

    /// Most recent reports first
    async fn list_reports(&self, user_id: &str, limit: usize) -> Result<Vec<DailyReport>>;

    /// Append a meal, creating an empty report for the date if needed
    async fn add_meal(&self, user_id: &str, date: NaiveDate, meal: Meal) -> Result<DailyReport>;

    /// Remove the meal at `index`; `None` when there is no such report or meal
    async fn remove_meal(
        &self,
        user_id: &str,
        date: NaiveDate,
        index: usize,
    ) -> Result<Option<DailyReport>>;

    async fn replace_meals(
        &self,
        user_id: &str,
        date: NaiveDate,
        meals: Vec<Meal>,
    ) -> Result<DailyReport>;

    /// Replace the diary-sourced meals, keeping everything else
    async fn sync_diary_meals(
        &self,
        user_id: &str,
        date: NaiveDate,
        meals: Vec<Meal>,
    ) -> Result<DailyReport>;

    /// Attach feedback computed from `revision` of the report.
    ///
    /// Returns false when the report no longer exists or was resubmitted since.
    async fn attach_feedback(
        &self,
        user_id: &str,
        date: NaiveDate,
        revision: u32,
        feedback: AiFeedback,
    ) -> Result<bool>;

    async fn delete_report(&self, user_id: &str, date: NaiveDate) -> Result<bool>;
}

/// Everything the dialogue manager needs from persistence
pub trait WellnessStore: UserStore + ReportStore {}

impl<T: UserStore + ReportStore + ?Sized> WellnessStore for T {}

/// Reject meals with negative or non-finite values before they are stored
pub fn validate_meals(meals: &[Meal]) -> Result<()> {
    for meal in meals {
        meal.validate()
            .with_context(|| format!("Invalid {} meal", meal.meal_type))?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, UserRecord>,
    reports: HashMap<(String, NaiveDate), DailyReport>,
}

/// Store kept in process memory, used in tests and local runs without a database
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user(&self, external_id: &str) -> Option<UserRecord> {
        self.state.lock().await.users.get(external_id).cloned()
    }

    pub async fn report_count(&self) -> usize {
        self.state.lock().await.reports.len()
    }

    async fn mutate_report<F>(&self, user_id: &str, date: NaiveDate, f: F) -> Result<DailyReport>
    where
        F: FnOnce(&mut DailyReport) + Send,
    {
        let mut state = self.state.lock().await;
        let report = state
            .reports
            .entry((user_id.to_string(), date))
            .or_insert_with(|| DailyReport::new(user_id, date));
        f(report);
        Ok(report.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .users
            .entry(identity.external_id.clone())
            .or_insert_with(|| {
                debug!(user_id = %identity.external_id, "Creating user");
                UserRecord::from_identity(identity)
            });
        if identity.display_name.is_some() {
            record.display_name = identity.display_name.clone();
        }
        Ok(record.clone())
    }

    async fn save_conversation(
        &self,
        external_id: &str,
        state: ConversationState,
        draft: &ReportDraft,
    ) -> Result<()> {
        let mut guard = self.state.lock().await;
        let record = guard
            .users
            .get_mut(external_id)
            .with_context(|| format!("Unknown user {external_id}"))?;
        record.conversation = state;
        record.draft = draft.clone();
        Ok(())
    }

    async fn set_diary_key(&self, external_id: &str, diary_key: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let record = guard
            .users
            .get_mut(external_id)
            .with_context(|| format!("Unknown user {external_id}"))?;
        record.diary_key = Some(diary_key.to_string());
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn upsert_report(&self, report: DailyReport) -> Result<DailyReport> {
        validate_meals(report.meals())?;
        let mut state = self.state.lock().await;
        let key = (report.user_id.clone(), report.date);
        let stored = match state.reports.get_mut(&key) {
            Some(existing) => {
                existing.merge(report);
                existing.clone()
            }
            None => {
                let mut fresh = DailyReport::new(&report.user_id, report.date);
                fresh.merge(report);
                state.reports.insert(key, fresh.clone());
                fresh
            }
        };
        Ok(stored)
    }

    async fn get_report(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyReport>> {
        let state = self.state.lock().await;
        Ok(state.reports.get(&(user_id.to_string(), date)).cloned())
    }

    async fn list_reports(&self, user_id: &str, limit: usize) -> Result<Vec<DailyReport>> {
        let state = self.state.lock().await;
        let mut reports: Vec<DailyReport> = state
            .reports
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.date.cmp(&a.date));
        reports.truncate(limit);
        Ok(reports)
    }

    async fn add_meal(&self, user_id: &str, date: NaiveDate, meal: Meal) -> Result<DailyReport> {
        validate_meals(std::slice::from_ref(&meal))?;
        self.mutate_report(user_id, date, |report| report.add_meal(meal))
            .await
    }

    async fn remove_meal(
        &self,
        user_id: &str,
        date: NaiveDate,
        index: usize,
    ) -> Result<Option<DailyReport>> {
        let mut state = self.state.lock().await;
        let Some(report) = state.reports.get_mut(&(user_id.to_string(), date)) else {
            return Ok(None);
        };
        Ok(report.remove_meal(index).map(|_| report.clone()))
    }

    async fn replace_meals(
        &self,
        user_id: &str,
        date: NaiveDate,
        meals: Vec<Meal>,
    ) -> Result<DailyReport> {
        validate_meals(&meals)?;
        self.mutate_report(user_id, date, |report| report.replace_meals(meals))
            .await
    }

    async fn sync_diary_meals(
        &self,
        user_id: &str,
        date: NaiveDate,
        meals: Vec<Meal>,
    ) -> Result<DailyReport> {
        validate_meals(&meals)?;
        self.mutate_report(user_id, date, |report| {
            report.replace_meals_from(MealSource::Diary, meals)
        })
        .await
    }

    async fn attach_feedback(
        &self,
        user_id: &str,
        date: NaiveDate,
        revision: u32,
        feedback: AiFeedback,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.reports.get_mut(&(user_id.to_string(), date)) {
            Some(report) if report.revision() == revision => {
                report.ai_feedback = Some(feedback);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_report(&self, user_id: &str, date: NaiveDate) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.reports.remove(&(user_id.to_string(), date)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::MealType;
    use crate::report_model::Mood;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn meal(meal_type: MealType, calories: f64) -> Meal {
        Meal {
            calories: Some(calories),
            ..Meal::new(meal_type)
        }
        .with_source(MealSource::Manual)
    }

    #[tokio::test]
    async fn test_upsert_user_keeps_language() -> Result<()> {
        let store = MemoryStore::new();
        let mut identity = UserIdentity::new("42");
        identity.language_code = Some("ru".to_string());
        store.upsert_user(&identity).await?;

        identity.language_code = Some("en".to_string());
        identity.display_name = Some("Anna".to_string());
        let user = store.upsert_user(&identity).await?;

        assert_eq!(user.language_code.as_deref(), Some("ru"));
        assert_eq!(user.display_name.as_deref(), Some("Anna"));
        assert_eq!(user.conversation, ConversationState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_upsert_merges_into_one_report() -> Result<()> {
        let store = MemoryStore::new();

        let mut first = DailyReport::new("42", date());
        first.steps = Some(5000);
        first.mood = Some(Mood::Bad);
        store.upsert_report(first).await?;

        let mut second = DailyReport::new("42", date());
        second.steps = Some(9000);
        let stored = store.upsert_report(second).await?;

        assert_eq!(store.report_count().await, 1);
        assert_eq!(stored.steps, Some(9000));
        assert_eq!(stored.mood, Some(Mood::Bad));
        Ok(())
    }

    #[tokio::test]
    async fn test_meal_mutations_recompute_totals() -> Result<()> {
        let store = MemoryStore::new();

        store.add_meal("42", date(), meal(MealType::Breakfast, 400.0)).await?;
        let report = store.add_meal("42", date(), meal(MealType::Lunch, 700.0)).await?;
        assert_eq!(report.total_nutrition().calories, 1100.0);

        let report = store.remove_meal("42", date(), 0).await?.unwrap();
        assert_eq!(report.meals().len(), 1);
        assert_eq!(report.total_nutrition().calories, 700.0);

        assert!(store.remove_meal("42", date(), 5).await?.is_none());
        assert!(store.remove_meal("7", date(), 0).await?.is_none());

        let report = store.replace_meals("42", date(), vec![]).await?;
        assert_eq!(report.total_nutrition().calories, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_diary_keeps_manual_meals() -> Result<()> {
        let store = MemoryStore::new();
        store.add_meal("42", date(), meal(MealType::Snack, 150.0)).await?;

        let imported = Meal {
            calories: Some(500.0),
            ..Meal::new(MealType::Dinner)
        }
        .with_source(MealSource::Diary);
        store
            .sync_diary_meals("42", date(), vec![imported.clone(), imported.clone()])
            .await?;
        let report = store.sync_diary_meals("42", date(), vec![imported]).await?;

        assert_eq!(report.meals().len(), 2);
        assert_eq!(report.total_nutrition().calories, 650.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_feedback_for_superseded_revision_is_dropped() -> Result<()> {
        let store = MemoryStore::new();
        let first = store.upsert_report(DailyReport::new("42", date())).await?;
        let second = store.upsert_report(DailyReport::new("42", date())).await?;
        assert_eq!(second.revision(), first.revision() + 1);

        let feedback = AiFeedback {
            summary: "old content".to_string(),
            recommendations: vec![],
            health_score: None,
            goals: vec![],
            warnings: vec![],
            generated_at: chrono::Utc::now(),
        };
        assert!(!store
            .attach_feedback("42", date(), first.revision(), feedback.clone())
            .await?);
        assert!(store
            .attach_feedback("42", date(), second.revision(), feedback)
            .await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_meal_is_rejected() {
        let store = MemoryStore::new();
        let result = store.add_meal("42", date(), meal(MealType::Lunch, -1.0)).await;
        assert!(result.is_err());
        assert_eq!(store.report_count().await, 0);
    }
}
