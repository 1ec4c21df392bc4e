use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, Transaction};
use tracing::{debug, info};

use crate::conversation::ConversationState;
use crate::nutrition::{Meal, MealSource};
use crate::report_model::{
    AiFeedback, DailyReport, Mood, ReportDraft, SleepEntry, TrainingType, WeightEntry,
};
use crate::storage::{validate_meals, ReportStore, UserIdentity, UserRecord, UserStore};

const USER_COLUMNS: &str =
    "external_id, display_name, language_code, conversation_state, draft, diary_key";

const REPORT_COLUMNS: &str = "user_id, report_date, weight, sleep, steps, meals, training, mood, \
     comments, ai_feedback, revision";

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            display_name TEXT,
            language_code TEXT,
            conversation_state TEXT NOT NULL DEFAULT 'idle',
            draft JSONB NOT NULL DEFAULT '{}'::jsonb,
            diary_key TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    // One report per user per day, enforced here rather than by callers
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS daily_reports (
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(external_id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            weight JSONB,
            sleep JSONB,
            steps INTEGER CHECK (steps >= 0),
            meals JSONB NOT NULL DEFAULT '[]'::jsonb,
            total_nutrition JSONB NOT NULL DEFAULT '{}'::jsonb,
            training TEXT,
            mood TEXT,
            comments TEXT,
            ai_feedback JSONB,
            revision INTEGER NOT NULL DEFAULT 0 CHECK (revision >= 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT daily_reports_user_date_key UNIQUE (user_id, report_date)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create daily_reports table")?;

    // tables created before revisions were tracked
    sqlx::query(
        "ALTER TABLE daily_reports
         ADD COLUMN IF NOT EXISTS revision INTEGER NOT NULL DEFAULT 0 CHECK (revision >= 0)",
    )
    .execute(pool)
    .await
    .context("Failed to add daily_reports revision column")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS daily_reports_user_date_idx
         ON daily_reports (user_id, report_date DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create daily_reports index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

#[derive(FromRow)]
struct UserRow {
    external_id: String,
    display_name: Option<String>,
    language_code: Option<String>,
    conversation_state: String,
    draft: Json<ReportDraft>,
    diary_key: Option<String>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let conversation = row
            .conversation_state
            .parse::<ConversationState>()
            .map_err(|e| anyhow!(e))?;
        Ok(UserRecord {
            external_id: row.external_id,
            display_name: row.display_name,
            language_code: row.language_code,
            conversation,
            draft: row.draft.0,
            diary_key: row.diary_key,
        })
    }
}

#[derive(FromRow)]
struct ReportRow {
    user_id: String,
    report_date: NaiveDate,
    weight: Option<Json<WeightEntry>>,
    sleep: Option<Json<SleepEntry>>,
    steps: Option<i32>,
    meals: Json<Vec<Meal>>,
    training: Option<String>,
    mood: Option<String>,
    comments: Option<String>,
    ai_feedback: Option<Json<AiFeedback>>,
    revision: i32,
}

impl TryFrom<ReportRow> for DailyReport {
    type Error = anyhow::Error;

    fn try_from(row: ReportRow) -> Result<Self> {
        let steps = row
            .steps
            .map(u32::try_from)
            .transpose()
            .context("Stored step count is negative")?;
        let training = row
            .training
            .map(|t| t.parse::<TrainingType>())
            .transpose()
            .map_err(|e| anyhow!(e))?;
        let mood = row
            .mood
            .map(|m| m.parse::<Mood>())
            .transpose()
            .map_err(|e| anyhow!(e))?;
        let revision = u32::try_from(row.revision).context("Stored revision is negative")?;

        // totals are never read back; they are recomputed from the meals
        Ok(DailyReport::from_stored(
            row.user_id,
            row.report_date,
            row.weight.map(|w| w.0),
            row.sleep.map(|s| s.0),
            steps,
            row.meals.0,
            training,
            mood,
            row.comments,
            row.ai_feedback.map(|f| f.0),
            revision,
        ))
    }
}

/// PostgreSQL-backed user and report store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Make sure the (user, date) row exists; concurrent callers collapse on the unique key
    async fn ensure_report_row(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO daily_reports (user_id, report_date) VALUES ($1, $2)
             ON CONFLICT (user_id, report_date) DO NOTHING",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut **tx)
        .await
        .context("Failed to create report row")?;
        Ok(())
    }

    async fn lock_report(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyReport>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM daily_reports
             WHERE user_id = $1 AND report_date = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to lock report")?;

        row.map(DailyReport::try_from).transpose()
    }

    async fn write_report(tx: &mut Transaction<'_, Postgres>, report: &DailyReport) -> Result<()> {
        let steps = report
            .steps
            .map(i32::try_from)
            .transpose()
            .context("Step count does not fit the steps column")?;
        let revision =
            i32::try_from(report.revision()).context("Revision does not fit the revision column")?;

        sqlx::query(
            "UPDATE daily_reports SET
                weight = $3, sleep = $4, steps = $5, meals = $6, total_nutrition = $7,
                training = $8, mood = $9, comments = $10, ai_feedback = $11, revision = $12,
                updated_at = NOW()
             WHERE user_id = $1 AND report_date = $2",
        )
        .bind(&report.user_id)
        .bind(report.date)
        .bind(report.weight.clone().map(Json))
        .bind(report.sleep.clone().map(Json))
        .bind(steps)
        .bind(Json(report.meals()))
        .bind(Json(report.total_nutrition()))
        .bind(report.training.map(|t| t.as_str()))
        .bind(report.mood.map(|m| m.as_str()))
        .bind(report.comments.as_deref())
        .bind(report.ai_feedback.clone().map(Json))
        .bind(revision)
        .execute(&mut **tx)
        .await
        .context("Failed to write report")?;
        Ok(())
    }

    /// Run `f` on the (user, date) report inside one transaction, creating it if missing
    async fn mutate_report<F>(&self, user_id: &str, date: NaiveDate, f: F) -> Result<DailyReport>
    where
        F: FnOnce(&mut DailyReport) + Send,
    {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        Self::ensure_report_row(&mut tx, user_id, date).await?;
        let mut report = Self::lock_report(&mut tx, user_id, date)
            .await?
            .ok_or_else(|| anyhow!("Report row vanished for user {user_id} on {date}"))?;

        f(&mut report);
        Self::write_report(&mut tx, &report).await?;
        tx.commit().await.context("Failed to commit report")?;

        debug!(
            user_id = %user_id,
            date = %date,
            meals = report.meals().len(),
            calories = report.total_nutrition().calories,
            "Report written"
        );
        Ok(report)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (external_id, display_name, language_code)
             VALUES ($1, $2, $3)
             ON CONFLICT (external_id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                updated_at = NOW()
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&identity.external_id)
        .bind(identity.display_name.as_deref())
        .bind(identity.language_code.as_deref())
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert user")?;

        UserRecord::try_from(row)
    }

    async fn save_conversation(
        &self,
        external_id: &str,
        state: ConversationState,
        draft: &ReportDraft,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET conversation_state = $2, draft = $3, updated_at = NOW()
             WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(state.as_str())
        .bind(Json(draft))
        .execute(&self.pool)
        .await
        .context("Failed to save conversation")?;

        if result.rows_affected() == 0 {
            bail!("Unknown user {external_id}");
        }
        Ok(())
    }

    async fn set_diary_key(&self, external_id: &str, diary_key: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET diary_key = $2, updated_at = NOW() WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(diary_key)
        .execute(&self.pool)
        .await
        .context("Failed to save diary key")?;

        if result.rows_affected() == 0 {
            bail!("Unknown user {external_id}");
        }
        info!(user_id = %external_id, "Diary account linked");
        Ok(())
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn upsert_report(&self, report: DailyReport) -> Result<DailyReport> {
        validate_meals(report.meals())?;
        let user_id = report.user_id.clone();
        let date = report.date;
        // merging into the freshly created empty row yields the report itself
        self.mutate_report(&user_id, date, |stored| stored.merge(report))
            .await
    }

    async fn get_report(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyReport>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM daily_reports WHERE user_id = $1 AND report_date = $2"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read report")?;

        row.map(DailyReport::try_from).transpose()
    }

    async fn list_reports(&self, user_id: &str, limit: usize) -> Result<Vec<DailyReport>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM daily_reports
             WHERE user_id = $1 ORDER BY report_date DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reports")?;

        rows.into_iter().map(DailyReport::try_from).collect()
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
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let Some(mut report) = Self::lock_report(&mut tx, user_id, date).await? else {
            return Ok(None);
        };
        if report.remove_meal(index).is_none() {
            return Ok(None);
        }

        Self::write_report(&mut tx, &report).await?;
        tx.commit().await.context("Failed to commit report")?;
        Ok(Some(report))
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
        let revision = i32::try_from(revision).context("Revision out of range")?;
        let result = sqlx::query(
            "UPDATE daily_reports SET ai_feedback = $4, updated_at = NOW()
             WHERE user_id = $1 AND report_date = $2 AND revision = $3",
        )
        .bind(user_id)
        .bind(date)
        .bind(revision)
        .bind(Json(feedback))
        .execute(&self.pool)
        .await
        .context("Failed to attach feedback")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_report(&self, user_id: &str, date: NaiveDate) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM daily_reports WHERE user_id = $1 AND report_date = $2")
                .bind(user_id)
                .bind(date)
                .execute(&self.pool)
                .await
                .context("Failed to delete report")?;

        if result.rows_affected() > 0 {
            info!(user_id = %user_id, date = %date, "Report deleted");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
