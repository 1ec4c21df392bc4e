//! Dialogue Manager module for running the report conversation
//!
//! Loads the user's state, feeds the inbound event through the transition
//! table, carries out the resulting effects against the store, and only then
//! persists the new state. A turn that fails part-way leaves the stored state
//! as it was, so the user's next message retries the same step.

use anyhow::Result;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisGateway;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{BreakerConfig, DEFAULT_ANALYSIS_TIMEOUT_SECS};
use crate::conversation::{transition, Effect, Event};
use crate::diary::DiaryGateway;
use crate::image_input::{ImageReader, ImageRef, ManualEntryFallback};
use crate::keywords::KeywordTable;
use crate::localization::{t_args_lang, t_lang};
use crate::report_model::AiFeedback;
use crate::report_parser::parse_meal_command;
use crate::storage::{UserIdentity, UserProfile, UserRecord, WellnessStore};

use super::ui_builder::{
    format_history, format_number, format_report_summary, prompt_reply, reprompt_reply, Keyboard,
    Reply,
};

/// Reports listed by /history
pub const HISTORY_LIMIT: usize = 7;

/// A message as the dialogue sees it
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Image(ImageRef),
    /// Stickers, voice notes and anything else without text or a photo
    Unsupported,
}

/// A report that was just saved and can be sent for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedReport {
    pub user_id: String,
    pub date: NaiveDate,
    /// Report revision the feedback will describe
    pub revision: u32,
    pub profile: UserProfile,
}

/// What to send back for one inbound message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub replies: Vec<Reply>,
    pub finalized: Option<FinalizedReport>,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            replies: vec![reply],
            finalized: None,
        }
    }
}

/// A failed turn, with the language to apologise in
#[derive(Debug)]
pub struct TurnError {
    pub language_code: Option<String>,
    pub source: anyhow::Error,
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl std::error::Error for TurnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Bot commands; anything else starting with '/' is treated as text
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Start,
    Help,
    Report,
    Cancel,
    Today,
    History,
    Delete,
    Meal(String),
    RemoveMeal(String),
    Diary(String),
    Import,
}

fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let (head, args) = match trimmed.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim().to_string()),
        None => (trimmed, String::new()),
    };
    // "/report@WellnessBot" in group chats
    let name = head.strip_prefix('/')?.split('@').next()?.to_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "report" => Command::Report,
        "cancel" => Command::Cancel,
        "today" => Command::Today,
        "history" => Command::History,
        "delete" => Command::Delete,
        "meal" => Command::Meal(args),
        "removemeal" => Command::RemoveMeal(args),
        "diary" => Command::Diary(args),
        "import" => Command::Import,
        _ => return None,
    };
    Some(command)
}

/// Orchestrates the conversation state machine, the store and the gateways
#[derive(Clone)]
pub struct DialogueManager {
    store: Arc<dyn WellnessStore>,
    keywords: Arc<KeywordTable>,
    analysis: Option<Arc<dyn AnalysisGateway>>,
    breaker: Arc<CircuitBreaker>,
    analysis_timeout: Duration,
    diary: Option<Arc<dyn DiaryGateway>>,
    image_reader: Arc<dyn ImageReader>,
}

impl DialogueManager {
    pub fn new(store: Arc<dyn WellnessStore>, keywords: Arc<KeywordTable>) -> Self {
        Self {
            store,
            keywords,
            analysis: None,
            breaker: Arc::new(CircuitBreaker::new(BreakerConfig::default())),
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            diary: None,
            image_reader: Arc::new(ManualEntryFallback),
        }
    }

    pub fn with_analysis(
        mut self,
        gateway: Arc<dyn AnalysisGateway>,
        breaker: BreakerConfig,
        timeout: Duration,
    ) -> Self {
        self.analysis = Some(gateway);
        self.breaker = Arc::new(CircuitBreaker::new(breaker));
        self.analysis_timeout = timeout;
        self
    }

    pub fn with_diary(mut self, gateway: Arc<dyn DiaryGateway>) -> Self {
        self.diary = Some(gateway);
        self
    }

    pub fn with_image_reader(mut self, reader: Arc<dyn ImageReader>) -> Self {
        self.image_reader = reader;
        self
    }

    /// Process one inbound message for `identity`, with `today` as the report date
    pub async fn handle(
        &self,
        identity: &UserIdentity,
        inbound: Inbound,
        today: NaiveDate,
    ) -> Result<Outcome, TurnError> {
        let user = self
            .store
            .upsert_user(identity)
            .await
            .map_err(|source| TurnError {
                language_code: identity.language_code.clone(),
                source,
            })?;
        // the stored language wins so a user keeps the language they started with
        let language_code = user
            .language_code
            .clone()
            .or_else(|| identity.language_code.clone());

        self.dispatch(&user, inbound, today, language_code.as_deref())
            .await
            .map_err(|source| TurnError {
                language_code,
                source,
            })
    }

    async fn dispatch(
        &self,
        user: &UserRecord,
        inbound: Inbound,
        today: NaiveDate,
        lang: Option<&str>,
    ) -> Result<Outcome> {
        match inbound {
            Inbound::Unsupported => Ok(Outcome::reply(Reply::text(t_lang(
                "unsupported-message",
                lang,
            )))),
            Inbound::Image(image) => {
                let event = match self.image_reader.read_value(&image).await {
                    Ok(Some(text)) => {
                        debug!(user_id = %user.external_id, "Image reader extracted a value");
                        Event::Text(text)
                    }
                    Ok(None) => Event::Image,
                    Err(e) => {
                        warn!(user_id = %user.external_id, error = %e, "Image reader failed");
                        Event::Image
                    }
                };
                self.run_event(user, event, today, lang).await
            }
            Inbound::Text(text) => match parse_command(&text) {
                Some(command) => self.run_command(user, command, today, lang).await,
                None => self.run_event(user, Event::Text(text), today, lang).await,
            },
        }
    }

    async fn run_event(
        &self,
        user: &UserRecord,
        event: Event,
        today: NaiveDate,
        lang: Option<&str>,
    ) -> Result<Outcome> {
        let step = transition(
            user.conversation,
            user.draft.clone(),
            event,
            &self.keywords,
        );
        debug!(
            user_id = %user.external_id,
            from = %user.conversation,
            to = %step.state,
            "Conversation transition"
        );

        let mut outcome = Outcome::default();
        for effect in step.effects {
            match effect {
                Effect::Prompt(state) => outcome.replies.push(prompt_reply(state, lang)),
                Effect::Reprompt(state) => outcome.replies.push(reprompt_reply(state, lang)),
                Effect::Cancelled => outcome.replies.push(Reply::with_keyboard(
                    t_lang("report-cancelled", lang),
                    Keyboard::Remove,
                )),
                Effect::NothingToCancel => outcome
                    .replies
                    .push(Reply::text(t_lang("nothing-to-cancel", lang))),
                Effect::ImageFallback => outcome
                    .replies
                    .push(Reply::text(t_lang("image-fallback", lang))),
                Effect::IdleHint => outcome
                    .replies
                    .push(Reply::text(t_lang("idle-hint", lang))),
                Effect::Finalize(draft) => {
                    let report = draft.into_report(&user.external_id, today);
                    let stored = self.store.upsert_report(report).await?;
                    info!(
                        user_id = %user.external_id,
                        date = %today,
                        calories = stored.total_nutrition().calories,
                        "Daily report saved"
                    );
                    outcome.replies.push(Reply::with_keyboard(
                        format!(
                            "{}\n\n{}",
                            t_lang("report-saved", lang),
                            format_report_summary(&stored, lang)
                        ),
                        Keyboard::Remove,
                    ));
                    outcome.finalized = Some(FinalizedReport {
                        user_id: user.external_id.clone(),
                        date: today,
                        revision: stored.revision(),
                        profile: user.profile(),
                    });
                }
            }
        }

        if step.state != user.conversation || step.draft != user.draft {
            self.store
                .save_conversation(&user.external_id, step.state, &step.draft)
                .await?;
        }
        Ok(outcome)
    }

    async fn run_command(
        &self,
        user: &UserRecord,
        command: Command,
        today: NaiveDate,
        lang: Option<&str>,
    ) -> Result<Outcome> {
        let user_id = user.external_id.as_str();
        debug!(user_id = %user_id, ?command, "Command received");

        let text = match command {
            Command::Start => {
                let name = user
                    .display_name
                    .clone()
                    .unwrap_or_else(|| t_lang("welcome-default-name", lang));
                t_args_lang("welcome", &[("name", &name)], lang)
            }
            Command::Help => t_lang("help", lang),
            Command::Report => return self.run_event(user, Event::Begin, today, lang).await,
            Command::Cancel => return self.run_event(user, Event::Cancel, today, lang).await,
            Command::Today => match self.store.get_report(user_id, today).await? {
                Some(report) => format_report_summary(&report, lang),
                None => t_lang("today-empty", lang),
            },
            Command::History => {
                let reports = self.store.list_reports(user_id, HISTORY_LIMIT).await?;
                format_history(&reports, lang)
            }
            Command::Delete => {
                if self.store.delete_report(user_id, today).await? {
                    t_lang("report-deleted", lang)
                } else {
                    t_lang("report-delete-none", lang)
                }
            }
            Command::Meal(args) => match parse_meal_command(&args, &self.keywords) {
                Some(meal) => {
                    let report = self.store.add_meal(user_id, today, meal).await?;
                    t_args_lang(
                        "meal-added",
                        &[("calories", &format_number(report.total_nutrition().calories))],
                        lang,
                    )
                }
                None => t_lang("meal-usage", lang),
            },
            Command::RemoveMeal(args) => match args.parse::<usize>() {
                Ok(number) if number >= 1 => {
                    match self.store.remove_meal(user_id, today, number - 1).await? {
                        Some(report) => t_args_lang(
                            "meal-removed",
                            &[("calories", &format_number(report.total_nutrition().calories))],
                            lang,
                        ),
                        None => t_args_lang(
                            "meal-remove-missing",
                            &[("index", &number.to_string())],
                            lang,
                        ),
                    }
                }
                _ => t_lang("meal-remove-usage", lang),
            },
            Command::Diary(args) => {
                if args.is_empty() || args.contains(char::is_whitespace) {
                    t_lang("diary-usage", lang)
                } else {
                    self.store.set_diary_key(user_id, &args).await?;
                    t_lang("diary-linked", lang)
                }
            }
            Command::Import => self.import_diary(user, today, lang).await?,
        };

        Ok(Outcome::reply(Reply::text(text)))
    }

    /// Explicit diary import; gateway failures are reported, not retried
    async fn import_diary(
        &self,
        user: &UserRecord,
        today: NaiveDate,
        lang: Option<&str>,
    ) -> Result<String> {
        let Some(diary) = &self.diary else {
            return Ok(t_lang("diary-disabled", lang));
        };
        let Some(diary_key) = &user.diary_key else {
            return Ok(t_lang("diary-not-linked", lang));
        };

        let day = match diary.fetch_diary_nutrition(diary_key, today).await {
            Ok(day) => day,
            Err(e) => {
                warn!(user_id = %user.external_id, error = %e, "Diary import failed");
                return Ok(t_lang("diary-failed", lang));
            }
        };
        if day.entries.is_empty() {
            return Ok(t_lang("diary-empty", lang));
        }

        let count = day.entries.len();
        let report = self
            .store
            .sync_diary_meals(&user.external_id, today, day.into_meals())
            .await?;
        info!(user_id = %user.external_id, entries = count, "Diary imported");

        Ok(t_args_lang(
            "diary-imported",
            &[
                ("count", &count.to_string()),
                ("calories", &format_number(report.total_nutrition().calories)),
            ],
            lang,
        ))
    }

    /// Best-effort AI feedback for a saved report.
    ///
    /// Never fails: every problem is logged and yields `None`, and the saved
    /// report is left as it was.
    pub async fn enrich_report(&self, finalized: &FinalizedReport) -> Option<AiFeedback> {
        let gateway = self.analysis.as_ref()?;
        let user_id = finalized.user_id.as_str();

        if self.breaker.is_open() {
            debug!(user_id = %user_id, "Analysis skipped, circuit breaker open");
            return None;
        }

        let report = match self.store.get_report(user_id, finalized.date).await {
            Ok(Some(report)) if report.revision() == finalized.revision => report,
            Ok(Some(_)) => {
                debug!(user_id = %user_id, "Report resubmitted, analysis skipped");
                return None;
            }
            Ok(None) => return None,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not load report for analysis");
                return None;
            }
        };

        let feedback = match tokio::time::timeout(
            self.analysis_timeout,
            gateway.analyze_daily_report(&report, &finalized.profile),
        )
        .await
        {
            Ok(Ok(feedback)) => {
                self.breaker.record_success();
                feedback
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                warn!(user_id = %user_id, error = %e, "AI analysis failed");
                return None;
            }
            Err(_) => {
                self.breaker.record_failure();
                warn!(
                    user_id = %user_id,
                    timeout_secs = self.analysis_timeout.as_secs(),
                    "AI analysis timed out"
                );
                return None;
            }
        };

        match self
            .store
            .attach_feedback(
                user_id,
                finalized.date,
                finalized.revision,
                feedback.clone(),
            )
            .await
        {
            Ok(true) => {
                info!(user_id = %user_id, date = %finalized.date, "AI feedback attached");
                Some(feedback)
            }
            Ok(false) => None,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not store AI feedback");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/Report@WellnessBot"), Some(Command::Report));
        assert_eq!(
            parse_command("/meal lunch  650 30"),
            Some(Command::Meal("lunch  650 30".to_string()))
        );
        assert_eq!(
            parse_command(" /removemeal 2 "),
            Some(Command::RemoveMeal("2".to_string()))
        );
        assert_eq!(parse_command("/skip"), None);
        assert_eq!(parse_command("80"), None);
    }
}
