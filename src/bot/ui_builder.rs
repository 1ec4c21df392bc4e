//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup};

use crate::conversation::ConversationState;
use crate::localization::{t_args_lang, t_lang};
use crate::nutrition::MealType;
use crate::report_model::{AiFeedback, DailyReport, Mood, TrainingType};

/// Reply keyboard attached to an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    /// Rows of choice buttons
    Choices(Vec<Vec<String>>),
    /// Hide any keyboard shown earlier
    Remove,
}

/// Outgoing message, independent of the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

pub fn training_label(training: TrainingType, language_code: Option<&str>) -> String {
    t_lang(&format!("training-{}", training.as_str()), language_code)
}

pub fn mood_label(mood: Mood, language_code: Option<&str>) -> String {
    t_lang(&format!("mood-{}", mood.as_str()), language_code)
}

pub fn meal_type_label(meal_type: MealType, language_code: Option<&str>) -> String {
    t_lang(&format!("meal-{}", meal_type.as_str()), language_code)
}

fn rows_of(labels: Vec<String>, per_row: usize) -> Vec<Vec<String>> {
    labels.chunks(per_row).map(<[String]>::to_vec).collect()
}

/// Keyboard shown while waiting for the answer of `state`
pub fn step_keyboard(state: ConversationState, language_code: Option<&str>) -> Keyboard {
    let skip = t_lang("button-skip", language_code);
    let cancel = t_lang("button-cancel", language_code);

    let mut rows = match state {
        ConversationState::Idle => return Keyboard::Remove,
        ConversationState::Training => rows_of(
            TrainingType::ALL
                .iter()
                .map(|t| training_label(*t, language_code))
                .collect(),
            3,
        ),
        ConversationState::Mood => rows_of(
            Mood::ALL
                .iter()
                .map(|m| mood_label(*m, language_code))
                .collect(),
            3,
        ),
        _ => Vec::new(),
    };

    if state.accepts_skip() || state == ConversationState::Comments {
        rows.push(vec![skip, cancel]);
    } else {
        rows.push(vec![cancel]);
    }
    Keyboard::Choices(rows)
}

/// The question of a step with its keyboard
pub fn prompt_reply(state: ConversationState, language_code: Option<&str>) -> Reply {
    Reply::with_keyboard(
        t_lang(&format!("prompt-{}", state.as_str()), language_code),
        step_keyboard(state, language_code),
    )
}

/// Corrective message after a rejected answer
pub fn reprompt_reply(state: ConversationState, language_code: Option<&str>) -> Reply {
    Reply::with_keyboard(
        t_lang(&format!("invalid-{}", state.as_str()), language_code),
        step_keyboard(state, language_code),
    )
}

/// Render a number without trailing zeros: 80 -> "80", 7.50 -> "7.5"
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub fn format_report_summary(report: &DailyReport, language_code: Option<&str>) -> String {
    let mut lines = vec![t_args_lang(
        "summary-title",
        &[("date", &report.date.to_string())],
        language_code,
    )];
    let line = |key: &str, value: &str| t_args_lang(key, &[("value", value)], language_code);

    if let Some(weight) = &report.weight {
        lines.push(line("summary-weight", &format_number(weight.value)));
    }
    if let Some(steps) = report.steps {
        lines.push(line("summary-steps", &steps.to_string()));
    }
    if let Some(sleep) = &report.sleep {
        lines.push(line("summary-sleep", &format_number(sleep.hours)));
    }

    let totals = report.total_nutrition();
    if !report.meals().is_empty() {
        lines.push(t_args_lang(
            "summary-nutrition",
            &[
                ("calories", &format_number(totals.calories)),
                ("protein", &format_number(totals.protein)),
                ("carbs", &format_number(totals.carbs)),
                ("fat", &format_number(totals.fat)),
            ],
            language_code,
        ));
    }
    if let Some(training) = report.training {
        lines.push(line("summary-training", &training_label(training, language_code)));
    }
    if let Some(mood) = report.mood {
        lines.push(line("summary-mood", &mood_label(mood, language_code)));
    }
    if let Some(comments) = &report.comments {
        lines.push(line("summary-comments", comments));
    }

    if !report.meals().is_empty() {
        lines.push(t_lang("summary-meals", language_code));
        for (i, meal) in report.meals().iter().enumerate() {
            lines.push(t_args_lang(
                "summary-meal-line",
                &[
                    ("index", &(i + 1).to_string()),
                    ("meal_type", &meal_type_label(meal.meal_type, language_code)),
                    ("calories", &format_number(meal.calories.unwrap_or(0.0))),
                ],
                language_code,
            ));
        }
    }

    lines.join("\n")
}

pub fn format_feedback(feedback: &AiFeedback, language_code: Option<&str>) -> String {
    let mut sections = vec![format!(
        "{}\n{}",
        t_lang("feedback-title", language_code),
        feedback.summary
    )];

    if let Some(score) = feedback.health_score {
        sections.push(t_args_lang(
            "feedback-score",
            &[("score", &format!("{score:.0}"))],
            language_code,
        ));
    }

    for (key, items) in [
        ("feedback-recommendations", &feedback.recommendations),
        ("feedback-goals", &feedback.goals),
        ("feedback-warnings", &feedback.warnings),
    ] {
        if items.is_empty() {
            continue;
        }
        let bullets: Vec<String> = items.iter().map(|item| format!("• {item}")).collect();
        sections.push(format!("{}\n{}", t_lang(key, language_code), bullets.join("\n")));
    }

    sections.join("\n\n")
}

pub fn format_history(reports: &[DailyReport], language_code: Option<&str>) -> String {
    if reports.is_empty() {
        return t_lang("history-empty", language_code);
    }

    let mut lines = vec![t_lang("history-title", language_code)];
    for report in reports {
        let weight = report
            .weight
            .as_ref()
            .map(|w| format_number(w.value))
            .unwrap_or_else(|| "-".to_string());
        let steps = report
            .steps
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(t_args_lang(
            "history-line",
            &[
                ("date", &report.date.to_string()),
                ("weight", &weight),
                ("steps", &steps),
                ("calories", &format_number(report.total_nutrition().calories)),
            ],
            language_code,
        ));
    }
    lines.join("\n")
}

/// Convert a keyboard to Telegram reply markup
pub fn to_reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Choices(rows) => {
            let buttons: Vec<Vec<KeyboardButton>> = rows
                .iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect())
                .collect();
            KeyboardMarkup::new(buttons).resize_keyboard().into()
        }
        Keyboard::Remove => KeyboardRemove::new().into(),
    }
}
