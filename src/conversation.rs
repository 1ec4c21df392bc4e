//! # Conversation State Machine
//!
//! The daily-report dialogue as a pure transition table:
//! `(state, draft, event) -> (state, draft, effects)`.
//!
//! ```text
//! idle -> weight -> steps -> sleep -> calories -> training -> mood -> comments -> idle
//! ```
//!
//! `training` and `mood` accept a skip token. Every step accepts a cancel
//! token. Invalid input keeps the state and asks again, with no retry limit.
//! Nothing here touches storage or the network; the dialogue manager runs the
//! returned effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::keywords::KeywordTable;
use crate::report_model::ReportDraft;
use crate::report_parser::{
    parse_calories, parse_comment, parse_mood, parse_sleep, parse_steps, parse_training,
    parse_weight,
};

/// Step of the report dialogue a user is in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    #[default]
    Idle,
    Weight,
    Steps,
    Sleep,
    Calories,
    Training,
    Mood,
    Comments,
}

impl ConversationState {
    pub const ALL: [ConversationState; 8] = [
        ConversationState::Idle,
        ConversationState::Weight,
        ConversationState::Steps,
        ConversationState::Sleep,
        ConversationState::Calories,
        ConversationState::Training,
        ConversationState::Mood,
        ConversationState::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Weight => "weight",
            ConversationState::Steps => "steps",
            ConversationState::Sleep => "sleep",
            ConversationState::Calories => "calories",
            ConversationState::Training => "training",
            ConversationState::Mood => "mood",
            ConversationState::Comments => "comments",
        }
    }

    /// The step that follows this one; `comments` wraps to `idle`
    pub fn next(self) -> Self {
        match self {
            ConversationState::Idle => ConversationState::Weight,
            ConversationState::Weight => ConversationState::Steps,
            ConversationState::Steps => ConversationState::Sleep,
            ConversationState::Sleep => ConversationState::Calories,
            ConversationState::Calories => ConversationState::Training,
            ConversationState::Training => ConversationState::Mood,
            ConversationState::Mood => ConversationState::Comments,
            ConversationState::Comments => ConversationState::Idle,
        }
    }

    pub fn is_collecting(&self) -> bool {
        *self != ConversationState::Idle
    }

    pub fn accepts_skip(&self) -> bool {
        matches!(self, ConversationState::Training | ConversationState::Mood)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown conversation state: {s}"))
    }
}

/// Input driving the dialogue
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Explicit request to start (or restart) a report
    Begin,
    /// Explicit cancel command
    Cancel,
    Text(String),
    /// An image that yielded no structured value
    Image,
}

/// Side effect the caller must carry out after a transition
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Ask the question of this step
    Prompt(ConversationState),
    /// Tell the user the answer was not accepted and ask again
    Reprompt(ConversationState),
    /// Dialogue cancelled, draft discarded
    Cancelled,
    /// Cancel requested with no report in progress
    NothingToCancel,
    /// Image received; manual entry restarts at the weight step
    ImageFallback,
    /// Text received outside a dialogue that is not a report value
    IdleHint,
    /// Dialogue finished; persist this draft as today's report
    Finalize(ReportDraft),
}

/// Result of applying one event
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: ConversationState,
    pub draft: ReportDraft,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: ConversationState, draft: ReportDraft, effect: Effect) -> Self {
        Self {
            state,
            draft,
            effects: vec![effect],
        }
    }

    fn advance(from: ConversationState, draft: ReportDraft) -> Self {
        let next = from.next();
        Self {
            state: next,
            draft,
            effects: vec![Effect::Prompt(next)],
        }
    }

    fn idle(effect: Effect) -> Self {
        Self::stay(ConversationState::Idle, ReportDraft::default(), effect)
    }
}

/// Apply `event` to a user's dialogue
pub fn transition(
    state: ConversationState,
    draft: ReportDraft,
    event: Event,
    keywords: &KeywordTable,
) -> Transition {
    match event {
        Event::Begin => Transition::stay(
            ConversationState::Weight,
            ReportDraft::default(),
            Effect::Prompt(ConversationState::Weight),
        ),
        Event::Cancel => cancel(state),
        Event::Image => Transition {
            state: ConversationState::Weight,
            draft: ReportDraft::default(),
            effects: vec![
                Effect::ImageFallback,
                Effect::Prompt(ConversationState::Weight),
            ],
        },
        Event::Text(text) => {
            if keywords.is_cancel(&text) {
                return cancel(state);
            }
            apply_text(state, draft, &text, keywords)
        }
    }
}

fn cancel(state: ConversationState) -> Transition {
    if state.is_collecting() {
        Transition::idle(Effect::Cancelled)
    } else {
        Transition::idle(Effect::NothingToCancel)
    }
}

fn apply_text(
    state: ConversationState,
    mut draft: ReportDraft,
    text: &str,
    keywords: &KeywordTable,
) -> Transition {
    if state.accepts_skip() && keywords.is_skip(text) {
        return Transition::advance(state, draft);
    }

    let accepted = match state {
        ConversationState::Idle => {
            // a bare weight starts a report without the explicit command
            return match parse_weight(text, keywords) {
                Some(weight) => {
                    let draft = ReportDraft {
                        weight_kg: Some(weight),
                        ..Default::default()
                    };
                    Transition::advance(ConversationState::Weight, draft)
                }
                None => Transition::idle(Effect::IdleHint),
            };
        }
        ConversationState::Weight => parse_weight(text, keywords)
            .map(|v| draft.weight_kg = Some(v))
            .is_some(),
        ConversationState::Steps => parse_steps(text).map(|v| draft.steps = Some(v)).is_some(),
        ConversationState::Sleep => parse_sleep(text, keywords)
            .map(|v| draft.sleep_hours = Some(v))
            .is_some(),
        ConversationState::Calories => parse_calories(text, keywords)
            .map(|v| draft.calories = Some(v))
            .is_some(),
        ConversationState::Training => parse_training(text, keywords)
            .map(|v| draft.training = Some(v))
            .is_some(),
        ConversationState::Mood => parse_mood(text, keywords)
            .map(|v| draft.mood = Some(v))
            .is_some(),
        ConversationState::Comments => {
            if keywords.is_skip(text) {
                return Transition::idle(Effect::Finalize(draft));
            }
            match parse_comment(text) {
                Some(comment) => {
                    draft.comments = Some(comment);
                    return Transition::idle(Effect::Finalize(draft));
                }
                None => false,
            }
        }
    };

    if accepted {
        Transition::advance(state, draft)
    } else {
        Transition::stay(state, draft, Effect::Reprompt(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_model::{Mood, TrainingType};

    fn kw() -> &'static KeywordTable {
        KeywordTable::builtin()
    }

    fn text(s: &str) -> Event {
        Event::Text(s.to_string())
    }

    fn run(events: &[&str]) -> (Transition, Vec<Effect>) {
        let mut state = ConversationState::Idle;
        let mut draft = ReportDraft::default();
        let mut all_effects = Vec::new();
        let mut last = None;
        for e in events {
            let t = transition(state, draft.clone(), text(e), kw());
            state = t.state;
            draft = t.draft.clone();
            all_effects.extend(t.effects.clone());
            last = Some(t);
        }
        (last.expect("at least one event"), all_effects)
    }

    #[test]
    fn test_begin_prompts_weight() {
        let t = transition(ConversationState::Idle, ReportDraft::default(), Event::Begin, kw());
        assert_eq!(t.state, ConversationState::Weight);
        assert_eq!(t.effects, vec![Effect::Prompt(ConversationState::Weight)]);
    }

    #[test]
    fn test_valid_weight_advances_to_steps() {
        let t = transition(ConversationState::Weight, ReportDraft::default(), text("75.5"), kw());
        assert_eq!(t.state, ConversationState::Steps);
        assert_eq!(t.draft.weight_kg, Some(75.5));
        assert_eq!(t.effects, vec![Effect::Prompt(ConversationState::Steps)]);
    }

    #[test]
    fn test_weight_from_idle_starts_report() {
        let t = transition(ConversationState::Idle, ReportDraft::default(), text("80"), kw());
        assert_eq!(t.state, ConversationState::Steps);
        assert_eq!(t.draft.weight_kg, Some(80.0));
    }

    #[test]
    fn test_idle_text_gets_hint() {
        let t = transition(ConversationState::Idle, ReportDraft::default(), text("hello"), kw());
        assert_eq!(t.state, ConversationState::Idle);
        assert_eq!(t.effects, vec![Effect::IdleHint]);
    }

    #[test]
    fn test_invalid_input_keeps_state_and_draft() {
        let draft = ReportDraft {
            weight_kg: Some(70.0),
            ..Default::default()
        };
        let t = transition(ConversationState::Steps, draft.clone(), text("abc"), kw());
        assert_eq!(t.state, ConversationState::Steps);
        assert_eq!(t.draft, draft);
        assert_eq!(t.effects, vec![Effect::Reprompt(ConversationState::Steps)]);

        let t = transition(ConversationState::Weight, ReportDraft::default(), text("abc"), kw());
        assert_eq!(t.state, ConversationState::Weight);
        assert!(t.draft.is_empty());
    }

    #[test]
    fn test_skip_only_on_optional_steps() {
        let t = transition(ConversationState::Training, ReportDraft::default(), text("skip"), kw());
        assert_eq!(t.state, ConversationState::Mood);
        assert_eq!(t.draft.training, None);

        let t = transition(ConversationState::Mood, ReportDraft::default(), text("пропустить"), kw());
        assert_eq!(t.state, ConversationState::Comments);

        let t = transition(ConversationState::Steps, ReportDraft::default(), text("skip"), kw());
        assert_eq!(t.state, ConversationState::Steps);
        assert_eq!(t.effects, vec![Effect::Reprompt(ConversationState::Steps)]);
    }

    #[test]
    fn test_cancel_from_every_collecting_state() {
        for state in ConversationState::ALL.into_iter().filter(|s| s.is_collecting()) {
            let draft = ReportDraft {
                weight_kg: Some(90.0),
                steps: Some(10),
                ..Default::default()
            };
            let t = transition(state, draft, text("cancel"), kw());
            assert_eq!(t.state, ConversationState::Idle, "from {state}");
            assert!(t.draft.is_empty(), "from {state}");
            assert_eq!(t.effects, vec![Effect::Cancelled]);
        }

        let t = transition(ConversationState::Idle, ReportDraft::default(), Event::Cancel, kw());
        assert_eq!(t.effects, vec![Effect::NothingToCancel]);
    }

    #[test]
    fn test_image_restarts_at_weight() {
        let draft = ReportDraft {
            weight_kg: Some(90.0),
            ..Default::default()
        };
        let t = transition(ConversationState::Sleep, draft, Event::Image, kw());
        assert_eq!(t.state, ConversationState::Weight);
        assert!(t.draft.is_empty());
        assert_eq!(
            t.effects,
            vec![Effect::ImageFallback, Effect::Prompt(ConversationState::Weight)]
        );
    }

    #[test]
    fn test_full_dialogue_finalizes() {
        let (last, _) = run(&["80", "8000", "7:30", "2000", "skip", "skip", "done"]);

        assert_eq!(last.state, ConversationState::Idle);
        assert!(last.draft.is_empty());
        match &last.effects[..] {
            [Effect::Finalize(draft)] => {
                assert_eq!(draft.weight_kg, Some(80.0));
                assert_eq!(draft.steps, Some(8000));
                assert_eq!(draft.sleep_hours, Some(7.5));
                assert_eq!(draft.calories, Some(2000.0));
                assert_eq!(draft.training, None);
                assert_eq!(draft.mood, None);
                assert_eq!(draft.comments.as_deref(), Some("done"));
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_dialogue_collects_training_and_mood() {
        let (last, effects) = run(&["80", "oops", "8000", "8", "1500", "бег", "good", "skip"]);

        assert!(effects.contains(&Effect::Reprompt(ConversationState::Steps)));
        match &last.effects[..] {
            [Effect::Finalize(draft)] => {
                assert_eq!(draft.training, Some(TrainingType::Running));
                assert_eq!(draft.mood, Some(Mood::Good));
                assert_eq!(draft.comments, None);
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in ConversationState::ALL {
            assert_eq!(state.as_str().parse::<ConversationState>(), Ok(state));
        }
        assert!("lunch".parse::<ConversationState>().is_err());
    }
}
