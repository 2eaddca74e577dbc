use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::models::{
    param_str, params, Action, ActionKind, ConversationContext, Entities, Intent, IntentKind,
    Parameters,
};
use crate::services::context_store::ContextStore;

const INTRODUCTION: &str = "Hello! I'm your booking assistant. I can book or cancel slots, \
     show what's available and open a few things on this machine. How can I help?";
const GREETING_AGAIN: &str = "Hello again! How can I assist you today?";
const FALLBACK_REPLY: &str = "I'm not sure what you'd like to do. You can book or cancel a slot, \
     ask what's available, or ask me to open something.";

const DESTRUCTIVE_COMMANDS: &[&str] = &["shutdown", "restart", "sleep", "hibernate"];
const OPEN_VERBS: &[&str] = &["open", "launch", "start", "run", "execute"];
const AVAILABILITY_WORDS: &[&str] = &["available", "free", "open", "slots"];
const BOOKINGS_WORDS: &[&str] = &["booking", "bookings", "booked", "my"];

/// What one planning rule decided for a turn.
#[derive(Debug)]
enum Proposal {
    Append(Vec<Action>),
    /// Replace the pending action at `index`; nothing is appended.
    Merge { index: usize, action: Action },
}

#[derive(Debug)]
struct Plan {
    proposal: Proposal,
    reply: String,
}

impl Plan {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::Append(Vec::new()),
            reply: reply.into(),
        }
    }

    fn single(action: Action, reply: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::Append(vec![action]),
            reply: reply.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTurn {
    pub actions: Vec<Action>,
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub message: String,
    /// Present only when the user confirmed; the caller executes it.
    pub action: Option<Action>,
}

impl Confirmation {
    fn declined(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action: None,
        }
    }
}

/// Owns conversational memory and turns intents into proposed actions.
/// Never executes anything itself.
#[derive(Clone)]
pub struct DecisionPlanner {
    contexts: Arc<ContextStore>,
}

impl DecisionPlanner {
    pub fn new(contexts: Arc<ContextStore>) -> Self {
        Self { contexts }
    }

    pub fn contexts(&self) -> &Arc<ContextStore> {
        &self.contexts
    }

    pub async fn process_intent(
        &self,
        user_id: &str,
        intent: &Intent,
        raw_text: &str,
    ) -> anyhow::Result<PlannedTurn> {
        self.process_intent_on(user_id, intent, raw_text, Local::now().date_naive())
            .await
    }

    /// Same as `process_intent` with "today" pinned, so relative defaults are testable.
    pub async fn process_intent_on(
        &self,
        user_id: &str,
        intent: &Intent,
        raw_text: &str,
        today: NaiveDate,
    ) -> anyhow::Result<PlannedTurn> {
        let mut ctx = self.contexts.lock(user_id).await;

        ctx.record_turn(raw_text, intent.name, &intent.entities);

        let plan = match intent.name {
            IntentKind::Book => plan_booking(&intent.entities, today),
            IntentKind::Cancel => plan_cancellation(&intent.entities, today),
            IntentKind::Query => plan_query(raw_text, &intent.entities, today),
            IntentKind::System => plan_system(raw_text),
            IntentKind::Greet => plan_greeting(&ctx),
            IntentKind::Unknown => plan_fallback(&ctx, &intent.entities, today),
        };

        tracing::info!(
            user_id = %user_id,
            intent = intent.name.as_str(),
            confidence = intent.confidence,
            pending = ctx.pending_actions.len(),
            "planning turn"
        );

        let actions = match plan.proposal {
            Proposal::Append(actions) => {
                ctx.current_intent = intent.name;
                // Actions without a confirmation gate run right away and are never pending.
                for action in actions.iter().filter(|a| a.requires_confirmation) {
                    queue_pending(&mut ctx.pending_actions, action.clone());
                }
                actions
            }
            Proposal::Merge { index, action } => {
                tracing::debug!(user_id = %user_id, index, action = %action.name, "merged follow-up into pending action");
                ctx.current_intent = IntentKind::Book;
                ctx.pending_actions[index] = action.clone();
                vec![action]
            }
        };
        ctx.current_entities = intent.entities.clone();
        ctx.last_updated = Utc::now();

        self.contexts.persist(&ctx)?;

        Ok(PlannedTurn {
            actions,
            reply: plan.reply,
        })
    }

    pub async fn confirm_action(
        &self,
        user_id: &str,
        action_name: &str,
        confirmed: bool,
    ) -> anyhow::Result<Confirmation> {
        let Some(mut ctx) = self.contexts.lock_existing(user_id).await else {
            return Ok(Confirmation::declined("I don't have any pending actions for you."));
        };

        let position = ActionKind::parse(action_name).and_then(|kind| {
            ctx.pending_actions
                .iter()
                .position(|a| a.name == kind && a.requires_confirmation)
        });
        let Some(position) = position else {
            return Ok(Confirmation::declined(
                "I don't have that action pending for confirmation.",
            ));
        };

        let action = ctx.pending_actions.remove(position);
        let result = if confirmed {
            ctx.pending_actions.retain(|a| a.name != action.name);
            Confirmation {
                message: format!("Confirmed! Executing {}.", action.name),
                action: Some(action),
            }
        } else {
            Confirmation::declined("Action cancelled. How else can I help you?")
        };
        ctx.last_updated = Utc::now();

        tracing::info!(user_id = %user_id, action = action_name, confirmed, "confirmation handled");
        self.contexts.persist(&ctx)?;
        Ok(result)
    }

    pub async fn clear_context(&self, user_id: &str) -> anyhow::Result<bool> {
        self.contexts.delete(user_id).await
    }

    pub async fn context(&self, user_id: &str) -> Option<ConversationContext> {
        self.contexts.get(user_id).await
    }
}

fn plan_booking(entities: &Entities, today: NaiveDate) -> Plan {
    let today = today.to_string();
    match (&entities.time, &entities.date) {
        (None, None) => Plan::single(
            Action::confirmed_first(ActionKind::ClarifyTime, params([("missing", json!("time"))])),
            "I'd be happy to book a slot for you. What time would you prefer?",
        ),
        (None, Some(date)) => Plan::single(
            Action::confirmed_first(
                ActionKind::ClarifyTime,
                params([("missing", json!("time")), ("date", json!(date))]),
            ),
            format!("Great! I can book a slot on {date}. What time would you like?"),
        ),
        (Some(time), None) => Plan::single(
            Action::confirmed_first(
                ActionKind::BookSlot,
                params([("time", json!(time)), ("date", json!(today))]),
            ),
            format!("Perfect! I'll book {time} for today ({today}). Should I proceed?"),
        ),
        (Some(time), Some(date)) => Plan::single(
            Action::confirmed_first(
                ActionKind::BookSlot,
                params([("time", json!(time)), ("date", json!(date))]),
            ),
            format!("Excellent! I'll book {time} on {date}. Should I proceed?"),
        ),
    }
}

fn plan_cancellation(entities: &Entities, today: NaiveDate) -> Plan {
    if entities.is_empty() {
        return Plan::single(
            Action::confirmed_first(
                ActionKind::ClarifyCancellation,
                params([("missing", json!(["time", "date"]))]),
            ),
            "Which booking should I cancel? Tell me the date and, if you like, the time.",
        );
    }

    let date = entities.date.clone().unwrap_or_else(|| today.to_string());
    let time = entities.time.as_deref().map_or(Value::Null, |t| json!(t));
    let reply = match &entities.time {
        Some(t) => format!("I'll cancel your booking at {t} on {date}. Should I proceed?"),
        None => format!("I'll cancel all your bookings on {date}. Should I proceed?"),
    };
    Plan::single(
        Action::confirmed_first(
            ActionKind::CancelSlot,
            params([("time", time), ("date", json!(date))]),
        ),
        reply,
    )
}

fn plan_query(raw_text: &str, entities: &Entities, today: NaiveDate) -> Plan {
    let words = words(raw_text);
    let date = entities.date.clone().unwrap_or_else(|| today.to_string());

    if contains_any(&words, AVAILABILITY_WORDS) {
        return Plan::single(
            Action::new(ActionKind::QueryAvailableSlots, params([("date", json!(date))])),
            format!("Let me check the available slots for {date}."),
        );
    }
    if contains_any(&words, BOOKINGS_WORDS) {
        return Plan::single(
            Action::new(ActionKind::QueryUserBookings, params([("date", json!(date))])),
            format!("Let me look up the bookings for {date}."),
        );
    }
    Plan::single(
        Action::confirmed_first(ActionKind::ClarifyQuery, params([("date", json!(date))])),
        "What would you like to know? I can show available slots or existing bookings.",
    )
}

fn plan_system(raw_text: &str) -> Plan {
    let words = words(raw_text);

    let destructive = DESTRUCTIVE_COMMANDS
        .iter()
        .copied()
        .find(|c| words.iter().any(|w| w == c));
    if let Some(command) = destructive {
        return Plan::single(
            Action::confirmed_first(ActionKind::SystemControl, params([("command", json!(command))])),
            format!("You asked for a system {command}. Should I proceed?"),
        );
    }

    if let Some((verb, target)) = open_request(raw_text) {
        if target.is_empty() {
            return Plan::single(
                Action::confirmed_first(ActionKind::ClarifySystem, params([("command", json!(verb))])),
                "What would you like me to open?",
            );
        }
        return Plan::single(
            Action::confirmed_first(
                ActionKind::SystemOpen,
                params([("command", json!(verb)), ("target", json!(target))]),
            ),
            format!("I'll open {target}. Should I proceed?"),
        );
    }

    Plan::single(
        Action::confirmed_first(ActionKind::ClarifySystem, Parameters::new()),
        "I can help with system commands. What would you like me to do?",
    )
}

fn plan_greeting(ctx: &ConversationContext) -> Plan {
    if ctx.history.len() > 1 {
        Plan::reply(GREETING_AGAIN)
    } else {
        Plan::reply(INTRODUCTION)
    }
}

/// Slot filling: an unresolved turn that carries a time or date completes
/// the first pending booking action instead of starting something new.
fn plan_fallback(ctx: &ConversationContext, entities: &Entities, today: NaiveDate) -> Plan {
    if ctx.current_intent == IntentKind::Book && !entities.is_empty() {
        let index = ctx
            .pending_actions
            .iter()
            .position(|a| a.name.accepts_slot_fill());
        if let Some(index) = index {
            let merged = merge_slot_fill(&ctx.pending_actions[index], entities, today);
            let reply = match (merged.param_str("time"), merged.param_str("date")) {
                (Some(time), Some(date)) => {
                    format!("Got it! I'll book {time} on {date}. Should I proceed?")
                }
                (_, Some(date)) => format!("Got it, {date}. What time would you like?"),
                _ => "Got it. What time would you like?".to_string(),
            };
            return Plan {
                proposal: Proposal::Merge {
                    index,
                    action: merged,
                },
                reply,
            };
        }
    }

    Plan::single(
        Action::confirmed_first(
            ActionKind::ClarifyIntent,
            params([("text", json!(ctx.last_text()))]),
        ),
        FALLBACK_REPLY,
    )
}

/// Builds a fresh action from the pending one plus the new entities.
fn merge_slot_fill(pending: &Action, entities: &Entities, today: NaiveDate) -> Action {
    let mut parameters = pending.parameters.clone();
    parameters.remove("missing");
    if let Some(time) = &entities.time {
        parameters.insert("time".to_string(), json!(time));
    }
    if let Some(date) = &entities.date {
        parameters.insert("date".to_string(), json!(date));
    }

    let has_time = param_str(&parameters, "time").is_some();
    let name = if has_time {
        if param_str(&parameters, "date").is_none() {
            parameters.insert("date".to_string(), json!(today.to_string()));
        }
        ActionKind::BookSlot
    } else {
        parameters.insert("missing".to_string(), json!("time"));
        ActionKind::ClarifyTime
    };

    Action {
        name,
        parameters,
        requires_confirmation: true,
        priority: pending.priority,
    }
}

/// Finds the first open-style verb and returns it with the rest of the
/// utterance, original casing kept for paths.
fn open_request(raw_text: &str) -> Option<(&'static str, String)> {
    let lowered = raw_text.to_ascii_lowercase();
    let mut offset = 0;
    for word in lowered.split_whitespace() {
        let start = offset + lowered[offset..].find(word)?;
        offset = start + word.len();
        let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if let Some(verb) = OPEN_VERBS.iter().find(|v| **v == bare) {
            let target = raw_text[offset..]
                .trim()
                .trim_end_matches(['.', '!', '?'])
                .trim();
            return Some((*verb, target.to_string()));
        }
    }
    None
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_any(words: &[String], candidates: &[&str]) -> bool {
    words.iter().any(|w| candidates.contains(&w.as_str()))
}

/// A repeated clarification replaces the one already waiting rather than
/// stacking up behind it.
fn queue_pending(pending: &mut Vec<Action>, action: Action) {
    if action.name.is_placeholder() {
        if let Some(slot) = pending.iter_mut().find(|p| p.name == action.name) {
            *slot = action;
            return;
        }
    }
    pending.push(action);
}
