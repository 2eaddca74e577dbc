use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Parameters = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BookSlot,
    CancelSlot,
    QueryAvailableSlots,
    QueryUserBookings,
    SystemOpen,
    SystemControl,
    SendNotification,
    CreateIcs,
    ClarifyTime,
    ClarifyCancellation,
    ClarifyQuery,
    ClarifySystem,
    ClarifyIntent,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::BookSlot => "book_slot",
            ActionKind::CancelSlot => "cancel_slot",
            ActionKind::QueryAvailableSlots => "query_available_slots",
            ActionKind::QueryUserBookings => "query_user_bookings",
            ActionKind::SystemOpen => "system_open",
            ActionKind::SystemControl => "system_control",
            ActionKind::SendNotification => "send_notification",
            ActionKind::CreateIcs => "create_ics",
            ActionKind::ClarifyTime => "clarify_time",
            ActionKind::ClarifyCancellation => "clarify_cancellation",
            ActionKind::ClarifyQuery => "clarify_query",
            ActionKind::ClarifySystem => "clarify_system",
            ActionKind::ClarifyIntent => "clarify_intent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "book_slot" => ActionKind::BookSlot,
            "cancel_slot" => ActionKind::CancelSlot,
            "query_available_slots" => ActionKind::QueryAvailableSlots,
            "query_user_bookings" => ActionKind::QueryUserBookings,
            "system_open" => ActionKind::SystemOpen,
            "system_control" => ActionKind::SystemControl,
            "send_notification" => ActionKind::SendNotification,
            "create_ics" => ActionKind::CreateIcs,
            "clarify_time" => ActionKind::ClarifyTime,
            "clarify_cancellation" => ActionKind::ClarifyCancellation,
            "clarify_query" => ActionKind::ClarifyQuery,
            "clarify_system" => ActionKind::ClarifySystem,
            "clarify_intent" => ActionKind::ClarifyIntent,
            _ => return None,
        };
        Some(kind)
    }

    /// Clarification placeholders hold a turn open; they never reach the executor
    /// as real work.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            ActionKind::ClarifyTime
                | ActionKind::ClarifyCancellation
                | ActionKind::ClarifyQuery
                | ActionKind::ClarifySystem
                | ActionKind::ClarifyIntent
        )
    }

    /// Pending actions a follow-up time/date may be merged into.
    pub fn accepts_slot_fill(&self) -> bool {
        matches!(self, ActionKind::BookSlot | ActionKind::ClarifyTime)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub name: ActionKind,
    pub parameters: Parameters,
    pub requires_confirmation: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    1
}

impl Action {
    pub fn new(name: ActionKind, parameters: Parameters) -> Self {
        Self {
            name,
            parameters,
            requires_confirmation: false,
            priority: default_priority(),
        }
    }

    pub fn confirmed_first(name: ActionKind, parameters: Parameters) -> Self {
        Self {
            requires_confirmation: true,
            ..Self::new(name, parameters)
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        param_str(&self.parameters, key)
    }
}

/// Reads a non-empty string parameter; JSON null and "" count as absent.
pub fn param_str<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Builds a parameter map from key/value pairs.
pub fn params<I, K>(pairs: I) -> Parameters
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
