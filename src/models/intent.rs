use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Book,
    Cancel,
    Greet,
    Query,
    System,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Book => "book",
            IntentKind::Cancel => "cancel",
            IntentKind::Greet => "greet",
            IntentKind::Query => "query",
            IntentKind::System => "system",
            IntentKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "book" => IntentKind::Book,
            "cancel" => IntentKind::Cancel,
            "greet" => IntentKind::Greet,
            "query" => IntentKind::Query,
            "system" => IntentKind::System,
            _ => IntentKind::Unknown,
        }
    }
}

/// Typed values pulled out of an utterance. A missing entity is `None` and
/// is left out of the serialized mapping entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entities {
    /// "HH:MM", 24-hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// "YYYY-MM-DD".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.date.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub name: IntentKind,
    pub entities: Entities,
    pub confidence: f32,
}

impl Intent {
    pub fn unknown(entities: Entities) -> Self {
        Self {
            name: IntentKind::Unknown,
            entities,
            confidence: 0.0,
        }
    }
}
