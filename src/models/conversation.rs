use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::intent::{Entities, IntentKind};

pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub intent: IntentKind,
    pub entities: Entities,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationContext {
    pub user_id: String,
    pub current_intent: IntentKind,
    #[serde(default)]
    pub current_entities: Entities,
    #[serde(default)]
    pub pending_actions: Vec<Action>,
    #[serde(default)]
    pub history: Vec<Turn>,
    pub last_updated: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            current_intent: IntentKind::Unknown,
            current_entities: Entities::default(),
            pending_actions: Vec::new(),
            history: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Appends a turn and drops the oldest ones beyond `HISTORY_LIMIT`.
    pub fn record_turn(&mut self, text: &str, intent: IntentKind, entities: &Entities) {
        self.history.push(Turn {
            timestamp: Utc::now(),
            text: text.to_string(),
            intent,
            entities: entities.clone(),
        });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn last_text(&self) -> &str {
        self.history.last().map(|t| t.text.as_str()).unwrap_or("")
    }
}
