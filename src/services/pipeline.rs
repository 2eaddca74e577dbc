use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::models::{Action, ActionKind, Entities, ExecutionResult, IntentKind, Parameters};
use crate::services::executor::ActionExecutor;
use crate::services::nlu::IntentExtractor;
use crate::services::planner::DecisionPlanner;

pub const APOLOGY: &str = "Sorry, I encountered an error processing your request.";
pub const INTERNAL_ERROR: &str = "internal_error";
const EMPTY_INPUT_REPLY: &str = "Please say something.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProposedAction {
    pub name: ActionKind,
    pub parameters: Parameters,
    pub requires_confirmation: bool,
}

impl From<&Action> for ProposedAction {
    fn from(action: &Action) -> Self {
        Self {
            name: action.name,
            parameters: action.parameters.clone(),
            requires_confirmation: action.requires_confirmation,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionResult {
    pub action_name: ActionKind,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UtteranceOutcome {
    pub reply_text: String,
    pub intent_name: IntentKind,
    pub confidence: f32,
    pub entities: Entities,
    pub proposed_actions: Vec<ProposedAction>,
    pub execution_results: Vec<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UtteranceOutcome {
    fn reply_only(reply_text: &str, error: Option<&str>) -> Self {
        Self {
            reply_text: reply_text.to_string(),
            intent_name: IntentKind::Unknown,
            confidence: 0.0,
            entities: Entities::default(),
            proposed_actions: Vec::new(),
            execution_results: Vec::new(),
            error: error.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfirmOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extractor, planner and executor wired into one call per utterance.
pub struct Assistant {
    extractor: IntentExtractor,
    planner: DecisionPlanner,
    executor: ActionExecutor,
}

impl Assistant {
    pub fn new(extractor: IntentExtractor, planner: DecisionPlanner, executor: ActionExecutor) -> Self {
        Self {
            extractor,
            planner,
            executor,
        }
    }

    pub fn planner(&self) -> &DecisionPlanner {
        &self.planner
    }

    pub async fn handle_utterance(&self, user_id: &str, text: &str, language: &str) -> UtteranceOutcome {
        self.handle_utterance_on(user_id, text, language, Local::now().date_naive())
            .await
    }

    /// Never fails: internal faults become an apology with `internal_error`.
    pub async fn handle_utterance_on(
        &self,
        user_id: &str,
        text: &str,
        language: &str,
        today: NaiveDate,
    ) -> UtteranceOutcome {
        if text.trim().is_empty() {
            return UtteranceOutcome::reply_only(EMPTY_INPUT_REPLY, None);
        }

        match self.run_turn(user_id, text, language, today).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to process utterance");
                UtteranceOutcome::reply_only(APOLOGY, Some(INTERNAL_ERROR))
            }
        }
    }

    async fn run_turn(
        &self,
        user_id: &str,
        text: &str,
        language: &str,
        today: NaiveDate,
    ) -> anyhow::Result<UtteranceOutcome> {
        // Step 1: classify and pull out entities
        let intent = self.extractor.extract_at(text, language, today);
        tracing::info!(
            user_id = %user_id,
            intent = intent.name.as_str(),
            confidence = intent.confidence,
            entities = ?intent.entities,
            "intent extracted"
        );

        // Step 2: plan
        let turn = self
            .planner
            .process_intent_on(user_id, &intent, text, today)
            .await?;

        // Step 3: run whatever needs no confirmation
        let mut execution_results = Vec::new();
        for action in turn.actions.iter().filter(|a| !a.requires_confirmation) {
            execution_results.push(ActionResult {
                action_name: action.name,
                result: self.executor.execute(action).await,
            });
        }

        // Step 4: successful results replace the planner's reply
        let successes: Vec<&str> = execution_results
            .iter()
            .filter(|r| r.result.success)
            .map(|r| r.result.message.as_str())
            .collect();
        let reply_text = if successes.is_empty() {
            turn.reply
        } else {
            successes.join("; ")
        };

        Ok(UtteranceOutcome {
            reply_text,
            intent_name: intent.name,
            confidence: intent.confidence,
            entities: intent.entities,
            proposed_actions: turn.actions.iter().map(ProposedAction::from).collect(),
            execution_results,
            error: None,
        })
    }

    pub async fn confirm(&self, user_id: &str, action_name: &str, confirmed: bool) -> ConfirmOutcome {
        let confirmation = match self.planner.confirm_action(user_id, action_name, confirmed).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to confirm action");
                return ConfirmOutcome {
                    message: APOLOGY.to_string(),
                    executed_result: None,
                    error: Some(INTERNAL_ERROR.to_string()),
                };
            }
        };

        let executed_result = match &confirmation.action {
            Some(action) => Some(self.executor.execute(action).await),
            None => None,
        };
        ConfirmOutcome {
            message: confirmation.message,
            executed_result,
            error: None,
        }
    }

    pub async fn clear_context(&self, user_id: &str) -> anyhow::Result<bool> {
        self.planner.clear_context(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::SlotConfig;
    use crate::services::context_store::{ContextPersistence, ContextStore, SqliteContextPersistence};
    use crate::services::nlu::ExtractionStrategy;
    use crate::services::slots::SlotStore;
    use crate::services::system::{OpenTarget, SystemBridge};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};

    struct NoopBridge;

    #[async_trait]
    impl SystemBridge for NoopBridge {
        async fn open(&self, _target: &OpenTarget) -> anyhow::Result<()> {
            Ok(())
        }

        async fn notify(&self, _title: &str, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Persistence that can be switched into failure mode mid-test.
    #[derive(Default)]
    struct FlakyPersistence {
        failing: Mutex<bool>,
    }

    impl ContextPersistence for FlakyPersistence {
        fn load_all(&self) -> anyhow::Result<Vec<crate::models::ConversationContext>> {
            Ok(Vec::new())
        }

        fn save(&self, _ctx: &crate::models::ConversationContext) -> anyhow::Result<()> {
            if *self.failing.lock().unwrap() {
                anyhow::bail!("disk full");
            }
            Ok(())
        }

        fn delete(&self, _user_id: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        fn delete_idle_since(&self, _cutoff: &DateTime<Utc>) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    fn assistant_with(persistence: Arc<dyn ContextPersistence>) -> (Assistant, SlotStore, tempfile::TempDir) {
        let conn = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        let slots = SlotStore::open(conn, &SlotConfig::with_count("09:00", 6, 30)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(slots.clone(), Arc::new(NoopBridge), dir.path());
        let planner = DecisionPlanner::new(Arc::new(ContextStore::new(persistence, None)));
        let assistant = Assistant::new(IntentExtractor::new(ExtractionStrategy::Rules), planner, executor);
        (assistant, slots, dir)
    }

    fn assistant() -> (Assistant, SlotStore, tempfile::TempDir) {
        let conn = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        assistant_with(Arc::new(SqliteContextPersistence::new(conn)))
    }

    #[tokio::test]
    async fn test_book_tomorrow_end_to_end() {
        let (assistant, slots, _dir) = assistant();
        let outcome = assistant
            .handle_utterance_on("alice", "book a slot tomorrow at 11:00", "en", today())
            .await;

        assert_eq!(outcome.intent_name, IntentKind::Book);
        assert_eq!(outcome.entities.time.as_deref(), Some("11:00"));
        assert_eq!(outcome.entities.date.as_deref(), Some("2024-01-06"));
        assert_eq!(outcome.proposed_actions.len(), 1);
        let proposed = &outcome.proposed_actions[0];
        assert_eq!(proposed.name, ActionKind::BookSlot);
        assert!(proposed.requires_confirmation);
        assert!(outcome.execution_results.is_empty());
        assert!(outcome.reply_text.contains("11:00"));
        assert!(outcome.reply_text.contains("2024-01-06"));

        let confirmed = assistant.confirm("alice", "book_slot", true).await;
        let result = confirmed.executed_result.unwrap();
        assert!(result.success, "{}", result.message);

        let bookings = slots.bookings("2024-01-06");
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].time, "11:00");
        assert!(!slots.available_slots("2024-01-06").contains(&"11:00".to_string()));
    }

    #[tokio::test]
    async fn test_multi_turn_slot_filling() {
        let (assistant, slots, _dir) = assistant();
        let first = assistant
            .handle_utterance_on("bob", "I want to book a slot tomorrow", "en", today())
            .await;
        assert_eq!(first.proposed_actions[0].name, ActionKind::ClarifyTime);

        let second = assistant.handle_utterance_on("bob", "10:30", "en", today()).await;
        assert_eq!(second.intent_name, IntentKind::Unknown);
        assert_eq!(second.proposed_actions[0].name, ActionKind::BookSlot);

        let confirmed = assistant.confirm("bob", "book_slot", true).await;
        assert!(confirmed.executed_result.unwrap().success);
        assert_eq!(slots.bookings("2024-01-06")[0].time, "10:30");
    }

    #[tokio::test]
    async fn test_inflected_cancel_does_not_fill_pending_booking() {
        let (assistant, _, _dir) = assistant();
        assistant
            .handle_utterance_on("bob", "book a slot tomorrow", "en", today())
            .await;

        let outcome = assistant
            .handle_utterance_on("bob", "cancelling, 10am", "en", today())
            .await;
        assert_eq!(outcome.intent_name, IntentKind::Cancel);
        assert_eq!(outcome.proposed_actions.len(), 1);
        assert_eq!(outcome.proposed_actions[0].name, ActionKind::CancelSlot);

        let ctx = assistant.planner().context("bob").await.unwrap();
        assert!(ctx
            .pending_actions
            .iter()
            .all(|a| a.name != ActionKind::BookSlot));
    }

    #[tokio::test]
    async fn test_query_runs_immediately_and_replaces_reply() {
        let (assistant, _, _dir) = assistant();
        let outcome = assistant
            .handle_utterance_on("carol", "show available slots today", "en", today())
            .await;
        assert_eq!(outcome.execution_results.len(), 1);
        assert!(outcome.execution_results[0].result.success);
        assert_eq!(
            outcome.reply_text,
            "Available slots for 2024-01-05: 09:00, 09:30, 10:00, 10:30, 11:00, 11:30"
        );
    }

    #[tokio::test]
    async fn test_empty_text_plans_nothing() {
        let (assistant, _, _dir) = assistant();
        let outcome = assistant.handle_utterance_on("dave", "   ", "en", today()).await;
        assert_eq!(outcome.reply_text, "Please say something.");
        assert!(outcome.proposed_actions.is_empty());
        assert!(assistant.planner().context("dave").await.is_none());
    }

    #[tokio::test]
    async fn test_storage_fault_becomes_apology_and_session_survives() {
        let persistence = Arc::new(FlakyPersistence::default());
        let (assistant, _, _dir) = assistant_with(persistence.clone());

        *persistence.failing.lock().unwrap() = true;
        let failed = assistant.handle_utterance_on("erin", "hello", "en", today()).await;
        assert_eq!(failed.reply_text, APOLOGY);
        assert_eq!(failed.error.as_deref(), Some(INTERNAL_ERROR));

        *persistence.failing.lock().unwrap() = false;
        let retried = assistant.handle_utterance_on("erin", "hello", "en", today()).await;
        assert!(retried.error.is_none());
        assert_eq!(retried.intent_name, IntentKind::Greet);
    }

    #[tokio::test]
    async fn test_confirm_rejection_executes_nothing() {
        let (assistant, slots, _dir) = assistant();
        assistant
            .handle_utterance_on("frank", "book 09:00 today", "en", today())
            .await;
        let outcome = assistant.confirm("frank", "book_slot", false).await;
        assert!(outcome.executed_result.is_none());
        assert!(slots.bookings("2024-01-05").is_empty());
    }
}
