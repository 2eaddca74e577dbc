pub mod action;
pub mod booking;
pub mod conversation;
pub mod execution;
pub mod intent;
pub mod slot_config;

pub use action::{param_str, params, Action, ActionKind, Parameters};
pub use booking::{BookOutcome, Booking};
pub use conversation::{ConversationContext, Turn, HISTORY_LIMIT};
pub use execution::ExecutionResult;
pub use intent::{Entities, Intent, IntentKind};
pub use slot_config::SlotConfig;
