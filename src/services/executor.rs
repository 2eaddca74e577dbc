use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Utc};
use serde_json::{json, Value};

use crate::models::{param_str, Action, ActionKind, Booking, ExecutionResult, Parameters};
use crate::services::calendar::{generate_ics, InviteEvent};
use crate::services::slots::{BookingError, SlotStore};
use crate::services::system::{OpenTarget, SystemBridge};

/// Refused `system_control` commands and what each would have done.
const GUARDED_COMMANDS: &[(&str, &str)] = &[
    ("shutdown", "To shutdown the system"),
    ("restart", "To restart the system"),
    ("sleep", "To put the system to sleep"),
    ("hibernate", "To hibernate the system"),
];

const DEFAULT_NOTIFICATION_TITLE: &str = "Assistant";

/// Performs confirmed actions. Every failure comes back as an
/// `ExecutionResult` with `success == false`; nothing here returns `Err`.
#[derive(Clone)]
pub struct ActionExecutor {
    slots: SlotStore,
    bridge: Arc<dyn SystemBridge>,
    artifacts_dir: PathBuf,
}

impl ActionExecutor {
    pub fn new(slots: SlotStore, bridge: Arc<dyn SystemBridge>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            slots,
            bridge,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub async fn execute(&self, action: &Action) -> ExecutionResult {
        let params = &action.parameters;
        let result = match action.name {
            ActionKind::BookSlot => self.book_slot(params).await,
            ActionKind::CancelSlot => self.cancel_slot(params),
            ActionKind::QueryAvailableSlots => self.query_available(params),
            ActionKind::QueryUserBookings => self.query_bookings(params),
            ActionKind::SystemOpen => self.system_open(params).await,
            ActionKind::SystemControl => system_control(params),
            ActionKind::SendNotification => self.send_notification(params).await,
            ActionKind::CreateIcs => self.create_ics(params).await,
            ActionKind::ClarifyTime
            | ActionKind::ClarifyCancellation
            | ActionKind::ClarifyQuery
            | ActionKind::ClarifySystem
            | ActionKind::ClarifyIntent => {
                ExecutionResult::failed(format!("{} is a clarification and cannot be executed", action.name))
            }
        };

        tracing::info!(
            action = %action.name,
            success = result.success,
            message = %result.message,
            "action executed"
        );
        result
    }

    /// Entry point for callers holding a bare action name.
    pub async fn execute_named(&self, name: &str, parameters: &Parameters) -> ExecutionResult {
        match ActionKind::parse(name) {
            Some(kind) => self.execute(&Action::new(kind, parameters.clone())).await,
            None => {
                tracing::warn!(action = name, "unknown action requested");
                ExecutionResult::failed(format!("Unknown action: {name}"))
            }
        }
    }

    async fn book_slot(&self, params: &Parameters) -> ExecutionResult {
        let Some(time) = param_str(params, "time") else {
            return ExecutionResult::failed("Time is required for booking");
        };
        let date = date_or_today(params);

        let booking = match self.slots.try_book(&date, time) {
            Ok(booking) => booking,
            Err(e @ (BookingError::Unavailable { .. } | BookingError::InvalidDate { .. })) => {
                return ExecutionResult::failed(e.to_string())
            }
            Err(BookingError::Storage(e)) => {
                tracing::error!(error = %e, date = %date, time, "failed to save booking");
                return ExecutionResult::failed("Failed to save booking");
            }
        };

        // A booking without its invite is rolled back.
        let path = match self.write_invite(&booking).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, booking_id = %booking.booking_id, "invite not written");
                if let Err(e) = self.slots.cancel(&booking.date, Some(&booking.time)) {
                    tracing::error!(error = %e, booking_id = %booking.booking_id, "rollback failed");
                }
                return ExecutionResult::failed("Failed to create calendar invite; booking was not kept");
            }
        };

        ExecutionResult::ok(format!("Successfully booked {time} on {date}"))
            .with_data(json!(booking))
            .with_file(path)
    }

    fn cancel_slot(&self, params: &Parameters) -> ExecutionResult {
        let time = param_str(params, "time");
        let date = date_or_today(params);

        match self.slots.cancel(&date, time) {
            Ok(0) => ExecutionResult::failed(format!(
                "No booking found for {} on {date}",
                time.unwrap_or("any time")
            )),
            Ok(_) => ExecutionResult::ok(format!(
                "Cancelled booking for {} on {date}",
                time.unwrap_or("all slots")
            )),
            Err(e) => {
                tracing::error!(error = %e, date = %date, "failed to cancel booking");
                ExecutionResult::failed("Failed to cancel booking")
            }
        }
    }

    fn query_available(&self, params: &Parameters) -> ExecutionResult {
        let date = date_or_today(params);
        let slots = self.slots.available_slots(&date);
        let message = if slots.is_empty() {
            format!("No available slots for {date}")
        } else {
            format!("Available slots for {date}: {}", slots.join(", "))
        };
        ExecutionResult::ok(message).with_data(json!({ "available_slots": slots, "date": date }))
    }

    fn query_bookings(&self, params: &Parameters) -> ExecutionResult {
        let date = date_or_today(params);
        let bookings = self.slots.bookings(&date);
        let message = if bookings.is_empty() {
            format!("No bookings found for {date}")
        } else {
            let times: Vec<&str> = bookings.iter().map(|b| b.time.as_str()).collect();
            format!("Your bookings for {date}: {}", times.join(", "))
        };
        ExecutionResult::ok(message).with_data(json!({ "bookings": bookings, "date": date }))
    }

    async fn system_open(&self, params: &Parameters) -> ExecutionResult {
        let command = param_str(params, "command").unwrap_or_default();
        let target = param_str(params, "target").unwrap_or_default();

        let Some(resolved) = resolve_open_target(command, target) else {
            return ExecutionResult::failed(format!("Unknown open command: {command}"));
        };
        if let OpenTarget::Path(path) = &resolved {
            if !path.exists() {
                return ExecutionResult::failed(format!(
                    "File or folder not found: {}",
                    path.display()
                ));
            }
        }

        match self.bridge.open(&resolved).await {
            Ok(()) => ExecutionResult::ok(format!("Opened {}", resolved.describe())),
            Err(e) => ExecutionResult::failed(format!("Failed to open {}: {e}", resolved.describe())),
        }
    }

    async fn send_notification(&self, params: &Parameters) -> ExecutionResult {
        let Some(message) = param_str(params, "message") else {
            return ExecutionResult::failed("No message provided for notification");
        };
        let title = param_str(params, "title").unwrap_or(DEFAULT_NOTIFICATION_TITLE);

        match self.bridge.notify(title, message).await {
            Ok(()) => ExecutionResult::ok(format!("Notification sent: {message}")),
            Err(e) => ExecutionResult::failed(format!("Failed to send notification: {e}")),
        }
    }

    async fn create_ics(&self, params: &Parameters) -> ExecutionResult {
        let Some(data) = params.get("booking_data").and_then(Value::as_object) else {
            return ExecutionResult::failed("No booking data provided for ICS creation");
        };
        let (Some(date), Some(time)) = (param_str(data, "date"), param_str(data, "time")) else {
            return ExecutionResult::failed("Booking data needs a date and a time");
        };

        let mut booking = Booking::new(date, time, Utc::now().naive_utc());
        if let Some(id) = param_str(data, "booking_id") {
            booking.booking_id = id.to_string();
        }

        match self.write_invite(&booking).await {
            Ok(path) => ExecutionResult::ok(format!("Created ICS file: {path}")).with_file(path),
            Err(e) => {
                tracing::warn!(error = %e, "ics creation failed");
                ExecutionResult::failed("Failed to create ICS file")
            }
        }
    }

    async fn write_invite(&self, booking: &Booking) -> anyhow::Result<String> {
        let minutes = self.slots.slot_config().slot_duration_minutes;
        let event = InviteEvent::for_booking(booking, minutes)?;
        let path = invite_path(&self.artifacts_dir, &booking.booking_id);

        tokio::fs::create_dir_all(&self.artifacts_dir)
            .await
            .with_context(|| format!("creating {}", self.artifacts_dir.display()))?;
        tokio::fs::write(&path, generate_ics(&event))
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(path.display().to_string())
    }
}

fn system_control(params: &Parameters) -> ExecutionResult {
    let command = param_str(params, "command")
        .unwrap_or_default()
        .to_lowercase();
    match GUARDED_COMMANDS.iter().find(|(name, _)| *name == command) {
        Some((name, what)) => {
            tracing::warn!(command = %name, "refused destructive system command");
            ExecutionResult::ok(format!("For safety, I can't execute {name}. {what}"))
        }
        None => ExecutionResult::failed(format!("Unknown system command: {command}")),
    }
}

fn date_or_today(params: &Parameters) -> String {
    param_str(params, "date")
        .map(str::to_string)
        .unwrap_or_else(|| Local::now().date_naive().to_string())
}

fn invite_path(dir: &Path, booking_id: &str) -> PathBuf {
    dir.join(format!("booking_{booking_id}.ics"))
}

/// Maps an open request onto something the desktop knows how to open.
fn resolve_open_target(command: &str, target: &str) -> Option<OpenTarget> {
    let phrase = format!("{command} {target}").to_lowercase();
    let words: Vec<&str> = phrase
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    let url = target
        .split_whitespace()
        .find(|t| t.starts_with("http://") || t.starts_with("https://") || t.starts_with("www."));

    if url.is_some() || mentions(&["browser", "web"]) {
        return Some(OpenTarget::Browser(url.map(str::to_string)));
    }
    if looks_like_path(target) {
        return Some(OpenTarget::Path(PathBuf::from(target)));
    }
    if mentions(&["calculator", "calc"]) {
        return Some(OpenTarget::Calculator);
    }
    if mentions(&["notepad", "text", "editor"]) {
        return Some(OpenTarget::TextEditor);
    }

    let path = target
        .strip_prefix("file ")
        .or_else(|| target.strip_prefix("folder "))
        .unwrap_or(target)
        .trim();
    (!path.is_empty()).then(|| OpenTarget::Path(PathBuf::from(path)))
}

fn looks_like_path(target: &str) -> bool {
    target.starts_with(['/', '~', '.', '\\']) || target.get(1..3) == Some(":\\")
}
