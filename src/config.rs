use std::env;

use crate::models::SlotConfig;
use crate::services::nlu::ExtractionStrategy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub artifacts_dir: String,
    pub slot_start: String,
    pub slot_count: Option<u32>,
    pub slot_end: String,
    pub slot_minutes: u32,
    pub extraction_strategy: ExtractionStrategy,
    /// 0 keeps contexts forever.
    pub context_retention_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotkeeper.db".to_string()),
            artifacts_dir: env::var("ARTIFACTS_DIR").unwrap_or_else(|_| "data/invites".to_string()),
            slot_start: env::var("SLOT_START").unwrap_or_else(|_| "09:00".to_string()),
            slot_count: env::var("SLOT_COUNT").ok().and_then(|v| v.parse().ok()),
            slot_end: env::var("SLOT_END").unwrap_or_else(|_| "17:00".to_string()),
            slot_minutes: env::var("SLOT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            extraction_strategy: env::var("EXTRACTION_STRATEGY")
                .map(|v| ExtractionStrategy::parse(&v))
                .unwrap_or_default(),
            context_retention_hours: env::var("CONTEXT_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(720),
        }
    }

    /// Slot grid written on first start. An invalid env combination falls
    /// back to the stock 09:00-17:00 grid.
    pub fn seed_slot_config(&self) -> SlotConfig {
        let config = SlotConfig {
            start_time: self.slot_start.clone(),
            slot_count: self.slot_count,
            end_time: Some(self.slot_end.clone()),
            slot_duration_minutes: self.slot_minutes,
        };
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(error = %e, "invalid slot settings in environment, using defaults");
                SlotConfig::default()
            }
        }
    }

    pub fn context_retention(&self) -> Option<chrono::Duration> {
        match self.context_retention_hours {
            0 => None,
            hours => i64::try_from(hours).ok().map(chrono::Duration::hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            port: 3000,
            database_url: ":memory:".to_string(),
            artifacts_dir: "invites".to_string(),
            slot_start: "09:00".to_string(),
            slot_count: None,
            slot_end: "17:00".to_string(),
            slot_minutes: 30,
            extraction_strategy: ExtractionStrategy::Rules,
            context_retention_hours: 720,
        }
    }

    #[test]
    fn test_seed_falls_back_on_bad_start() {
        let bad = AppConfig {
            slot_start: "9 o'clock".to_string(),
            ..config()
        };
        assert_eq!(bad.seed_slot_config(), SlotConfig::default());
    }

    #[test]
    fn test_slot_count_carried_into_seed() {
        let counted = AppConfig {
            slot_count: Some(6),
            ..config()
        };
        assert_eq!(counted.seed_slot_config().grid().len(), 6);
    }

    #[test]
    fn test_zero_retention_disables_eviction() {
        let forever = AppConfig {
            context_retention_hours: 0,
            ..config()
        };
        assert!(forever.context_retention().is_none());
        assert_eq!(config().context_retention(), Some(chrono::Duration::hours(720)));
    }
}
