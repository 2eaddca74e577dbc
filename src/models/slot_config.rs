use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

const DEFAULT_START: &str = "09:00";
const DEFAULT_END: &str = "17:00";
const DEFAULT_STEP_MINUTES: u32 = 30;

/// Template for a single day's slot grid. Every date shares the same grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotConfig {
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default = "default_step")]
    pub slot_duration_minutes: u32,
}

fn default_step() -> u32 {
    DEFAULT_STEP_MINUTES
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            start_time: DEFAULT_START.to_string(),
            slot_count: None,
            end_time: Some(DEFAULT_END.to_string()),
            slot_duration_minutes: DEFAULT_STEP_MINUTES,
        }
    }
}

impl SlotConfig {
    pub fn with_count(start_time: &str, slot_count: u32, slot_duration_minutes: u32) -> Self {
        Self {
            start_time: start_time.to_string(),
            slot_count: Some(slot_count),
            end_time: None,
            slot_duration_minutes,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        parse_time(&self.start_time)?;
        if let Some(end) = &self.end_time {
            parse_time(end)?;
        }
        if self.slot_count.is_none() && self.end_time.is_none() {
            anyhow::bail!("slot config needs slot_count or end_time");
        }
        if self.slot_duration_minutes == 0 {
            anyhow::bail!("slot_duration_minutes must be positive");
        }
        Ok(())
    }

    /// Every slot of the day in grid order. `slot_count` wins over `end_time`
    /// when both are set; the grid never wraps past midnight.
    pub fn grid(&self) -> Vec<String> {
        let Ok(start) = parse_time(&self.start_time) else {
            return Vec::new();
        };
        if self.slot_duration_minutes == 0 {
            return Vec::new();
        }
        let step = self.slot_duration_minutes;
        let start_min = minutes_of(start);

        let mut out = Vec::new();
        match (self.slot_count, self.end_time.as_deref().map(parse_time)) {
            (Some(count), _) => {
                for i in 0..count {
                    let m = start_min + i * step;
                    if m >= 24 * 60 {
                        break;
                    }
                    out.push(format_minutes(m));
                }
            }
            (None, Some(Ok(end))) => {
                let end_min = minutes_of(end);
                let mut m = start_min;
                while m < end_min {
                    out.push(format_minutes(m));
                    m += step;
                }
            }
            (None, _) => {}
        }
        out
    }
}

fn minutes_of(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

fn format_minutes(m: u32) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("invalid time format: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_grid() {
        let config = SlotConfig::with_count("09:00", 6, 30);
        assert_eq!(
            config.grid(),
            vec!["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]
        );
    }

    #[test]
    fn test_end_time_grid_excludes_end() {
        let config = SlotConfig {
            start_time: "09:00".to_string(),
            slot_count: None,
            end_time: Some("10:30".to_string()),
            slot_duration_minutes: 30,
        };
        assert_eq!(config.grid(), vec!["09:00", "09:30", "10:00"]);
    }

    #[test]
    fn test_default_grid_covers_working_day() {
        let grid = SlotConfig::default().grid();
        assert_eq!(grid.len(), 16);
        assert_eq!(grid.first().map(String::as_str), Some("09:00"));
        assert_eq!(grid.last().map(String::as_str), Some("16:30"));
    }

    #[test]
    fn test_grid_stops_at_midnight() {
        let config = SlotConfig::with_count("23:00", 5, 30);
        assert_eq!(config.grid(), vec!["23:00", "23:30"]);
    }

    #[test]
    fn test_validate_rejects_bad_start() {
        let parsed = |s: &str| serde_json::from_str::<SlotConfig>(s).unwrap();
        assert!(parsed(r#"{"start_time":"25:00","slot_count":3}"#).validate().is_err());
        assert!(parsed(r#"{"start_time":"08:00"}"#).validate().is_err());
        let ok = parsed(r#"{"start_time":"08:00","slot_count":3}"#);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.slot_duration_minutes, 30);
    }
}
