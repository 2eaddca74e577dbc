use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub date: String,
    pub time: String,
    pub booking_id: String,
    pub booked_at: NaiveDateTime,
}

impl Booking {
    pub fn new(date: &str, time: &str, booked_at: NaiveDateTime) -> Self {
        Self {
            date: date.to_string(),
            time: time.to_string(),
            booking_id: booking_id(date, time),
            booked_at,
        }
    }
}

/// `2024-01-05` + `11:00` → `2024-01-05_1100`.
pub fn booking_id(date: &str, time: &str) -> String {
    format!("{date}_{}", time.replace(':', ""))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}
