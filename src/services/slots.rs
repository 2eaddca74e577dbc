use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{BookOutcome, Booking, SlotConfig};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Slot {time} is not available on {date}")]
    Unavailable { date: String, time: String },

    #[error("{date} is not a valid date")]
    InvalidDate { date: String },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Owns the slot template and the booking calendar.
///
/// Writers go through the single connection lock, so the availability check
/// and the insert in `book_specific` cannot interleave with another booking.
#[derive(Clone)]
pub struct SlotStore {
    db: Arc<Mutex<Connection>>,
}

impl SlotStore {
    /// Seeds the slot config record with `seed` when none is stored yet.
    pub fn open(db: Arc<Mutex<Connection>>, seed: &SlotConfig) -> anyhow::Result<Self> {
        let store = Self { db };
        {
            let conn = store.conn();
            if queries::get_slot_config(&conn).ok().flatten().is_none() {
                queries::save_slot_config(&conn, seed)?;
                tracing::info!(start = %seed.start_time, "seeded slot config");
            }
        }
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slot_config(&self) -> SlotConfig {
        load_config(&self.conn())
    }

    pub fn available_slots(&self, date: &str) -> Vec<String> {
        let conn = self.conn();
        available_in(&conn, &load_config(&conn), date)
    }

    pub fn bookings(&self, date: &str) -> Vec<Booking> {
        load_bookings(&self.conn(), date)
    }

    pub fn book_specific(&self, date: &str, time: &str) -> BookOutcome {
        match self.try_book(date, time.trim()) {
            Ok(booking) => BookOutcome {
                success: true,
                message: format!("Booked {} successfully.", booking.time),
                booking: Some(booking),
            },
            Err(BookingError::Storage(e)) => {
                tracing::error!(error = %e, date, time, "failed to save booking");
                BookOutcome {
                    success: false,
                    message: "Failed to save booking".to_string(),
                    booking: None,
                }
            }
            Err(e) => BookOutcome {
                success: false,
                message: e.to_string(),
                booking: None,
            },
        }
    }

    /// Check-then-insert under one lock hold and one transaction.
    pub fn try_book(&self, date: &str, time: &str) -> Result<Booking, BookingError> {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(BookingError::InvalidDate {
                date: date.to_string(),
            });
        }

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(anyhow::Error::from)?;

        let config = load_config(&tx);
        if !available_in(&tx, &config, date).iter().any(|s| s == time) {
            return Err(BookingError::Unavailable {
                date: date.to_string(),
                time: time.to_string(),
            });
        }

        let booking = Booking::new(date, time, Utc::now().naive_utc());
        if !queries::insert_booking(&tx, &booking)? {
            return Err(BookingError::Unavailable {
                date: date.to_string(),
                time: time.to_string(),
            });
        }
        tx.commit().map_err(anyhow::Error::from)?;

        tracing::info!(booking_id = %booking.booking_id, "booking recorded");
        Ok(booking)
    }

    /// Removes the booking at `time`, or the whole day when `time` is `None`.
    pub fn cancel(&self, date: &str, time: Option<&str>) -> anyhow::Result<usize> {
        let removed = queries::delete_bookings(&self.conn(), date, time)?;
        if removed > 0 {
            tracing::info!(date, time, removed, "bookings cancelled");
        }
        Ok(removed)
    }
}

fn load_config(conn: &Connection) -> SlotConfig {
    match queries::get_slot_config(conn) {
        Ok(Some(config)) if config.validate().is_ok() => config,
        Ok(Some(_)) => {
            tracing::warn!("stored slot config is invalid, using default");
            SlotConfig::default()
        }
        Ok(None) => SlotConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "slot config unreadable, using default");
            SlotConfig::default()
        }
    }
}

fn load_bookings(conn: &Connection, date: &str) -> Vec<Booking> {
    queries::get_bookings_for_date(conn, date).unwrap_or_else(|e| {
        tracing::warn!(error = %e, date, "bookings unreadable, treating day as empty");
        Vec::new()
    })
}

/// Grid order minus the times already booked on `date`.
fn available_in(conn: &Connection, config: &SlotConfig, date: &str) -> Vec<String> {
    let booked: HashSet<String> = load_bookings(conn, date)
        .into_iter()
        .map(|b| b.time)
        .collect();
    config
        .grid()
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .collect()
}
