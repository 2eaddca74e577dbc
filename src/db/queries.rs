use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, ConversationContext, SlotConfig};

const BOOKED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Slot config ──

pub fn get_slot_config(conn: &Connection) -> anyhow::Result<Option<SlotConfig>> {
    let config = conn
        .query_row(
            "SELECT start_time, slot_count, end_time, slot_duration_minutes FROM slot_config WHERE id = 1",
            [],
            |row| {
                Ok(SlotConfig {
                    start_time: row.get(0)?,
                    slot_count: row.get(1)?,
                    end_time: row.get(2)?,
                    slot_duration_minutes: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(config)
}

pub fn save_slot_config(conn: &Connection, config: &SlotConfig) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO slot_config (id, start_time, slot_count, end_time, slot_duration_minutes)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           start_time = excluded.start_time,
           slot_count = excluded.slot_count,
           end_time = excluded.end_time,
           slot_duration_minutes = excluded.slot_duration_minutes",
        params![
            config.start_time,
            config.slot_count,
            config.end_time,
            config.slot_duration_minutes,
        ],
    )?;
    Ok(())
}

// ── Bookings ──

/// Bookings for one date in the order they were made.
pub fn get_bookings_for_date(conn: &Connection, date: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT date, time, booking_id, booked_at FROM bookings WHERE date = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![date], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// Returns false when the (date, time) pair is already taken.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let booked_at = booking.booked_at.format(BOOKED_AT_FORMAT).to_string();
    let count = conn.execute(
        "INSERT OR IGNORE INTO bookings (date, time, booking_id, booked_at) VALUES (?1, ?2, ?3, ?4)",
        params![booking.date, booking.time, booking.booking_id, booked_at],
    )?;
    Ok(count == 1)
}

/// Deletes one booking, or every booking on the date when `time` is `None`.
pub fn delete_bookings(conn: &Connection, date: &str, time: Option<&str>) -> anyhow::Result<usize> {
    let count = match time {
        Some(time) => conn.execute(
            "DELETE FROM bookings WHERE date = ?1 AND time = ?2",
            params![date, time],
        )?,
        None => conn.execute("DELETE FROM bookings WHERE date = ?1", params![date])?,
    };
    Ok(count)
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let booked_at_str: String = row.get(3)?;
    let booked_at = NaiveDateTime::parse_from_str(&booked_at_str, BOOKED_AT_FORMAT)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, booked_at = %booked_at_str, "unreadable booked_at, using now");
            Utc::now().naive_utc()
        });

    Ok(Booking {
        date: row.get(0)?,
        time: row.get(1)?,
        booking_id: row.get(2)?,
        booked_at,
    })
}

// ── Conversation contexts ──

pub fn save_context(conn: &Connection, ctx: &ConversationContext) -> anyhow::Result<()> {
    let data = serde_json::to_string(ctx)?;
    conn.execute(
        "INSERT INTO conversation_contexts (user_id, data, last_updated)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
           data = excluded.data,
           last_updated = excluded.last_updated",
        params![ctx.user_id, data, sortable_timestamp(&ctx.last_updated)],
    )?;
    Ok(())
}

/// Every stored context. Records that fail to decode come back as errors so the
/// caller can skip them individually.
pub fn load_contexts(
    conn: &Connection,
) -> anyhow::Result<Vec<(String, anyhow::Result<ConversationContext>)>> {
    let mut stmt =
        conn.prepare("SELECT user_id, data FROM conversation_contexts ORDER BY user_id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut contexts = vec![];
    for row in rows {
        let (user_id, data) = row?;
        let parsed: anyhow::Result<ConversationContext> =
            serde_json::from_str(&data).map_err(Into::into);
        contexts.push((user_id, parsed));
    }
    Ok(contexts)
}

pub fn delete_context(conn: &Connection, user_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM conversation_contexts WHERE user_id = ?1",
        params![user_id],
    )?;
    Ok(count > 0)
}

pub fn delete_contexts_before(conn: &Connection, cutoff: &DateTime<Utc>) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM conversation_contexts WHERE last_updated < ?1",
        params![sortable_timestamp(cutoff)],
    )?;
    Ok(count)
}

/// Fixed-width UTC text so lexical order matches time order.
fn sortable_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn booking(date: &str, time: &str) -> Booking {
        Booking::new(date, time, Utc::now().naive_utc())
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = setup_db();
        db::migrations::run_migrations(&conn).unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_slot_config_upsert() {
        let conn = setup_db();
        assert!(get_slot_config(&conn).unwrap().is_none());

        save_slot_config(&conn, &SlotConfig::with_count("09:00", 6, 30)).unwrap();
        save_slot_config(&conn, &SlotConfig::with_count("10:00", 4, 15)).unwrap();

        let config = get_slot_config(&conn).unwrap().unwrap();
        assert_eq!(config, SlotConfig::with_count("10:00", 4, 15));
    }

    #[test]
    fn test_insert_booking_rejects_duplicate_slot() {
        let conn = setup_db();
        assert!(insert_booking(&conn, &booking("2024-01-05", "10:00")).unwrap());
        assert!(!insert_booking(&conn, &booking("2024-01-05", "10:00")).unwrap());
        assert_eq!(get_bookings_for_date(&conn, "2024-01-05").unwrap().len(), 1);
    }

    #[test]
    fn test_bookings_keep_insertion_order() {
        let conn = setup_db();
        insert_booking(&conn, &booking("2024-01-05", "11:00")).unwrap();
        insert_booking(&conn, &booking("2024-01-05", "09:00")).unwrap();
        insert_booking(&conn, &booking("2024-01-06", "10:00")).unwrap();

        let times: Vec<_> = get_bookings_for_date(&conn, "2024-01-05")
            .unwrap()
            .into_iter()
            .map(|b| b.time)
            .collect();
        assert_eq!(times, vec!["11:00", "09:00"]);

        let next_day = get_bookings_for_date(&conn, "2024-01-06").unwrap();
        assert_eq!(next_day[0].booking_id, "2024-01-06_1000");
    }

    #[test]
    fn test_unreadable_booked_at_still_loads() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO bookings (date, time, booking_id, booked_at)
             VALUES ('2024-01-05', '09:00', '2024-01-05_0900', 'yesterday-ish')",
            [],
        )
        .unwrap();

        let before = Utc::now().naive_utc() - chrono::Duration::seconds(5);
        let loaded = get_bookings_for_date(&conn, "2024-01-05").unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].booked_at >= before);
    }

    #[test]
    fn test_delete_bookings_whole_day() {
        let conn = setup_db();
        insert_booking(&conn, &booking("2024-01-05", "09:00")).unwrap();
        insert_booking(&conn, &booking("2024-01-05", "09:30")).unwrap();

        assert_eq!(delete_bookings(&conn, "2024-01-05", Some("12:00")).unwrap(), 0);
        assert_eq!(delete_bookings(&conn, "2024-01-05", None).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_context_row_is_reported_not_fatal() {
        let conn = setup_db();
        save_context(&conn, &ConversationContext::new("good")).unwrap();
        conn.execute(
            "INSERT INTO conversation_contexts (user_id, data, last_updated) VALUES ('bad', '{oops', '')",
            [],
        )
        .unwrap();

        let loaded = load_contexts(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|(id, r)| id == "bad" && r.is_err()));
        assert!(loaded.iter().any(|(id, r)| id == "good" && r.is_ok()));
    }

    #[test]
    fn test_delete_contexts_before_cutoff() {
        let conn = setup_db();
        let mut old = ConversationContext::new("old");
        old.last_updated = Utc::now() - chrono::Duration::days(40);
        save_context(&conn, &old).unwrap();
        save_context(&conn, &ConversationContext::new("fresh")).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        assert_eq!(delete_contexts_before(&conn, &cutoff).unwrap(), 1);
        assert!(delete_context(&conn, "fresh").unwrap());
        assert!(!delete_context(&conn, "fresh").unwrap());
    }
}
