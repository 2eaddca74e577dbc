use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::models::Booking;

/// Fields of a single invite event.
#[derive(Debug, Clone)]
pub struct InviteEvent {
    pub uid: String,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub summary: String,
}

impl InviteEvent {
    pub fn for_booking(booking: &Booking, duration_minutes: u32) -> anyhow::Result<Self> {
        Ok(Self {
            uid: format!("{}@slotkeeper", booking.booking_id),
            start: slot_start(&booking.date, &booking.time)?,
            duration_minutes,
            summary: format!("Booked Slot - {}", booking.time),
        })
    }
}

pub fn slot_start(date: &str, time: &str) -> anyhow::Result<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date: {date}"))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| anyhow::anyhow!("invalid time: {time}"))?;
    Ok(date.and_time(time))
}

pub fn generate_ics(event: &InviteEvent) -> String {
    let dtstart = event.start.format("%Y%m%dT%H%M%S").to_string();
    let dtend = (event.start + Duration::minutes(event.duration_minutes as i64))
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let uid = &event.uid;
    let summary = &event.summary;

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Slotkeeper//Booking Assistant//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(date: &str, time: &str) -> Booking {
        Booking::new(
            date,
            time,
            NaiveDateTime::parse_from_str("2025-03-10 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        )
    }

    #[test]
    fn test_generate_ics() {
        let event = InviteEvent::for_booking(&booking("2025-03-15", "14:00"), 30).unwrap();
        let ics = generate_ics(&event);
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("UID:2025-03-15_1400@slotkeeper"));
        assert!(ics.contains("DTSTAMP:"));
        assert!(ics.contains("DTSTART:20250315T140000"));
        assert!(ics.contains("DTEND:20250315T143000"));
        assert!(ics.contains("SUMMARY:Booked Slot - 14:00"));
        assert!(ics.contains("END:VEVENT"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_event_crossing_midnight() {
        let event = InviteEvent::for_booking(&booking("2025-04-01", "23:45"), 30).unwrap();
        let ics = generate_ics(&event);
        assert!(ics.contains("DTEND:20250402T001500"));
    }

    #[test]
    fn test_malformed_booking_is_rejected() {
        assert!(InviteEvent::for_booking(&booking("2025-02-30", "10:00"), 30).is_err());
        assert!(InviteEvent::for_booking(&booking("2025-02-03", "ten"), 30).is_err());
    }
}
