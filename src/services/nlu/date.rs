use std::sync::OnceLock;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use regex::Regex;

/// Resolves natural-language dates relative to `today`.
///
/// Returns "YYYY-MM-DD" when the date is understood. A date-shaped string that
/// is not a real calendar date is returned as written.
pub trait DateParser: Send + Sync {
    fn parse(&self, text: &str, today: NaiveDate) -> Option<String>;
}

/// Built-in rule-based parser for English date phrases.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalDateParser;

struct Patterns {
    iso: Regex,
    us: Regex,
    relative_day: Regex,
    next_this: Regex,
    offset: Regex,
    weekday: Regex,
}

static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();

const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

fn patterns() -> Option<&'static Patterns> {
    PATTERNS
        .get_or_init(|| {
            let build = || -> Result<Patterns, regex::Error> {
                Ok(Patterns {
                    iso: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b")?,
                    us: Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b")?,
                    relative_day: Regex::new(r"\b(today|tomorrow|yesterday)\b")?,
                    next_this: Regex::new(&format!(r"\b(next|this)\s+({WEEKDAYS}|week|month)\b"))?,
                    offset: Regex::new(r"\b(in|after)\s+(\d+)\s+(days?|weeks?|months?)\b")?,
                    weekday: Regex::new(&format!(r"\b({WEEKDAYS})\b"))?,
                })
            };
            build()
                .map_err(|e| tracing::error!(error = %e, "date patterns failed to compile"))
                .ok()
        })
        .as_ref()
}

impl DateParser for NaturalDateParser {
    fn parse(&self, text: &str, today: NaiveDate) -> Option<String> {
        let p = patterns()?;

        if let Some(caps) = p.iso.captures(text) {
            let date = ymd(&caps[1], &caps[2], &caps[3]);
            return Some(date.map(iso).unwrap_or_else(|| caps[0].to_string()));
        }

        if let Some(caps) = p.us.captures(text) {
            let year = if caps[3].len() == 2 {
                format!("20{}", &caps[3])
            } else {
                caps[3].to_string()
            };
            let date = ymd(&year, &caps[1], &caps[2]);
            return Some(date.map(iso).unwrap_or_else(|| caps[0].to_string()));
        }

        if let Some(caps) = p.relative_day.captures(text) {
            return relative_day(&caps[1], today).map(iso);
        }

        if let Some(caps) = p.next_this.captures(text) {
            let strictly_after = &caps[1] == "next";
            let date = match &caps[2] {
                "week" if strictly_after => today.checked_add_signed(Duration::days(7)),
                "month" if strictly_after => today.checked_add_months(Months::new(1)),
                "week" | "month" => Some(today),
                day => parse_weekday(day).and_then(|wd| upcoming(today, wd, strictly_after)),
            };
            return date.map(iso);
        }

        if let Some(caps) = p.offset.captures(text) {
            let n: u32 = caps[2].parse().ok()?;
            let date = match caps[3].trim_end_matches('s') {
                "day" => today.checked_add_signed(Duration::days(n as i64)),
                "week" => today.checked_add_signed(Duration::weeks(n as i64)),
                _ => today.checked_add_months(Months::new(n)),
            };
            return date.map(iso);
        }

        if let Some(caps) = p.weekday.captures(text) {
            return parse_weekday(&caps[1])
                .and_then(|wd| upcoming(today, wd, false))
                .map(iso);
        }

        None
    }
}

/// Literal keyword fallback used when the parser gives nothing.
pub fn keyword_date(text: &str, today: NaiveDate) -> Option<String> {
    ["today", "tomorrow", "yesterday"]
        .into_iter()
        .find(|kw| text.contains(kw))
        .and_then(|kw| relative_day(kw, today))
        .map(iso)
}

fn relative_day(word: &str, today: NaiveDate) -> Option<NaiveDate> {
    match word {
        "today" => Some(today),
        "tomorrow" => today.succ_opt(),
        "yesterday" => today.pred_opt(),
        _ => None,
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    s.parse().ok()
}

/// Next date falling on `weekday`; today counts unless `strictly_after`.
fn upcoming(today: NaiveDate, weekday: Weekday, strictly_after: bool) -> Option<NaiveDate> {
    let mut ahead = (7 + weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    if ahead == 0 && strictly_after {
        ahead = 7;
    }
    today.checked_add_signed(Duration::days(ahead))
}
