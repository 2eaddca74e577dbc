use std::sync::OnceLock;

use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy)]
enum ClockForm {
    /// `10:30`, `10:30pm`
    HourMinute,
    /// `10am`, `2 pm`
    HourMeridiem,
    /// `quarter past 10`, `half to 3`
    Relative,
    /// `10 o'clock`
    OClock,
}

/// Clock formats in priority order; the first pattern that matches anywhere wins.
const CLOCK_PATTERNS: &[(ClockForm, &str)] = &[
    (
        ClockForm::HourMinute,
        r"\b([01]?\d|2[0-3]):([0-5]\d)\s?(am|pm)?\b",
    ),
    (ClockForm::HourMeridiem, r"\b([01]?\d|2[0-3])\s?(am|pm)\b"),
    (
        ClockForm::Relative,
        r"\b(quarter|half)\s+(past|to)\s+([01]?\d|2[0-3])\b",
    ),
    (ClockForm::OClock, r"\b([01]?\d|2[0-3])\s+o'?clock\b"),
];

/// Spoken hours with their afternoon-leaning defaults.
const WORD_HOURS: &[(&str, u32)] = &[
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("one", 13),
    ("two", 14),
    ("three", 15),
    ("four", 16),
    ("five", 17),
    ("six", 18),
    ("seven", 19),
    ("eight", 20),
    ("nine", 21),
];

const DAY_PART_WORDS: &[&str] = &["am", "pm", "morning", "afternoon", "evening"];

struct Compiled {
    clock: Vec<(ClockForm, Regex)>,
    words: Vec<(Regex, u32)>,
    day_parts: Vec<(Regex, &'static str)>,
}

static COMPILED: OnceLock<Compiled> = OnceLock::new();

fn compiled() -> &'static Compiled {
    COMPILED.get_or_init(|| Compiled {
        clock: CLOCK_PATTERNS
            .iter()
            .filter_map(|(form, pattern)| Regex::new(pattern).ok().map(|re| (*form, re)))
            .collect(),
        words: WORD_HOURS
            .iter()
            .filter_map(|(word, hour)| word_regex(word).map(|re| (re, *hour)))
            .collect(),
        day_parts: DAY_PART_WORDS
            .iter()
            .filter_map(|word| word_regex(word).map(|re| (re, *word)))
            .collect(),
    })
}

fn word_regex(word: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(word))).ok()
}

/// Finds the first time expression in lower-cased `text` and returns it as "HH:MM".
pub fn extract_time(text: &str) -> Option<String> {
    let c = compiled();
    for (form, re) in &c.clock {
        if let Some(caps) = re.captures(text) {
            return Some(normalize_captures(*form, &caps).unwrap_or_else(|| caps[0].trim().to_string()));
        }
    }
    word_time(text)
}

/// Normalizes a free-form time string; anything unrecognized comes back unchanged.
pub fn normalize_time(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    extract_time(&lowered).unwrap_or_else(|| raw.to_string())
}

fn normalize_captures(form: ClockForm, caps: &Captures) -> Option<String> {
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let text = |i: usize| caps.get(i).map(|m| m.as_str());

    let (hour, minute) = match form {
        ClockForm::HourMinute => (to_24h(number(1)?, text(3)), number(2)?),
        ClockForm::HourMeridiem => (to_24h(number(1)?, text(2)), 0),
        ClockForm::OClock => (number(1)?, 0),
        ClockForm::Relative => {
            let offset: i64 = if text(1)? == "quarter" { 15 } else { 30 };
            let base = number(3)? as i64 * 60;
            let total = if text(2)? == "past" {
                base + offset
            } else {
                base - offset
            };
            let total = total.rem_euclid(24 * 60) as u32;
            (total / 60, total % 60)
        }
    };
    Some(format!("{hour:02}:{minute:02}"))
}

fn to_24h(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem {
        Some("pm") if hour < 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

/// Spoken-number hours, only trusted when a day-part word is also present.
fn word_time(text: &str) -> Option<String> {
    let c = compiled();
    let day_part = c
        .day_parts
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, word)| *word)?;

    let (_, hour) = c.words.iter().find(|(re, _)| re.is_match(text))?;
    let hour = match day_part {
        "am" | "morning" if *hour > 12 => hour - 12,
        _ => *hour,
    };
    Some(format!("{hour:02}:00"))
}
