use std::sync::OnceLock;

use regex::Regex;

use crate::models::IntentKind;

/// A keyword and the inflected endings it also answers to ("cancel" +
/// "ling" = "cancelling"). Short words take no endings.
#[derive(Debug, Clone, Copy)]
pub struct Keyword {
    pub word: &'static str,
    pub endings: &'static [&'static str],
}

const fn kw(word: &'static str) -> Keyword {
    Keyword { word, endings: &[] }
}

const fn inflected(word: &'static str, endings: &'static [&'static str]) -> Keyword {
    Keyword { word, endings }
}

/// Intent → keyword set, in match priority order. Earlier rows win ties.
/// Cancel sits above book: cancellations routinely mention "my booking".
pub const INTENT_KEYWORDS: &[(IntentKind, &[Keyword])] = &[
    (
        IntentKind::Cancel,
        &[
            inflected("cancel", &["s", "ed", "led", "ing", "ling", "lation", "lations"]),
            kw("drop"),
            inflected("remove", &["d"]),
            inflected("delete", &["d"]),
            inflected("unbook", &["ed", "ing"]),
        ],
    ),
    (
        IntentKind::Book,
        &[
            inflected("book", &["ed", "ing"]),
            inflected("schedule", &["d"]),
            inflected("reserve", &["d"]),
            kw("set up"),
            inflected("arrange", &["d"]),
            kw("slot"),
            inflected("appointment", &["s"]),
            inflected("meeting", &["s"]),
        ],
    ),
    (
        IntentKind::Greet,
        &[
            kw("hello"),
            kw("hi"),
            kw("hey"),
            kw("good morning"),
            kw("good afternoon"),
            kw("good evening"),
        ],
    ),
    (
        IntentKind::Query,
        &[
            kw("what"),
            kw("when"),
            kw("where"),
            kw("how"),
            inflected("show", &["s", "ing"]),
            inflected("list", &["s", "ing"]),
            kw("available"),
            kw("free"),
        ],
    ),
    (
        IntentKind::System,
        &[
            kw("open"),
            kw("launch"),
            kw("start"),
            kw("run"),
            kw("execute"),
            kw("shutdown"),
            kw("restart"),
        ],
    ),
];

struct CompiledRule {
    intent: IntentKind,
    keyword_count: usize,
    patterns: Vec<Regex>,
}

static COMPILED: OnceLock<Vec<CompiledRule>> = OnceLock::new();

/// Keywords match whole words plus their declared endings; a multi-word
/// keyword matches across any run of whitespace.
fn compiled() -> &'static [CompiledRule] {
    COMPILED.get_or_init(|| {
        INTENT_KEYWORDS
            .iter()
            .map(|(intent, keywords)| CompiledRule {
                intent: *intent,
                keyword_count: keywords.len(),
                patterns: keywords.iter().filter_map(keyword_pattern).collect(),
            })
            .collect()
    })
}

fn keyword_pattern(keyword: &Keyword) -> Option<Regex> {
    let body = keyword
        .word
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let endings = if keyword.endings.is_empty() {
        String::new()
    } else {
        let alternatives: Vec<String> = keyword.endings.iter().map(|e| regex::escape(e)).collect();
        format!("(?:{})?", alternatives.join("|"))
    };
    match Regex::new(&format!(r"\b{body}{endings}\b")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(keyword = keyword.word, error = %e, "skipping keyword that does not compile");
            None
        }
    }
}

/// First intent in table order with any keyword present.
pub fn first_match(text: &str) -> Option<IntentKind> {
    compiled()
        .iter()
        .find(|rule| rule.patterns.iter().any(|re| re.is_match(text)))
        .map(|rule| rule.intent)
}

/// Intent with the most keyword hits and its heuristic confidence,
/// `hits / keyword set size` capped at 1.0.
pub fn best_scoring(text: &str) -> Option<(IntentKind, f32)> {
    let mut best: Option<(&CompiledRule, usize)> = None;
    for rule in compiled() {
        let hits: usize = rule
            .patterns
            .iter()
            .map(|re| re.find_iter(text).count())
            .sum();
        if hits == 0 {
            continue;
        }
        if best.map_or(true, |(_, top)| hits > top) {
            best = Some((rule, hits));
        }
    }
    best.map(|(rule, hits)| {
        let confidence = (hits as f32 / rule.keyword_count as f32).min(1.0);
        (rule.intent, confidence)
    })
}
