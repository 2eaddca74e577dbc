pub mod date;
pub mod keywords;
pub mod time;

use chrono::{Local, NaiveDate};

use crate::models::{Entities, Intent};
use date::{keyword_date, DateParser, NaturalDateParser};

/// Confidence reported by the first-match strategy.
const RULE_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionStrategy {
    /// First intent in table order with any keyword hit.
    #[default]
    Rules,
    /// Intent with the most keyword hits; confidence is a heuristic, not a probability.
    Scored,
}

impl ExtractionStrategy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "scored" | "statistical" => ExtractionStrategy::Scored,
            _ => ExtractionStrategy::Rules,
        }
    }
}

pub struct IntentExtractor {
    strategy: ExtractionStrategy,
    date_parser: Box<dyn DateParser>,
}

impl IntentExtractor {
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self::with_date_parser(strategy, Box::new(NaturalDateParser))
    }

    pub fn with_date_parser(strategy: ExtractionStrategy, date_parser: Box<dyn DateParser>) -> Self {
        Self {
            strategy,
            date_parser,
        }
    }

    pub fn extract(&self, text: &str, language: &str) -> Intent {
        self.extract_at(text, language, Local::now().date_naive())
    }

    /// Same as `extract`, with "today" pinned for relative dates.
    pub fn extract_at(&self, text: &str, language: &str, today: NaiveDate) -> Intent {
        let text = text.trim().to_lowercase();
        if !language.to_lowercase().starts_with("en") {
            tracing::debug!(language, "no keyword table for language, using English rules");
        }

        // Entities are independent of the intent match so a bare "11am"
        // can still fill a pending booking.
        let entities = self.extract_entities(&text, today);

        let matched = match self.strategy {
            ExtractionStrategy::Rules => {
                keywords::first_match(&text).map(|intent| (intent, RULE_CONFIDENCE))
            }
            ExtractionStrategy::Scored => keywords::best_scoring(&text),
        };

        match matched {
            Some((name, confidence)) => Intent {
                name,
                entities,
                confidence,
            },
            None => Intent::unknown(entities),
        }
    }

    fn extract_entities(&self, text: &str, today: NaiveDate) -> Entities {
        Entities {
            time: time::extract_time(text),
            date: self
                .date_parser
                .parse(text, today)
                .or_else(|| keyword_date(text, today)),
        }
    }
}

impl Default for IntentExtractor {
    fn default() -> Self {
        Self::new(ExtractionStrategy::default())
    }
}
