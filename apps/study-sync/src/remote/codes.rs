//! Remote scheduler integer encodings and unit conversions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use study_core::{Rating, ReviewStatus};

use super::protocol::NoteField;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Card queue as reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    UserBuried,
    SchedulerBuried,
    Suspended,
    New,
    /// Intraday learning; due is an epoch timestamp in seconds.
    Learning,
    /// Due is a day number.
    Review,
    /// Learning across days; due is a day number.
    DayLearning,
    Preview,
    Unknown(i64),
}

impl Queue {
    pub fn from_code(code: i64) -> Self {
        match code {
            -3 => Self::UserBuried,
            -2 => Self::SchedulerBuried,
            -1 => Self::Suspended,
            0 => Self::New,
            1 => Self::Learning,
            2 => Self::Review,
            3 => Self::DayLearning,
            4 => Self::Preview,
            other => Self::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserBuried => "user_buried",
            Self::SchedulerBuried => "scheduler_buried",
            Self::Suspended => "suspended",
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::DayLearning => "day_learning",
            Self::Preview => "preview",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Card type as reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    New,
    Learning,
    Review,
    Relearning,
    Unknown(i64),
}

impl CardType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::New,
            1 => Self::Learning,
            2 => Self::Review,
            3 => Self::Relearning,
            other => Self::Unknown(other),
        }
    }
}

/// Answer button code for a rating.
pub fn ease_code(rating: Rating) -> i64 {
    i64::from(rating.to_value())
}

pub fn rating_from_ease_code(code: i64) -> Option<Rating> {
    u8::try_from(code)
        .ok()
        .and_then(|value| Rating::from_value(value).ok())
}

/// Local status for a remote queue/type pair.
///
/// Suspension wins; buried cards keep the status of their type.
pub fn review_status(queue: Queue, card_type: CardType) -> ReviewStatus {
    if queue == Queue::Suspended {
        return ReviewStatus::Suspended;
    }
    match card_type {
        CardType::New | CardType::Unknown(_) => ReviewStatus::New,
        CardType::Learning => ReviewStatus::Learning,
        CardType::Review => ReviewStatus::Review,
        CardType::Relearning => ReviewStatus::Relearning,
    }
}

/// How to read a card's raw `due` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    /// Days since the collection epoch.
    Day(i64),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
    /// New cards: the value is a queue position.
    Position(i64),
}

/// Classify a raw due value by queue, falling back to the card type for
/// suspended, buried and unknown queues.
pub fn classify_due(queue: Queue, card_type: CardType, raw: i64) -> Due {
    match queue {
        Queue::New => Due::Position(raw),
        Queue::Learning | Queue::Preview => Due::Timestamp(raw),
        Queue::Review | Queue::DayLearning => Due::Day(raw),
        Queue::Suspended | Queue::UserBuried | Queue::SchedulerBuried | Queue::Unknown(_) => {
            match card_type {
                CardType::New | CardType::Unknown(_) => Due::Position(raw),
                CardType::Review => Due::Day(raw),
                // Large values are timestamps; small ones are day numbers.
                CardType::Learning | CardType::Relearning if raw > 1_000_000_000 => Due::Timestamp(raw),
                CardType::Learning | CardType::Relearning => Due::Day(raw),
            }
        }
    }
}

/// Absolute due date, or None for queue positions.
///
/// Fails when the value falls outside the representable date range.
pub fn due_date(due: Due, collection_epoch: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    let date = match due {
        Due::Day(days) => Duration::try_days(days)
            .and_then(|offset| collection_epoch.checked_add_signed(offset)),
        Due::Timestamp(secs) => DateTime::from_timestamp(secs, 0),
        Due::Position(_) => return Ok(None),
    };
    date.map(Some)
        .ok_or_else(|| format!("due value {due:?} is out of range"))
}

/// Interval in days; negative raw values are seconds.
pub fn interval_days(raw: i64) -> f64 {
    if raw < 0 {
        raw.unsigned_abs() as f64 / SECONDS_PER_DAY
    } else {
        raw as f64
    }
}

/// Ease factor from permille, or None when the remote reports none.
pub fn ease_from_factor(factor: i64) -> Option<f64> {
    (factor > 0).then(|| factor as f64 / 1000.0)
}

/// Trimmed, non-empty field value.
pub fn field_value<'a>(fields: &'a BTreeMap<String, NoteField>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|field| field.value.trim())
        .filter(|value| !value.is_empty())
}

/// Tag-safe text: whitespace becomes `_`, the hierarchy separator is kept out.
pub fn sanitize_tag(raw: &str) -> String {
    raw.trim()
        .replace("::", "_")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Join sanitized tag segments into a hierarchical tag.
pub fn tag_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| sanitize_tag(segment))
        .collect::<Vec<_>>()
        .join("::")
}

/// Deck-name component with the hierarchy separator and quotes removed.
pub fn sanitize_deck_component(raw: &str) -> String {
    raw.trim().replace("::", ":").replace('"', "'")
}

/// Escape text for a quoted search term. `*` and `_` are wildcards remotely.
pub fn escape_search(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '"' | '*' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Search term matching notes whose `field` equals `value` exactly.
pub fn field_query(field: &str, value: &str) -> String {
    format!("\"{}:{}\"", field, escape_search(value))
}

/// Search term for a deck and all of its children.
pub fn deck_query(deck: &str) -> String {
    format!("\"deck:{}\"", deck.replace('"', "\\\""))
}

/// Search term restricting to one note model.
pub fn model_query(model: &str) -> String {
    format!("\"note:{}\"", model.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn queue_codes_round_trip_names() {
        assert_eq!(Queue::from_code(-1), Queue::Suspended);
        assert_eq!(Queue::from_code(2).as_str(), "review");
        assert_eq!(Queue::from_code(9), Queue::Unknown(9));
    }

    #[test]
    fn status_prefers_suspension() {
        assert_eq!(
            review_status(Queue::Suspended, CardType::Review),
            ReviewStatus::Suspended
        );
        assert_eq!(
            review_status(Queue::UserBuried, CardType::Relearning),
            ReviewStatus::Relearning
        );
        assert_eq!(review_status(Queue::New, CardType::New), ReviewStatus::New);
    }

    #[test]
    fn review_due_is_a_day_count() {
        let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let due = classify_due(Queue::Review, CardType::Review, 10);
        assert_eq!(due, Due::Day(10));
        assert_eq!(
            due_date(due, epoch),
            Ok(Some(Utc.with_ymd_and_hms(2020, 1, 11, 0, 0, 0).unwrap()))
        );
    }

    #[test]
    fn learning_due_is_a_timestamp() {
        let due = classify_due(Queue::Learning, CardType::Learning, 1_700_000_000);
        assert_eq!(
            due_date(due, DateTime::UNIX_EPOCH),
            Ok(DateTime::from_timestamp(1_700_000_000, 0))
        );
    }

    #[test]
    fn out_of_range_due_is_an_error() {
        let day = classify_due(Queue::Review, CardType::Review, 1_700_000_000);
        assert!(due_date(day, DateTime::UNIX_EPOCH).is_err());
        let stamp = classify_due(Queue::Learning, CardType::Learning, i64::MAX);
        assert!(due_date(stamp, DateTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn new_cards_have_no_due_date() {
        let due = classify_due(Queue::New, CardType::New, 42);
        assert_eq!(due_date(due, DateTime::UNIX_EPOCH), Ok(None));
    }

    #[test]
    fn suspended_card_falls_back_to_type() {
        assert_eq!(classify_due(Queue::Suspended, CardType::Review, 300), Due::Day(300));
        assert_eq!(
            classify_due(Queue::Suspended, CardType::Learning, 1_700_000_000),
            Due::Timestamp(1_700_000_000)
        );
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(interval_days(21), 21.0);
        assert_eq!(interval_days(-43_200), 0.5);
        assert!(interval_days(i64::MIN) > 0.0);
        assert_eq!(ease_from_factor(2300), Some(2.3));
        assert_eq!(ease_from_factor(0), None);
    }

    #[test]
    fn ease_codes_match_ratings() {
        assert_eq!(ease_code(Rating::Again), 1);
        assert_eq!(rating_from_ease_code(4), Some(Rating::Easy));
        assert_eq!(rating_from_ease_code(0), None);
        assert_eq!(rating_from_ease_code(-1), None);
    }

    #[test]
    fn tags_are_sanitized() {
        assert_eq!(sanitize_tag("  cell biology "), "cell_biology");
        assert_eq!(tag_path(&["study-sync", "section", "a::b"]), "study-sync::section::a_b");
    }

    #[test]
    fn search_terms_escape_wildcards() {
        assert_eq!(field_query("Identity", "bio_1*"), "\"Identity:bio\\_1\\*\"");
        assert_eq!(deck_query("Study"), "\"deck:Study\"");
    }

    #[test]
    fn field_values_are_trimmed() {
        let fields = BTreeMap::from([
            ("Identity".to_string(), NoteField { value: " bio-1 ".to_string(), order: 2 }),
            ("Source".to_string(), NoteField { value: "  ".to_string(), order: 3 }),
        ]);
        assert_eq!(field_value(&fields, "Identity"), Some("bio-1"));
        assert_eq!(field_value(&fields, "Source"), None);
        assert_eq!(field_value(&fields, "Front"), None);
    }
}
