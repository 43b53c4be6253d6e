//! Test fixtures for learning items and remote notes.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use study_core::{ItemType, LearningItem};
use study_sync::db::{ItemRepository, SqliteRepository};

use super::FakeScheduler;

/// An item that passes the default quality gate, edited a minute ago.
pub fn item(key: &str, module: &str, section: &str) -> LearningItem {
    let mut item = LearningItem::new(
        key,
        ItemType::Flashcard,
        module,
        section,
        format!("Question for {key}"),
        format!("Answer for {key}"),
        Utc::now() - Duration::minutes(1),
    );
    item.quality_score = Some(0.95);
    item
}

pub fn item_with_quality(key: &str, quality: Option<f64>) -> LearningItem {
    LearningItem {
        quality_score: quality,
        ..item(key, "biology", "cells")
    }
}

pub fn seed(repo: &SqliteRepository, items: &[LearningItem]) {
    for item in items {
        repo.upsert_item(item).expect("seed item");
    }
}

/// Edit an item's answer as if the author changed it just now.
pub fn edit(repo: &SqliteRepository, key: &str, back: &str) {
    let mut item = repo.get_item(key).expect("get item").expect("item exists");
    item.back = back.to_string();
    item.updated_at = Utc::now();
    repo.upsert_item(&item).expect("edit item");
}

/// Fields of a note owned by this tool, carrying `identity`.
pub fn note_fields(identity: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Front".to_string(), "front".to_string()),
        ("Back".to_string(), "back".to_string()),
        ("Identity".to_string(), identity.to_string()),
        ("Source".to_string(), String::new()),
        ("Metadata".to_string(), "{}".to_string()),
    ])
}

/// Put a note for `identity` into the fake, as if created by an earlier run.
pub fn remote_note(fake: &mut FakeScheduler, identity: &str) -> i64 {
    fake.decks.insert("Study::biology::cells".to_string());
    fake.add_note("Study::biology::cells", "StudySync", note_fields(identity))
}
