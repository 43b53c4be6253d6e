//! Remote note payloads built from learning items.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use study_core::LearningItem;

use crate::config::SyncConfig;
use crate::remote::codes::{deck_query, field_query, model_query, sanitize_deck_component, tag_path};
use crate::remote::{NewNote, NoteOptions, NoteUpdate};

/// Everything the remote stores for one item. Field and tag order is fixed,
/// so equal payloads serialize and hash identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotePayload {
    pub deck: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

impl NotePayload {
    pub fn build(item: &LearningItem, config: &SyncConfig) -> Self {
        let names = &config.fields;

        let mut metadata: BTreeMap<&str, &str> = item
            .metadata
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        metadata.insert("item_type", item.item_type.as_str());
        metadata.insert("module", &item.module_id);
        metadata.insert("section", &item.section_id);
        // A map of strings always serializes.
        let metadata = serde_json::to_string(&metadata).unwrap_or_default();

        let fields = BTreeMap::from([
            (names.front.clone(), item.front.clone()),
            (names.back.clone(), item.back.clone()),
            (names.identity.clone(), item.content_key.clone()),
            (names.source.clone(), item.source.clone().unwrap_or_default()),
            (names.metadata.clone(), metadata),
        ]);

        let prefix = config.tag_prefix.as_str();
        let mut tags = vec![
            tag_path(&[prefix]),
            tag_path(&[prefix, "type", item.item_type.as_str()]),
            tag_path(&[prefix, "module", &item.module_id]),
            tag_path(&[prefix, "section", &item.section_id]),
        ];
        tags.sort();
        tags.dedup();

        Self {
            deck: deck_name(item, config),
            fields,
            tags,
        }
    }

    pub fn hash(&self) -> String {
        hash_content(&serde_json::to_string(self).unwrap_or_default())
    }

    pub fn to_new_note(&self, model: &str) -> NewNote {
        NewNote {
            deck_name: self.deck.clone(),
            model_name: model.to_string(),
            fields: self.fields.clone(),
            tags: self.tags.clone(),
            options: NoteOptions {
                allow_duplicate: false,
            },
        }
    }

    pub fn to_update(&self, id: i64) -> NoteUpdate {
        NoteUpdate {
            id,
            fields: self.fields.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Remote partition for an item: `{root}::{module}::{section}`.
pub fn deck_name(item: &LearningItem, config: &SyncConfig) -> String {
    [
        config.root_deck.as_str(),
        item.module_id.as_str(),
        item.section_id.as_str(),
    ]
    .iter()
    .map(|part| sanitize_deck_component(part))
    .collect::<Vec<_>>()
    .join("::")
}

/// Search bounding every remote note this tool owns.
pub fn default_scope(config: &SyncConfig) -> String {
    format!(
        "{} {}",
        deck_query(&config.root_deck),
        model_query(&config.note_model)
    )
}

/// Search for the note carrying `content_key`.
pub fn identity_query(content_key: &str, config: &SyncConfig) -> String {
    format!(
        "{} {}",
        default_scope(config),
        field_query(&config.fields.identity, content_key)
    )
}

/// Calculate SHA256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
