//! Wire types for the remote scheduler's JSON-RPC interface.
//!
//! Every request is `{"action", "version", "params"}` and every response is
//! `{"result", "error"}`. A `multi` request carries a list of actions and
//! answers with one entry per action, in order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RemoteError;

/// One remote action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "camelCase")]
pub enum Request {
    Version,
    DeckNames,
    CreateDeck { deck: String },
    FindNotes { query: String },
    FindCards { query: String },
    CardsInfo { cards: Vec<i64> },
    AddNote { note: NewNote },
    UpdateNote { note: NoteUpdate },
    Multi { actions: Vec<Request> },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::DeckNames => "deckNames",
            Self::CreateDeck { .. } => "createDeck",
            Self::FindNotes { .. } => "findNotes",
            Self::FindCards { .. } => "findCards",
            Self::CardsInfo { .. } => "cardsInfo",
            Self::AddNote { .. } => "addNote",
            Self::UpdateNote { .. } => "updateNote",
            Self::Multi { .. } => "multi",
        }
    }

    /// Serialize with the protocol version attached, including on every
    /// action nested in a `multi` so each answers with its own envelope.
    pub fn to_envelope(&self, version: u32) -> Result<Value, RemoteError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| RemoteError::Protocol(e.to_string()))?;
        stamp_version(&mut value, version);
        Ok(value)
    }
}

fn stamp_version(value: &mut Value, version: u32) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    if let Some(actions) = object
        .get_mut("params")
        .and_then(|params| params.get_mut("actions"))
        .and_then(Value::as_array_mut)
    {
        for action in actions {
            stamp_version(action, version);
        }
    }
    object.insert("version".to_string(), Value::from(version));
}

/// Note to create.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub options: NoteOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
}

/// Field and tag replacement for an existing note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteUpdate {
    pub id: i64,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// Response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope {
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(message) => Err(RemoteError::Remote(message)),
            None => Ok(self.result),
        }
    }
}

/// Outcome of one action inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Ok(Value),
    Err(String),
}

impl RemoteOutcome {
    /// Interpret one `multi` entry. Entries are normally full envelopes; a
    /// bare value is taken as a successful result, except a bare `null`,
    /// which no action returns outside an envelope.
    pub fn from_entry(entry: Value) -> Self {
        if let Value::Object(map) = &entry {
            if map.contains_key("result") && map.contains_key("error") {
                return match map.get("error") {
                    Some(Value::Null) | None => {
                        Self::Ok(map.get("result").cloned().unwrap_or(Value::Null))
                    }
                    Some(Value::String(message)) => Self::Err(message.clone()),
                    Some(other) => Self::Err(other.to_string()),
                };
            }
        }
        match entry {
            Value::Null => Self::Err("null result".to_string()),
            other => Self::Ok(other),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Decode a successful result; a remote error becomes `RemoteError::Remote`.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, RemoteError> {
        match self {
            Self::Ok(value) => {
                serde_json::from_value(value).map_err(|e| RemoteError::Protocol(e.to_string()))
            }
            Self::Err(message) => Err(RemoteError::Remote(message)),
        }
    }
}

/// Field value as reported by `cardsInfo`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NoteField {
    pub value: String,
    #[serde(default)]
    pub order: i64,
}

/// Card record returned by `cardsInfo`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub card_id: i64,
    /// Owning note id.
    pub note: i64,
    #[serde(default)]
    pub deck_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, NoteField>,
    /// Days when positive, seconds when negative.
    #[serde(default)]
    pub interval: i64,
    /// Ease in permille.
    #[serde(default)]
    pub factor: i64,
    #[serde(default)]
    pub reps: u32,
    #[serde(default)]
    pub lapses: u32,
    #[serde(default)]
    pub due: i64,
    #[serde(default)]
    pub queue: i64,
    #[serde(rename = "type", default)]
    pub card_type: i64,
}
