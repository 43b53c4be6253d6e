//! Shared test infrastructure for integration tests.
//!
//! Provides an in-process fake of the remote scheduler's JSON-RPC endpoint
//! and a `TestContext` wiring it to a temporary local store.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use study_sync::config::{RemoteConfig, SyncConfig};
use study_sync::db::{self, SharedRepository, SqliteRepository};
use study_sync::remote::RemoteClient;

/// Offset between a note id and the id of its single card.
pub const CARD_ID_OFFSET: i64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct FakeNote {
    pub deck: String,
    pub model: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// Scheduling fields of a fake card, using the remote's raw encodings.
#[derive(Debug, Clone)]
pub struct FakeCard {
    pub note_id: i64,
    pub interval: i64,
    pub factor: i64,
    pub reps: u32,
    pub lapses: u32,
    pub due: i64,
    pub queue: i64,
    pub card_type: i64,
}

#[derive(Debug, Default)]
pub struct FakeScheduler {
    pub decks: BTreeSet<String>,
    pub notes: BTreeMap<i64, FakeNote>,
    pub cards: BTreeMap<i64, FakeCard>,
    next_id: i64,
    /// HTTP requests received, failed ones included.
    pub requests: usize,
    /// Top-level and nested action names, in arrival order.
    pub actions: Vec<String>,
    /// Answer this many upcoming requests with a 500.
    pub fail_next: usize,
    /// Top-level actions always answered with a 500.
    pub fail_actions: BTreeSet<String>,
    /// Delay before answering each request.
    pub delay: Duration,
    /// Identities whose `addNote` is refused.
    pub reject_add: BTreeSet<String>,
}

impl FakeScheduler {
    /// Insert a note with one new card. Returns the note id.
    pub fn add_note(&mut self, deck: &str, model: &str, fields: BTreeMap<String, String>) -> i64 {
        self.next_id += 1;
        let id = 1_000 + self.next_id;
        self.notes.insert(
            id,
            FakeNote {
                deck: deck.to_string(),
                model: model.to_string(),
                fields,
                tags: Vec::new(),
            },
        );
        self.cards.insert(
            id + CARD_ID_OFFSET,
            FakeCard {
                note_id: id,
                interval: 0,
                factor: 0,
                reps: 0,
                lapses: 0,
                due: id,
                queue: 0,
                card_type: 0,
            },
        );
        id
    }

    pub fn note_id_for(&self, identity: &str) -> Option<i64> {
        self.notes
            .iter()
            .find(|(_, note)| note.fields.get("Identity").map(String::as_str) == Some(identity))
            .map(|(id, _)| *id)
    }

    pub fn card_for(&mut self, identity: &str) -> &mut FakeCard {
        let note_id = self.note_id_for(identity).expect("note for identity");
        self.cards
            .get_mut(&(note_id + CARD_ID_OFFSET))
            .expect("card for note")
    }

    pub fn count_action(&self, action: &str) -> usize {
        self.actions.iter().filter(|a| a.as_str() == action).count()
    }

    fn dispatch(&mut self, request: &Value) -> Value {
        let action = request["action"].as_str().unwrap_or_default().to_string();
        self.actions.push(action.clone());
        let params = &request["params"];

        let outcome: Result<Value, String> = match action.as_str() {
            "version" => Ok(json!(6)),
            "deckNames" => Ok(json!(self.decks)),
            "createDeck" => {
                let deck = params["deck"].as_str().unwrap_or_default().to_string();
                self.decks.insert(deck);
                Ok(json!(self.decks.len()))
            }
            "findNotes" => {
                let query = params["query"].as_str().unwrap_or_default();
                Ok(json!(self.find_notes(query)))
            }
            "findCards" => Ok(json!(self.cards.keys().collect::<Vec<_>>())),
            "cardsInfo" => Ok(Value::Array(
                params["cards"]
                    .as_array()
                    .map(|ids| ids.iter().filter_map(|id| self.card_info(id.as_i64()?)).collect())
                    .unwrap_or_default(),
            )),
            "addNote" => self.handle_add(&params["note"]),
            "updateNote" => self.handle_update(&params["note"]),
            "multi" => Ok(Value::Array(
                params["actions"]
                    .as_array()
                    .map(|actions| actions.iter().map(|a| self.dispatch(a)).collect())
                    .unwrap_or_default(),
            )),
            other => Err(format!("unsupported action {other}")),
        };

        match outcome {
            Ok(result) => json!({"result": result, "error": null}),
            Err(error) => json!({"result": null, "error": error}),
        }
    }

    fn find_notes(&self, query: &str) -> Vec<i64> {
        match identity_in_query(query) {
            Some(identity) => self
                .notes
                .iter()
                .filter(|(_, note)| note.fields.get("Identity") == Some(&identity))
                .map(|(id, _)| *id)
                .collect(),
            None => self.notes.keys().copied().collect(),
        }
    }

    fn card_info(&self, card_id: i64) -> Option<Value> {
        let card = self.cards.get(&card_id)?;
        let note = self.notes.get(&card.note_id)?;
        let fields: BTreeMap<&String, Value> = note
            .fields
            .iter()
            .enumerate()
            .map(|(order, (name, value))| (name, json!({"value": value, "order": order})))
            .collect();
        Some(json!({
            "cardId": card_id,
            "note": card.note_id,
            "deckName": note.deck,
            "fields": fields,
            "interval": card.interval,
            "factor": card.factor,
            "reps": card.reps,
            "lapses": card.lapses,
            "due": card.due,
            "queue": card.queue,
            "type": card.card_type,
        }))
    }

    fn handle_add(&mut self, note: &Value) -> Result<Value, String> {
        let deck = note["deckName"].as_str().unwrap_or_default();
        if !self.decks.contains(deck) {
            return Err(format!("deck was not found: {deck}"));
        }
        let fields = string_map(&note["fields"]);
        if let Some(identity) = fields.get("Identity") {
            if self.reject_add.contains(identity) {
                return Err("cannot create note because it is a duplicate".to_string());
            }
        }
        let model = note["modelName"].as_str().unwrap_or_default().to_string();
        let tags = string_list(&note["tags"]);
        let deck = deck.to_string();
        let id = self.add_note(&deck, &model, fields);
        if let Some(created) = self.notes.get_mut(&id) {
            created.tags = tags;
        }
        Ok(json!(id))
    }

    fn handle_update(&mut self, update: &Value) -> Result<Value, String> {
        let id = update["id"].as_i64().unwrap_or_default();
        let Some(note) = self.notes.get_mut(&id) else {
            return Err("Note was not found".to_string());
        };
        note.fields = string_map(&update["fields"]);
        note.tags = string_list(&update["tags"]);
        Ok(Value::Null)
    }
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the value of a `"Identity:..."` term, undoing search escapes.
fn identity_in_query(query: &str) -> Option<String> {
    let start = query.find("\"Identity:")? + "\"Identity:".len();
    let mut value = String::new();
    let mut chars = query[start..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            other => value.push(other),
        }
    }
    None
}

type SharedFake = Arc<Mutex<FakeScheduler>>;

async fn handle(State(fake): State<SharedFake>, Json(body): Json<Value>) -> impl IntoResponse {
    let delay = {
        let mut fake = fake.lock().unwrap();
        fake.requests += 1;
        fake.delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut fake = fake.lock().unwrap();
    let action = body["action"].as_str().unwrap_or_default();
    if fake.fail_next > 0 || fake.fail_actions.contains(action) {
        fake.fail_next = fake.fail_next.saturating_sub(1);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!("collection busy")));
    }
    let reply = fake.dispatch(&body);
    (StatusCode::OK, Json(reply))
}

/// Start the fake on an ephemeral port. Returns its URL.
pub async fn spawn_fake(fake: SharedFake) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake scheduler");
    let addr = listener.local_addr().expect("fake address");
    let app = Router::new().route("/", post(handle)).with_state(fake);
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake scheduler");
    });
    (format!("http://{addr}"), server)
}

/// URL on which nothing is listening.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{addr}")
}

/// Remote settings with short timeouts and backoff.
pub fn remote_config(url: &str) -> RemoteConfig {
    RemoteConfig {
        url: url.to_string(),
        request_timeout_ms: 2_000,
        probe_timeout_ms: 500,
        probe_cache_ttl_ms: 0,
        base_backoff_ms: 5,
        max_backoff_ms: 20,
        ..Default::default()
    }
}

pub fn sync_config() -> SyncConfig {
    SyncConfig {
        interval_secs: 3_600,
        start_probe_timeout_ms: 500,
        stop_timeout_ms: 2_000,
        ..Default::default()
    }
}

const DB_FILE: &str = "study.db";

/// Test context: fake remote plus a temporary on-disk store.
pub struct TestContext {
    pub url: String,
    pub fake: SharedFake,
    pub repository: SharedRepository,
    server: JoinHandle<()>,
    dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let fake: SharedFake = Arc::new(Mutex::new(FakeScheduler::default()));
        let (url, server) = spawn_fake(fake.clone()).await;

        let dir = tempfile::tempdir().expect("temp dir");
        let repo = SqliteRepository::open(dir.path().join(DB_FILE)).expect("open store");

        Self {
            url,
            fake,
            repository: db::shared(repo),
            server,
            dir,
        }
    }

    /// Path of the store, for opening a second connection.
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join(DB_FILE)
    }

    pub fn remote_config(&self) -> RemoteConfig {
        remote_config(&self.url)
    }

    pub fn client(&self) -> RemoteClient {
        RemoteClient::new(self.remote_config()).expect("client")
    }

    pub fn fake(&self) -> MutexGuard<'_, FakeScheduler> {
        self.fake.lock().unwrap()
    }

    pub fn repo(&self) -> MutexGuard<'_, SqliteRepository> {
        self.repository.lock().unwrap()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}
