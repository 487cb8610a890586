//! In-memory collaborators for unit tests

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::macos::{CommandOutput, CommandRunner};
use super::mongo::{DocumentSession, DocumentStore, StoreError, StoreResult};
use super::ollama::OllamaClient;
use crate::error::ToolResult;

/// Records every invocation and replays scripted outputs.
/// Once the script runs out, commands succeed with empty output.
pub struct MockCommandRunner {
    outputs: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::with_outputs(Vec::new())
    }

    pub fn with_outputs(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> ToolResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        let next = self.outputs.lock().unwrap().pop_front();
        Ok(next.unwrap_or(CommandOutput {
            success: true,
            ..Default::default()
        }))
    }
}

/// reqwest client that ignores proxy settings from the environment
pub fn test_http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Ollama client pointed at a port nothing listens on
pub fn unreachable_ollama() -> OllamaClient {
    OllamaClient::with_http_client("http://127.0.0.1:1", test_http_client())
}

type Databases = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

#[derive(Default)]
struct StoreState {
    databases: Mutex<Databases>,
    last_find: Mutex<Option<(Document, i64)>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
    failure: Option<String>,
}

/// Document store kept in memory, counting connects and releases
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StoreState::default()),
        }
    }

    /// Every session operation fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            state: Arc::new(StoreState {
                failure: Some(message.to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn seed(&self, database: &str, collection: &str, doc: Document) {
        let mut dbs = self.state.databases.lock().unwrap();
        let docs = dbs
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        if !doc.is_empty() {
            docs.push(with_id(doc));
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn count(&self, database: &str, collection: &str) -> usize {
        self.state
            .databases
            .lock()
            .unwrap()
            .get(database)
            .and_then(|db| db.get(collection))
            .map_or(0, Vec::len)
    }

    pub fn collections(&self, database: &str) -> Vec<String> {
        self.state
            .databases
            .lock()
            .unwrap()
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_find(&self) -> Option<(Document, i64)> {
        self.state.last_find.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(&self) -> ToolResult<Box<dyn DocumentSession>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<StoreState>,
}

impl MemorySession {
    fn check(&self) -> StoreResult<()> {
        match &self.state.failure {
            Some(message) => Err(StoreError(message.clone())),
            None => Ok(()),
        }
    }
}

fn with_id(mut doc: Document) -> Document {
    if !doc.contains_key("_id") {
        doc.insert("_id", ObjectId::new());
    }
    doc
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

#[async_trait]
impl DocumentSession for MemorySession {
    async fn create_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.check()?;
        let mut dbs = self.state.databases.lock().unwrap();
        let db = dbs.entry(database.to_string()).or_default();
        if db.contains_key(collection) {
            return Err(StoreError(format!(
                "Collection {}.{} already exists",
                database, collection
            )));
        }
        db.insert(collection.to_string(), Vec::new());
        Ok(())
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.check()?;
        let mut dbs = self.state.databases.lock().unwrap();
        if let Some(db) = dbs.get_mut(database) {
            db.remove(collection);
            if db.is_empty() {
                dbs.remove(database);
            }
        }
        Ok(())
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.state.databases.lock().unwrap().keys().cloned().collect())
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self
            .state
            .databases
            .lock()
            .unwrap()
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        doc: Document,
    ) -> StoreResult<Bson> {
        self.check()?;
        let doc = with_id(doc);
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        self.state
            .databases
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        limit: i64,
    ) -> StoreResult<Vec<Document>> {
        self.check()?;
        *self.state.last_find.lock().unwrap() = Some((filter.clone(), limit));
        // Same as the server: 0 means no limit, negative counts as its magnitude
        let take = match limit {
            0 => usize::MAX,
            n => n.unsigned_abs() as usize,
        };
        let dbs = self.state.databases.lock().unwrap();
        let docs = dbs
            .get(database)
            .and_then(|db| db.get(collection))
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches(d, &filter))
                    .take(take)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        self.check()?;
        let mut dbs = self.state.databases.lock().unwrap();
        let Some(docs) = dbs.get_mut(database).and_then(|db| db.get_mut(collection)) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !matches(d, &filter));
        Ok((before - docs.len()) as u64)
    }

    fn release(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}
