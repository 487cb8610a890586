//! MongoDB tools
//!
//! Every call opens its own connection through a [`DocumentStore`] and holds it
//! in a [`ConnectionGuard`], which releases it when the call returns, whether
//! the operation succeeded or not. Nothing is pooled across calls.

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Bson, Document};
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{ToolHandler, json_schema, optional_str, required_str};
use crate::error::{ToolError, ToolResult};

pub const DEFAULT_FIND_LIMIT: i64 = 100;

const SYSTEM_DATABASES: [&str; 3] = ["admin", "config", "local"];
const PLACEHOLDER_COLLECTION: &str = "_temp";

/// Failure reported by the database driver
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        Self(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opens per-call database sessions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn connect(&self) -> ToolResult<Box<dyn DocumentSession>>;
}

/// One open connection to the document database
#[async_trait]
pub trait DocumentSession: Send + Sync {
    async fn create_collection(&self, database: &str, collection: &str) -> StoreResult<()>;
    async fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<()>;
    async fn list_database_names(&self) -> StoreResult<Vec<String>>;
    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;
    /// Returns the identifier of the inserted document
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        doc: Document,
    ) -> StoreResult<Bson>;
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        limit: i64,
    ) -> StoreResult<Vec<Document>>;
    /// Returns the number of deleted documents
    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64>;
    /// Close the connection. Called exactly once, by [`ConnectionGuard`].
    fn release(&mut self);
}

/// Scoped connection: released on drop, on every exit path
pub struct ConnectionGuard {
    session: Box<dyn DocumentSession>,
}

impl ConnectionGuard {
    pub async fn acquire(store: &dyn DocumentStore) -> ToolResult<Self> {
        let session = store.connect().await?;
        debug!("Document store connection acquired");
        Ok(Self { session })
    }
}

impl Deref for ConnectionGuard {
    type Target = dyn DocumentSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.session.release();
        debug!("Document store connection released");
    }
}

/// MongoDB-backed store; a new client per connection
pub struct MongoStore {
    uri: String,
}

impl MongoStore {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn connect(&self) -> ToolResult<Box<dyn DocumentSession>> {
        let client = Client::with_uri_str(&self.uri).await.map_err(|e| {
            ToolError::Collaborator(format!("Failed to connect to MongoDB ({}): {}", self.uri, e))
        })?;
        Ok(Box::new(MongoSession {
            client: Some(client),
        }))
    }
}

struct MongoSession {
    client: Option<Client>,
}

impl MongoSession {
    fn client(&self) -> StoreResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError("connection already released".to_string()))
    }

    fn collection(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<mongodb::Collection<Document>> {
        Ok(self.client()?.database(database).collection(collection))
    }
}

#[async_trait]
impl DocumentSession for MongoSession {
    async fn create_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.client()?
            .database(database)
            .create_collection(collection)
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.collection(database, collection)?.drop().await?;
        Ok(())
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.client()?.list_database_names().await?)
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .client()?
            .database(database)
            .list_collection_names()
            .await?)
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        doc: Document,
    ) -> StoreResult<Bson> {
        let result = self.collection(database, collection)?.insert_one(doc).await?;
        Ok(result.inserted_id)
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        limit: i64,
    ) -> StoreResult<Vec<Document>> {
        let mut cursor = self
            .collection(database, collection)?
            .find(filter)
            .limit(limit)
            .await?;

        let mut docs = Vec::new();
        while cursor.advance().await? {
            docs.push(cursor.deserialize_current()?);
        }
        Ok(docs)
    }

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        let result = self
            .collection(database, collection)?
            .delete_many(filter)
            .await?;
        Ok(result.deleted_count)
    }

    fn release(&mut self) {
        // Dropping the last handle shuts the client's pool down in the background
        self.client.take();
    }
}

/// Parse a JSON-string argument into a BSON document
fn parse_json_document(raw: &str, field: &str) -> ToolResult<Document> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ToolError::Argument(format!("Invalid JSON in '{}': {}", field, e)))?;
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(ToolError::Argument(format!(
            "Invalid JSON in '{}': expected an object",
            field
        ))),
        Err(e) => Err(ToolError::Argument(format!(
            "Invalid JSON in '{}': {}",
            field, e
        ))),
    }
}

/// Render a document identifier as plain text
fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a stored document to JSON with its `_id` as a string
fn document_to_json(mut doc: Document) -> Value {
    if let Some(id) = doc.get("_id").map(id_to_string) {
        doc.insert("_id", id);
    }
    Bson::Document(doc).into_relaxed_extjson()
}

fn fault(context: &str, e: StoreError) -> ToolError {
    ToolError::Collaborator(format!("{}: {}", context, e))
}

fn database_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "Database name"
    })
}

/// Create a database by creating and dropping a placeholder collection
pub struct CreateDatabaseTool {
    store: Arc<dyn DocumentStore>,
}

impl CreateDatabaseTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CreateDatabaseTool {
    fn name(&self) -> &str {
        "mongodb_create_database"
    }

    fn description(&self) -> &str {
        "Creates new database in MongoDB"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({ "databaseName": database_schema() }),
            vec!["databaseName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        const CONTEXT: &str = "Error creating database";
        conn.create_collection(database, PLACEHOLDER_COLLECTION)
            .await
            .map_err(|e| fault(CONTEXT, e))?;
        conn.drop_collection(database, PLACEHOLDER_COLLECTION)
            .await
            .map_err(|e| fault(CONTEXT, e))?;

        Ok(format!("Database \"{}\" successfully created", database))
    }
}

/// List user databases
pub struct ListDatabasesTool {
    store: Arc<dyn DocumentStore>,
}

impl ListDatabasesTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ListDatabasesTool {
    fn name(&self) -> &str {
        "mongodb_list_databases"
    }

    fn description(&self) -> &str {
        "Gets list of all databases in MongoDB"
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> ToolResult<String> {
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;
        let names: Vec<String> = conn
            .list_database_names()
            .await
            .map_err(|e| fault("Error getting list of databases", e))?
            .into_iter()
            .filter(|name| !SYSTEM_DATABASES.contains(&name.as_str()))
            .collect();

        if names.is_empty() {
            Ok("Databases:\nNo databases found".to_string())
        } else {
            Ok(format!("Databases:\n{}", names.join("\n")))
        }
    }
}

/// Create a collection
pub struct CreateCollectionTool {
    store: Arc<dyn DocumentStore>,
}

impl CreateCollectionTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CreateCollectionTool {
    fn name(&self) -> &str {
        "mongodb_create_collection"
    }

    fn description(&self) -> &str {
        "Creates new collection in specified database"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "databaseName": database_schema(),
                "collectionName": {
                    "type": "string",
                    "description": "Collection name"
                }
            }),
            vec!["databaseName", "collectionName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let collection = required_str(&input, "collectionName")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        conn.create_collection(database, collection)
            .await
            .map_err(|e| fault("Error creating collection", e))?;

        Ok(format!(
            "Collection \"{}\" successfully created in database \"{}\"",
            collection, database
        ))
    }
}

/// List collections of a database
pub struct ListCollectionsTool {
    store: Arc<dyn DocumentStore>,
}

impl ListCollectionsTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ListCollectionsTool {
    fn name(&self) -> &str {
        "mongodb_list_collections"
    }

    fn description(&self) -> &str {
        "Gets list of collections in specified database"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({ "databaseName": database_schema() }),
            vec!["databaseName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        let names = conn
            .list_collection_names(database)
            .await
            .map_err(|e| fault("Error getting list of collections", e))?;

        let body = if names.is_empty() {
            "No collections found".to_string()
        } else {
            names.join("\n")
        };
        Ok(format!("Collections in database \"{}\":\n{}", database, body))
    }
}

/// Drop a collection
pub struct DeleteCollectionTool {
    store: Arc<dyn DocumentStore>,
}

impl DeleteCollectionTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeleteCollectionTool {
    fn name(&self) -> &str {
        "mongodb_delete_collection"
    }

    fn description(&self) -> &str {
        "Deletes collection from database"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "databaseName": database_schema(),
                "collectionName": {
                    "type": "string",
                    "description": "Collection name to delete"
                }
            }),
            vec!["databaseName", "collectionName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let collection = required_str(&input, "collectionName")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        conn.drop_collection(database, collection)
            .await
            .map_err(|e| fault("Error deleting collection", e))?;

        Ok(format!(
            "Collection \"{}\" successfully deleted from database \"{}\"",
            collection, database
        ))
    }
}

/// Insert one document given as a JSON string
pub struct InsertDocumentTool {
    store: Arc<dyn DocumentStore>,
}

impl InsertDocumentTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for InsertDocumentTool {
    fn name(&self) -> &str {
        "mongodb_insert_document"
    }

    fn description(&self) -> &str {
        "Inserts document into collection"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "databaseName": database_schema(),
                "collectionName": {
                    "type": "string",
                    "description": "Collection name"
                },
                "document": {
                    "type": "string",
                    "description": "JSON string with document to insert"
                }
            }),
            vec!["databaseName", "collectionName", "document"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let collection = required_str(&input, "collectionName")?;
        let raw = required_str(&input, "document")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        let doc = parse_json_document(raw, "document")?;
        let id = conn
            .insert_one(database, collection, doc)
            .await
            .map_err(|e| fault("Error inserting document", e))?;

        Ok(format!(
            "Document successfully inserted into collection \"{}\". ID: {}",
            collection,
            id_to_string(&id)
        ))
    }
}

/// Find documents matching an optional JSON filter
pub struct FindDocumentsTool {
    store: Arc<dyn DocumentStore>,
}

impl FindDocumentsTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for FindDocumentsTool {
    fn name(&self) -> &str {
        "mongodb_find_documents"
    }

    fn description(&self) -> &str {
        "Finds documents in collection"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "databaseName": database_schema(),
                "collectionName": {
                    "type": "string",
                    "description": "Collection name"
                },
                "filter": {
                    "type": "string",
                    "description": "JSON string with search filter (optional)"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of documents (default 100)",
                    "default": DEFAULT_FIND_LIMIT
                }
            }),
            vec!["databaseName", "collectionName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let collection = required_str(&input, "collectionName")?;
        let limit = match input.get("limit") {
            None | Some(Value::Null) => DEFAULT_FIND_LIMIT,
            Some(v) => v
                .as_i64()
                .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| {
                    ToolError::Argument("Argument 'limit' must be an integer".to_string())
                })?,
        };
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        let filter = match optional_str(&input, "filter") {
            Some(raw) if !raw.trim().is_empty() => parse_json_document(raw, "filter")?,
            _ => Document::new(),
        };
        debug!("Finding in {}.{} (limit {})", database, collection, limit);

        let docs = conn
            .find(database, collection, filter, limit)
            .await
            .map_err(|e| fault("Error finding documents", e))?;

        let count = docs.len();
        let rendered: Vec<Value> = docs.into_iter().map(document_to_json).collect();
        let body = serde_json::to_string_pretty(&rendered)
            .map_err(|e| ToolError::Collaborator(format!("Error finding documents: {}", e)))?;
        Ok(format!("Found documents: {}\n\n{}", count, body))
    }
}

/// Delete every document matching a JSON filter
pub struct DeleteDocumentTool {
    store: Arc<dyn DocumentStore>,
}

impl DeleteDocumentTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeleteDocumentTool {
    fn name(&self) -> &str {
        "mongodb_delete_document"
    }

    fn description(&self) -> &str {
        "Deletes document(s) from collection by filter"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "databaseName": database_schema(),
                "collectionName": {
                    "type": "string",
                    "description": "Collection name"
                },
                "filter": {
                    "type": "string",
                    "description": "JSON string with deletion filter"
                }
            }),
            vec!["databaseName", "collectionName", "filter"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let database = required_str(&input, "databaseName")?;
        let collection = required_str(&input, "collectionName")?;
        let raw = required_str(&input, "filter")?;
        let conn = ConnectionGuard::acquire(self.store.as_ref()).await?;

        let filter = parse_json_document(raw, "filter")?;
        let deleted = conn
            .delete_many(database, collection, filter)
            .await
            .map_err(|e| fault("Error deleting document", e))?;

        Ok(format!("Deleted documents: {}", deleted))
    }
}
