use super::{RecordService, UpdateMode};
use crate::models::Collection;
use crate::response::normalize_error;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Canned failure: status code and body, fed through the same normalization
/// the HTTP client uses.
type Failure = (u16, String);

/// In-memory record store with server-assigned ids.
#[derive(Clone)]
pub struct MockRecordClient {
    records: Arc<Mutex<HashMap<Collection, BTreeMap<u64, Value>>>>,
    next_id: Arc<Mutex<u64>>,
    create_count: Arc<Mutex<usize>>,
    update_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
    fail_creates: Arc<Mutex<Option<Failure>>>,
    fail_updates: Arc<Mutex<Option<Failure>>>,
    fail_deletes: Arc<Mutex<Option<Failure>>>,
}

impl MockRecordClient {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            create_count: Arc::new(Mutex::new(0)),
            update_count: Arc::new(Mutex::new(0)),
            delete_count: Arc::new(Mutex::new(0)),
            fail_creates: Arc::new(Mutex::new(None)),
            fail_updates: Arc::new(Mutex::new(None)),
            fail_deletes: Arc::new(Mutex::new(None)),
        }
    }

    /// Seed a record. A missing `id` is assigned like a create would.
    pub fn with_record(self, collection: Collection, record: Value) -> Self {
        self.insert(collection, record);
        self
    }

    pub fn with_create_failure(self, status: u16, body: &str) -> Self {
        *self.fail_creates.lock().unwrap() = Some((status, body.to_string()));
        self
    }

    pub fn with_update_failure(self, status: u16, body: &str) -> Self {
        *self.fail_updates.lock().unwrap() = Some((status, body.to_string()));
        self
    }

    pub fn with_delete_failure(self, status: u16, body: &str) -> Self {
        *self.fail_deletes.lock().unwrap() = Some((status, body.to_string()));
        self
    }

    pub fn get_create_count(&self) -> usize {
        *self.create_count.lock().unwrap()
    }

    pub fn get_update_count(&self) -> usize {
        *self.update_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn get_records(&self, collection: Collection) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_record(&self, collection: Collection, id: u64) -> Option<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&collection)
            .and_then(|records| records.get(&id).cloned())
    }

    fn insert(&self, collection: Collection, record: Value) -> Value {
        let mut map = match record {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = map.get("id").and_then(Value::as_u64).unwrap_or(*next_id);
            *next_id = (*next_id).max(id + 1);
            id
        };
        map.insert("id".to_string(), Value::from(id));

        let record = Value::Object(map);
        self.records
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .insert(id, record.clone());
        record
    }

    fn check(failure: &Mutex<Option<Failure>>) -> Result<()> {
        match failure.lock().unwrap().as_ref() {
            Some((status, body)) => {
                let status =
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Err(normalize_error(status, body))
            }
            None => Ok(()),
        }
    }

    fn not_found(collection: Collection, id: u64) -> Error {
        Error::NotFound(format!("{}/{} does not exist", collection, id))
    }
}

impl Default for MockRecordClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordService for MockRecordClient {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        Ok(self.get_records(collection))
    }

    async fn get(&self, collection: Collection, id: u64) -> Result<Value> {
        self.get_record(collection, id)
            .ok_or_else(|| Self::not_found(collection, id))
    }

    async fn create(&self, collection: Collection, body: &Value) -> Result<Value> {
        *self.create_count.lock().unwrap() += 1;
        Self::check(&self.fail_creates)?;

        let mut body = body.clone();
        if let Some(map) = body.as_object_mut() {
            map.remove("id");
        }
        Ok(self.insert(collection, body))
    }

    async fn update(
        &self,
        collection: Collection,
        id: u64,
        body: &Value,
        mode: UpdateMode,
    ) -> Result<Value> {
        *self.update_count.lock().unwrap() += 1;
        Self::check(&self.fail_updates)?;

        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&collection)
            .and_then(|records| records.get_mut(&id))
            .ok_or_else(|| Self::not_found(collection, id))?;

        let fields = body.as_object().cloned().unwrap_or_default();
        let target = match mode {
            UpdateMode::Patch => existing.as_object().cloned().unwrap_or_default(),
            UpdateMode::Put => Map::new(),
        };
        let mut merged = target;
        merged.extend(fields);
        merged.insert("id".to_string(), Value::from(id));

        *existing = Value::Object(merged);
        Ok(existing.clone())
    }

    async fn delete(&self, collection: Collection, id: u64) -> Result<()> {
        *self.delete_count.lock().unwrap() += 1;
        Self::check(&self.fail_deletes)?;

        self.records
            .lock()
            .unwrap()
            .get_mut(&collection)
            .and_then(|records| records.remove(&id))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(collection, id))
    }
}
