use super::{RecordService, UpdateMode};
use crate::dates::normalize_date_fields;
use crate::models::{Collection, Record};
use crate::validation::require_fields;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Typed access to the record store.
///
/// Every write validates required fields before any network traffic and
/// normalizes date fields to `YYYY-MM-DD`.
pub struct RecordStore {
    service: Box<dyn RecordService>,
}

impl RecordStore {
    pub fn new(service: Box<dyn RecordService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &dyn RecordService {
        self.service.as_ref()
    }

    pub async fn list<E: Record>(&self) -> Result<Vec<E>> {
        self.service
            .list(E::COLLECTION)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn get<E: Record>(&self, id: u64) -> Result<E> {
        decode(self.service.get(E::COLLECTION, id).await?)
    }

    /// Untyped listing, for callers that only know the collection at runtime.
    pub async fn list_raw(&self, collection: Collection) -> Result<Vec<Value>> {
        self.service.list(collection).await
    }

    pub async fn create<E: Record>(&self, record: &E) -> Result<E> {
        let mut body = encode(record)?;
        body.remove("id");
        require_fields(&Value::Object(body.clone()), E::REQUIRED_FIELDS, &[])?;
        normalize_date_fields(&mut body, E::DATE_FIELDS);

        tracing::debug!("Creating record in {}", E::COLLECTION);
        let created = self.service.create(E::COLLECTION, &Value::Object(body)).await?;
        decode(created)
    }

    /// PATCH only the given fields.
    pub async fn update<E: Record>(&self, id: u64, fields: Value) -> Result<E> {
        let Value::Object(mut body) = fields else {
            return Err(Error::Generic(format!(
                "Partial update of {}/{} must be a JSON object",
                E::COLLECTION,
                id
            )));
        };
        body.remove("id");
        normalize_date_fields(&mut body, E::DATE_FIELDS);

        tracing::debug!("Patching {}/{}: {:?}", E::COLLECTION, id, body.keys());
        let updated = self
            .service
            .update(E::COLLECTION, id, &Value::Object(body), UpdateMode::Patch)
            .await?;
        decode(updated)
    }

    /// PUT the full record. The record must carry its id.
    pub async fn replace<E: Record>(&self, record: &E) -> Result<E> {
        let id = record
            .id()
            .ok_or_else(|| Error::field("id", "A stored record is required for a full update."))?;
        let mut body = encode(record)?;
        require_fields(&Value::Object(body.clone()), E::REQUIRED_FIELDS, &[])?;
        normalize_date_fields(&mut body, E::DATE_FIELDS);

        let updated = self
            .service
            .update(E::COLLECTION, id, &Value::Object(body), UpdateMode::Put)
            .await?;
        decode(updated)
    }

    /// Returns `false` when the record was already gone.
    pub async fn delete<E: Record>(&self, id: u64) -> Result<bool> {
        self.delete_raw(E::COLLECTION, id).await
    }

    pub async fn delete_raw(&self, collection: Collection, id: u64) -> Result<bool> {
        match self.service.delete(collection, id).await {
            Ok(()) => Ok(true),
            Err(Error::NotFound(message)) => {
                tracing::warn!("{}/{} was already deleted: {}", collection, id, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn encode<E: Record>(record: &E) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Generic(format!(
            "{} record did not serialize to an object: {}",
            E::COLLECTION,
            other
        ))),
    }
}

fn decode<E: Record>(value: Value) -> Result<E> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!("Failed to decode {} record: {}", E::COLLECTION, e);
        Error::Serialization(e)
    })
}
