//! Remote record service seam.
//!
//! The expense repository only talks to a [`RecordService`]: a document
//! store with typed fields, scoped queries and id-addressed writes.
//! [`LibsqlRecordService`] is the embedded implementation; a hosted backend
//! only has to implement the same trait.

use libsql::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::Db;

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    String(String),
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Null,
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "String",
            FieldValue::Number(_) => "Number",
            FieldValue::Timestamp(_) => "Timestamp",
            FieldValue::Null => "Null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gte,
    Lte,
    Lt,
}

impl Operator {
    fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Query {
            collection: name.to_string(),
            conditions: Vec::new(),
            order_by: None,
        }
    }

    pub fn filter(mut self, field: &str, op: Operator, value: impl Into<FieldValue>) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<libsql::Error> for ServiceError {
    fn from(err: libsql::Error) -> Self {
        ServiceError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Backend(format!("malformed document body: {}", err))
    }
}

pub trait RecordService: Send + Sync {
    fn query(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Document>, ServiceError>> + Send;

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, ServiceError>> + Send;

    /// Stores a new document and returns the id the service assigned to it.
    fn insert(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;

    /// Merges `fields` into an existing document.
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

impl<S: RecordService> RecordService for Arc<S> {
    fn query(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Document>, ServiceError>> + Send {
        (**self).query(query)
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, ServiceError>> + Send {
        (**self).get(collection, id)
    }

    fn insert(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send {
        (**self).insert(collection, fields)
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).update(collection, id, fields)
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).delete(collection, id)
    }
}

pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn field_path(field: &str, part: &str) -> Result<String, ServiceError> {
    if !is_valid_field_name(field) {
        return Err(ServiceError::InvalidQuery(format!(
            "invalid field name: {}",
            field
        )));
    }
    Ok(format!("$.\"{}\".{}", field, part))
}

fn to_sql_value(value: &FieldValue) -> Result<Value, ServiceError> {
    match value {
        FieldValue::String(s) => Ok(Value::Text(s.clone())),
        FieldValue::Number(n) => Ok(Value::Real(*n)),
        FieldValue::Timestamp(t) => Ok(Value::Integer(*t)),
        FieldValue::Null => Err(ServiceError::InvalidQuery(
            "cannot compare against null".to_string(),
        )),
    }
}

/// Compiles a query into SQL over the JSON document bodies. A condition
/// only matches fields whose stored type equals the type of its value.
pub fn build_select(query: &Query) -> Result<(String, Vec<Value>), ServiceError> {
    let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
    let mut params = vec![Value::Text(query.collection.clone())];

    for condition in &query.conditions {
        let type_path = field_path(&condition.field, "type")?;
        let value_path = field_path(&condition.field, "value")?;
        sql.push_str(&format!(
            " AND json_extract(body, '{}') = ? AND json_extract(body, '{}') {} ?",
            type_path,
            value_path,
            condition.op.sql()
        ));
        params.push(Value::Text(condition.value.type_name().to_string()));
        params.push(to_sql_value(&condition.value)?);
    }

    match &query.order_by {
        Some(order) => {
            let value_path = field_path(&order.field, "value")?;
            let direction = if order.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!(
                " ORDER BY json_extract(body, '{}') {}, id ASC",
                value_path, direction
            ));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    Ok((sql, params))
}

fn decode_row(row: libsql::Row) -> Result<Document, ServiceError> {
    let id: String = row.get(0)?;
    let body: String = row.get(1)?;
    let fields: Fields = serde_json::from_str(&body)?;
    Ok(Document { id, fields })
}

#[derive(Clone)]
pub struct LibsqlRecordService {
    db: Db,
}

impl LibsqlRecordService {
    pub fn new(db: Db) -> Self {
        LibsqlRecordService { db }
    }
}

impl RecordService for LibsqlRecordService {
    async fn query(&self, query: &Query) -> Result<Vec<Document>, ServiceError> {
        let (sql, params) = build_select(query)?;
        let conn = self.db.read().await;
        let mut rows = conn
            .query(&sql, libsql::params::Params::Positional(params))
            .await?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(decode_row(row)?);
        }
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT id, body FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(decode_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, ServiceError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(&fields)?;

        let conn = self.db.write().await;
        conn.execute(
            "INSERT INTO documents (id, collection, body) VALUES (?, ?, ?)",
            (id.as_str(), collection, body.as_str()),
        )
        .await?;

        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), ServiceError> {
        // Single write guard for the read-merge-write sequence
        let conn = self.db.write().await;

        let mut rows = conn
            .query(
                "SELECT id, body FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
            )
            .await?;

        let mut document = match rows.next().await? {
            Some(row) => decode_row(row)?,
            None => return Err(ServiceError::NotFound(id.to_string())),
        };
        document.fields.extend(fields);

        let body = serde_json::to_string(&document.fields)?;
        conn.execute(
            "UPDATE documents SET body = ? WHERE collection = ? AND id = ?",
            (body.as_str(), collection, id),
        )
        .await?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ServiceError> {
        let conn = self.db.write().await;
        let affected = conn
            .execute(
                "DELETE FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
            )
            .await?;

        if affected == 0 {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
