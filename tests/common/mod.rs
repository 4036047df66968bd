#![allow(dead_code)]

use expense_store::auth::{AuthProvider, AuthUser, LocalAuth};
use expense_store::database::{Db, init_db};
use expense_store::models::ExpenseDraft;
use expense_store::repository::{ExpenseRepository, FIELD_CATEGORY};
use expense_store::service::{
    Document, FieldValue, Fields, LibsqlRecordService, Query, RecordService, ServiceError,
};
use expense_store::store::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::{TempDir, tempdir};
use time::Date;
use tokio::sync::Notify;

pub const TEST_EMAIL: &str = "owner@example.com";
pub const OTHER_EMAIL: &str = "someone.else@example.com";
pub const TEST_PASSWORD: &str = "correct-horse";

pub async fn setup_test_environment() -> (Db, TempDir) {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir
        .path()
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let db = init_db(&data_path)
        .await
        .unwrap_or_else(|e| panic!("Failed to initialize database at {}: {}", data_path, e));

    // The caller keeps temp_dir alive for the duration of the test
    (db, temp_dir)
}

pub fn test_store<S: RecordService>(service: S, db: Db) -> Store<S, LocalAuth> {
    Store::new(ExpenseRepository::new(service), LocalAuth::new(db))
}

/// A store over the embedded service with a freshly registered, signed-in user.
pub async fn signed_in_store() -> (Store<LibsqlRecordService, LocalAuth>, AuthUser, TempDir) {
    let (db, temp_dir) = setup_test_environment().await;
    let store = test_store(LibsqlRecordService::new(db.clone()), db);
    let user = register(&store).await;
    (store, user, temp_dir)
}

pub async fn register<S: RecordService>(store: &Store<S, LocalAuth>) -> AuthUser {
    store
        .register(TEST_EMAIL, TEST_PASSWORD, TEST_PASSWORD)
        .await
        .unwrap_or_else(|e| panic!("Failed to register {}: {}", TEST_EMAIL, e))
}

pub async fn register_other(auth: &LocalAuth) -> AuthUser {
    let user = auth
        .sign_up(OTHER_EMAIL, TEST_PASSWORD)
        .await
        .unwrap_or_else(|e| panic!("Failed to register {}: {}", OTHER_EMAIL, e));
    auth.sign_out().await.expect("Failed to sign out");
    user
}

pub fn draft(title: &str, amount: f64, category: &str, date: Date) -> ExpenseDraft {
    ExpenseDraft::new(title, amount, category, date)
}

pub fn fields(values: Vec<(&str, FieldValue)>) -> Fields {
    values
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Holds back queries filtered on one category until the gate is opened.
pub struct GatedService<S> {
    inner: S,
    gated_category: String,
    gate: Arc<Notify>,
}

impl<S> GatedService<S> {
    pub fn new(inner: S, gated_category: &str, gate: Arc<Notify>) -> Self {
        GatedService {
            inner,
            gated_category: gated_category.to_string(),
            gate,
        }
    }
}

impl<S: RecordService> RecordService for GatedService<S> {
    async fn query(&self, query: &Query) -> Result<Vec<Document>, ServiceError> {
        let gated = query.conditions.iter().any(|c| {
            c.field == FIELD_CATEGORY && c.value.as_str() == Some(self.gated_category.as_str())
        });
        if gated {
            self.gate.notified().await;
        }
        self.inner.query(query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        self.inner.get(collection, id).await
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, ServiceError> {
        self.inner.insert(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), ServiceError> {
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ServiceError> {
        self.inner.delete(collection, id).await
    }
}

/// Fails every call with a backend error while switched on.
pub struct FlakyService<S> {
    inner: S,
    failing: AtomicBool,
}

impl<S> FlakyService<S> {
    pub fn new(inner: S) -> Self {
        FlakyService {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Backend("service unavailable".to_string()));
        }
        Ok(())
    }
}

impl<S: RecordService> RecordService for FlakyService<S> {
    async fn query(&self, query: &Query) -> Result<Vec<Document>, ServiceError> {
        self.check()?;
        self.inner.query(query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        self.check()?;
        self.inner.get(collection, id).await
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, ServiceError> {
        self.check()?;
        self.inner.insert(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), ServiceError> {
        self.check()?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ServiceError> {
        self.check()?;
        self.inner.delete(collection, id).await
    }
}
