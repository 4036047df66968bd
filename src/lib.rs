//! Client-side core of a personal expense tracker: domain model, a
//! repository over a document-style record service (expenses and the
//! accounts they are booked against), and the state store that screens
//! read from and dispatch actions to.

pub mod accounts;
pub mod auth;
pub mod categories;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod store;
pub mod summary;
pub mod utils;

pub use auth::{AuthError, AuthProvider, AuthUser, LocalAuth};
pub use error::{ExpenseError, Result};
pub use models::{
    Account, AccountDraft, AccountPatch, Category, Currency, Expense, ExpenseDraft, ExpensePatch,
    Filter, FilterPatch,
};
pub use repository::ExpenseRepository;
pub use service::{LibsqlRecordService, RecordService};
pub use store::{AppState, Store};
pub use summary::{Period, Summary};

use config::Config;

pub type LocalStore = Store<LibsqlRecordService, LocalAuth>;

/// Opens the embedded database described by `config` and wires a store on top of it.
pub async fn open_local_store(config: &Config) -> anyhow::Result<LocalStore> {
    let db = database::init_db(&config.data_path).await?;
    let repository = ExpenseRepository::with_default_account(
        LibsqlRecordService::new(db.clone()),
        config.default_account.as_str(),
    );
    Ok(Store::new(repository, LocalAuth::new(db)))
}
