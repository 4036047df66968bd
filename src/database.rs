use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::constants::DATABASE_FILE;

const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id          TEXT    PRIMARY KEY,
    collection  TEXT    NOT NULL,
    body        TEXT    NOT NULL
);
"#;

const CREATE_DOCUMENTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);";

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    email          TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL,
    created_at     INTEGER NOT NULL,
    last_login_at  INTEGER
);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Opens (or creates) `expenses.db` under `data_dir` with the document and user tables.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(DATABASE_FILE);
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_DOCUMENTS_TABLE, ()).await?;
    conn.execute(CREATE_DOCUMENTS_INDEX, ()).await?;
    conn.execute(CREATE_USERS_TABLE, ()).await?;

    tracing::info!("expense database ready at {}", data_dir);
    Ok(Arc::new(RwLock::new(conn)))
}
