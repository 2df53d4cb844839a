use axum::async_trait;
use sqlx::SqlitePool;

use super::{AccountKey, AccountRecord, AccountStorage, StorageError};
use crate::MigratedDbPool;

/// [`AccountStorage`] backed by the `accounts` table.
#[derive(Debug, Clone)]
pub struct SqliteAccountStorage {
	pool: SqlitePool,
}

impl SqliteAccountStorage {
	pub fn new(db: &MigratedDbPool) -> Self {
		Self {
			pool: db.pool().clone(),
		}
	}
}

#[async_trait]
impl AccountStorage for SqliteAccountStorage {
	async fn exists(&self, key: &AccountKey) -> Result<bool, StorageError> {
		sqlx::query_scalar::<_, bool>(
			"SELECT EXISTS(SELECT 1 FROM accounts WHERE account_key = ?)",
		)
		.bind(key.as_str())
		.fetch_one(&self.pool)
		.await
		.map_err(|err| StorageError::Unavailable(err.into()))
	}

	async fn write(
		&self,
		key: &AccountKey,
		record: &AccountRecord,
	) -> Result<(), StorageError> {
		sqlx::query(
			"INSERT INTO accounts (account_key, username, web_id, email, name, certificate_serial)
			VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(key.as_str())
		.bind(&record.username)
		.bind(record.web_id.as_str())
		.bind(&record.email)
		.bind(&record.name)
		.bind(record.certificate_serial.map(|serial| serial.to_string()))
		.execute(&self.pool)
		.await
		.map_err(|err| match err {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				StorageError::Conflict(key.clone())
			}
			err => StorageError::Unavailable(err.into()),
		})?;
		Ok(())
	}
}
