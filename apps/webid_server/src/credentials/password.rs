//! Password credentials.

use argon2::{
	password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
	Argon2,
};
use axum::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::{accounts::UserAccount, MigratedDbPool};

/// Persists password credentials for new accounts.
#[async_trait]
pub trait CredentialStore: std::fmt::Debug + Send + Sync + 'static {
	async fn create_user(
		&self,
		account: &UserAccount,
		password: &str,
	) -> Result<(), CredentialStoreError>;

	/// Removes the credential of `account`. Deleting a missing credential is not
	/// an error.
	async fn delete_user(&self, account: &UserAccount) -> Result<(), CredentialStoreError>;
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialStoreError {
	#[error("a password is already registered for {username:?}")]
	Duplicate { username: String },
	#[error("failed to hash password: {0}")]
	Hash(String),
	#[error("credential storage failed")]
	Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// [`CredentialStore`] that keeps argon2 hashes in the `password_credentials`
/// table.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
	pool: SqlitePool,
}

impl SqliteCredentialStore {
	pub fn new(db: &MigratedDbPool) -> Self {
		Self {
			pool: db.pool().clone(),
		}
	}
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
	#[tracing::instrument(skip_all, fields(username = account.username()))]
	async fn create_user(
		&self,
		account: &UserAccount,
		password: &str,
	) -> Result<(), CredentialStoreError> {
		let password = password.to_owned();
		// Argon2 is CPU bound.
		let hash = tokio::task::spawn_blocking(move || hash_password(&password))
			.await
			.map_err(|err| CredentialStoreError::Hash(err.to_string()))??;

		sqlx::query(
			"INSERT INTO password_credentials (web_id, username, password_hash)
			VALUES (?, ?, ?)",
		)
		.bind(account.web_id().as_str())
		.bind(account.username())
		.bind(hash)
		.execute(&self.pool)
		.await
		.map_err(|err| match err {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				CredentialStoreError::Duplicate {
					username: account.username().to_owned(),
				}
			}
			err => CredentialStoreError::Storage(err.into()),
		})?;
		debug!("stored password credential");
		Ok(())
	}

	#[tracing::instrument(skip_all, fields(username = account.username()))]
	async fn delete_user(&self, account: &UserAccount) -> Result<(), CredentialStoreError> {
		let deleted = sqlx::query(
			"DELETE FROM password_credentials WHERE web_id = ? AND username = ?",
		)
		.bind(account.web_id().as_str())
		.bind(account.username())
		.execute(&self.pool)
		.await
		.map_err(|err| CredentialStoreError::Storage(err.into()))?
		.rows_affected();
		debug!(deleted, "deleted password credential");
		Ok(())
	}
}

fn hash_password(password: &str) -> Result<String, CredentialStoreError> {
	let salt = SaltString::generate(&mut OsRng);
	Argon2::default()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|err| CredentialStoreError::Hash(err.to_string()))
}
