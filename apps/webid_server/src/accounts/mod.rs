//! The account directory: who exists, and how a registration turns into an
//! account.

mod sqlite;

pub use self::sqlite::SqliteAccountStorage;

use std::{fmt::Display, sync::Arc};

use axum::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::{
	error::{AccountError, ValidationError},
	host::{normalize_username, web_id_from_account_uri, HostResolver},
};

/// Raw registration input, as received from the client.
#[derive(derive_more::Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
	pub username: String,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	#[debug(skip)]
	pub password: Option<String>,
	/// Base64url encoded ed25519 public key of the client. Only decoded when a
	/// certificate is issued.
	#[serde(default)]
	pub certificate_signing_material: Option<String>,
}

/// An identity that is being provisioned.
///
/// Only [`AccountDirectory::user_account_from`] can build one, so the WebID is
/// always derived from the username and never set on its own.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserAccount {
	username: String,
	account_uri: Url,
	web_id: Url,
	email: Option<String>,
	name: Option<String>,
}

impl UserAccount {
	pub fn username(&self) -> &str {
		&self.username
	}

	pub fn account_uri(&self) -> &Url {
		&self.account_uri
	}

	pub fn web_id(&self) -> &Url {
		&self.web_id
	}

	pub fn email(&self) -> Option<&str> {
		self.email.as_deref()
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn key(&self) -> AccountKey {
		AccountKey(self.account_uri.as_str().to_owned())
	}
}

/// Where an account lives in storage: its root URI.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AccountKey(String);

impl AccountKey {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for AccountKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

/// The durable form of a [`UserAccount`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccountRecord {
	pub username: String,
	pub web_id: Url,
	pub email: Option<String>,
	pub name: Option<String>,
	/// Serial of the certificate issued at creation, if any.
	pub certificate_serial: Option<Uuid>,
}

/// Persists account records. Implementations only need single-write atomicity.
#[async_trait]
pub trait AccountStorage: std::fmt::Debug + Send + Sync + 'static {
	async fn exists(&self, key: &AccountKey) -> Result<bool, StorageError>;

	/// Fails with [`StorageError::Conflict`] if `key` is already taken.
	async fn write(
		&self,
		key: &AccountKey,
		record: &AccountRecord,
	) -> Result<(), StorageError>;
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
	#[error("storage backend unavailable")]
	Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
	#[error("an account is already stored at {0}")]
	Conflict(AccountKey),
}

/// Owns the mapping from usernames to accounts. Built once per server.
#[derive(Debug)]
pub struct AccountDirectory {
	host: HostResolver,
	storage: Arc<dyn AccountStorage>,
}

impl AccountDirectory {
	pub fn new(host: HostResolver, storage: Arc<dyn AccountStorage>) -> Self {
		Self { host, storage }
	}

	pub fn host(&self) -> &HostResolver {
		&self.host
	}

	/// Builds the account described by `data`. Strategy specific fields are
	/// left to the caller.
	pub fn user_account_from(
		&self,
		data: &RegistrationData,
	) -> Result<UserAccount, ValidationError> {
		let username = normalize_username(&data.username)?;
		let account_uri = self.host.account_uri_for(&username)?;
		let web_id = web_id_from_account_uri(&account_uri)
			.map_err(|_| ValidationError::InvalidUsername(username.clone()))?;
		Ok(UserAccount {
			username,
			account_uri,
			web_id,
			email: non_empty(data.email.as_deref()),
			name: non_empty(data.name.as_deref()),
		})
	}

	#[tracing::instrument(skip_all, fields(key = %account.key()))]
	pub async fn account_exists(&self, account: &UserAccount) -> Result<bool, AccountError> {
		let exists = self
			.storage
			.exists(&account.key())
			.await
			.map_err(AccountError::StorageUnavailable)?;
		debug!(exists, "checked for existing account");
		Ok(exists)
	}

	/// Writes the account record, making the account durable.
	#[tracing::instrument(skip_all, fields(key = %account.key()))]
	pub async fn commit(
		&self,
		account: &UserAccount,
		certificate_serial: Option<Uuid>,
	) -> Result<(), AccountError> {
		let record = AccountRecord {
			username: account.username.clone(),
			web_id: account.web_id.clone(),
			email: account.email.clone(),
			name: account.name.clone(),
			certificate_serial,
		};
		self.storage
			.write(&account.key(), &record)
			.await
			.map_err(|err| match err {
				StorageError::Conflict(_) => AccountError::AccountExists {
					username: account.username.clone(),
				},
				err => AccountError::StorageUnavailable(err),
			})
	}
}

fn non_empty(s: Option<&str>) -> Option<String> {
	s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}
