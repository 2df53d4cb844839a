//! Collaborators for tests that record how they were called.

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc, Mutex,
};

use axum::async_trait;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use url::Url;

use crate::{
	accounts::{
		AccountDirectory, AccountKey, AccountRecord, AccountStorage, RegistrationData,
		StorageError, UserAccount,
	},
	credentials::{
		CertificateAuthority, CertificateClaims, CredentialGenerationError,
		CredentialStore, CredentialStoreError, IssuedCertificate, LocalAuthority,
	},
	host::HostResolver,
	uuid::UuidProvider,
};

/// `alice` on a multi-user server at `https://example.org`.
pub fn alice() -> UserAccount {
	let host = HostResolver::new("https://example.org".parse().unwrap(), true).unwrap();
	AccountDirectory::new(host, Arc::new(RecordingStorage::default()))
		.user_account_from(&RegistrationData {
			username: "alice".into(),
			..Default::default()
		})
		.unwrap()
}

/// A valid ed25519 public key to request certificates with.
pub fn subject_key() -> Vec<u8> {
	SigningKey::from_bytes(&[42; 32])
		.verifying_key()
		.to_bytes()
		.to_vec()
}

/// [`subject_key`] as the client sends it.
pub fn encoded_subject_key() -> String {
	base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(subject_key())
}

#[derive(Debug, Default)]
struct StorageState {
	preexisting: bool,
	unavailable: bool,
	failing_writes: AtomicUsize,
	exists_calls: AtomicUsize,
	writes: Mutex<Vec<(AccountKey, AccountRecord)>>,
}

/// In-memory [`AccountStorage`].
#[derive(Debug, Clone, Default)]
pub struct RecordingStorage(Arc<StorageState>);

impl RecordingStorage {
	/// Storage in which every account already exists.
	pub fn existing() -> Self {
		Self(Arc::new(StorageState {
			preexisting: true,
			..Default::default()
		}))
	}

	/// Storage that cannot be reached.
	pub fn unavailable() -> Self {
		Self(Arc::new(StorageState {
			unavailable: true,
			..Default::default()
		}))
	}

	/// Storage whose first `n` writes fail as if the backend went away.
	pub fn failing_writes(n: usize) -> Self {
		Self(Arc::new(StorageState {
			failing_writes: AtomicUsize::new(n),
			..Default::default()
		}))
	}

	pub fn exists_calls(&self) -> usize {
		self.0.exists_calls.load(Ordering::SeqCst)
	}

	pub fn writes(&self) -> Vec<(AccountKey, AccountRecord)> {
		self.0.writes.lock().unwrap().clone()
	}

	fn check_reachable(&self) -> Result<(), StorageError> {
		if self.0.unavailable {
			return Err(StorageError::Unavailable("connection refused".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl AccountStorage for RecordingStorage {
	async fn exists(&self, key: &AccountKey) -> Result<bool, StorageError> {
		self.0.exists_calls.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		let written = self.0.writes.lock().unwrap().iter().any(|(k, _)| k == key);
		Ok(self.0.preexisting || written)
	}

	async fn write(
		&self,
		key: &AccountKey,
		record: &AccountRecord,
	) -> Result<(), StorageError> {
		self.check_reachable()?;
		let failed = self
			.0
			.failing_writes
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failed {
			return Err(StorageError::Unavailable("write timed out".into()));
		}
		let mut writes = self.0.writes.lock().unwrap();
		if writes.iter().any(|(k, _)| k == key) {
			return Err(StorageError::Conflict(key.clone()));
		}
		writes.push((key.clone(), record.clone()));
		Ok(())
	}
}

/// [`CredentialStore`] that remembers every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingCredentialStore {
	calls: Arc<Mutex<Vec<(UserAccount, String)>>>,
	deleted: Arc<Mutex<Vec<String>>>,
	duplicate: bool,
}

impl RecordingCredentialStore {
	/// A store that reports every user as a duplicate.
	pub fn duplicate() -> Self {
		Self {
			duplicate: true,
			..Default::default()
		}
	}

	pub fn calls(&self) -> Vec<(UserAccount, String)> {
		self.calls.lock().unwrap().clone()
	}

	/// Usernames whose credentials were deleted, in order.
	pub fn deleted(&self) -> Vec<String> {
		self.deleted.lock().unwrap().clone()
	}
}

#[async_trait]
impl CredentialStore for RecordingCredentialStore {
	async fn create_user(
		&self,
		account: &UserAccount,
		password: &str,
	) -> Result<(), CredentialStoreError> {
		self.calls
			.lock()
			.unwrap()
			.push((account.clone(), password.to_owned()));
		if self.duplicate {
			return Err(CredentialStoreError::Duplicate {
				username: account.username().to_owned(),
			});
		}
		Ok(())
	}

	async fn delete_user(&self, account: &UserAccount) -> Result<(), CredentialStoreError> {
		self.deleted
			.lock()
			.unwrap()
			.push(account.username().to_owned());
		Ok(())
	}
}

/// A real [`LocalAuthority`] that also remembers every call.
#[derive(Debug, Clone)]
pub struct RecordingAuthority {
	authority: Arc<LocalAuthority>,
	calls: Arc<Mutex<Vec<(Url, Vec<u8>)>>>,
}

impl RecordingAuthority {
	pub fn new() -> Self {
		let authority = LocalAuthority::new(
			"https://example.org/".parse().unwrap(),
			&SigningKey::from_bytes(&[7; 32]),
			UuidProvider::new_random(),
		)
		.unwrap();
		Self {
			authority: Arc::new(authority),
			calls: Arc::default(),
		}
	}

	pub fn calls(&self) -> Vec<(Url, Vec<u8>)> {
		self.calls.lock().unwrap().clone()
	}

	/// Checks the signature of `token` and returns its claims.
	pub fn verify(&self, token: &str) -> CertificateClaims {
		let x = base64::prelude::BASE64_URL_SAFE_NO_PAD
			.encode(self.authority.verifying_key().as_bytes());
		let key = DecodingKey::from_ed_components(&x).unwrap();
		let mut validation = Validation::new(Algorithm::EdDSA);
		validation.set_issuer(&[self.authority.issuer().as_str()]);
		jsonwebtoken::decode(token, &key, &validation)
			.unwrap()
			.claims
	}
}

#[async_trait]
impl CertificateAuthority for RecordingAuthority {
	async fn issue(
		&self,
		web_id: &Url,
		signing_material: &[u8],
	) -> Result<IssuedCertificate, CredentialGenerationError> {
		self.calls
			.lock()
			.unwrap()
			.push((web_id.clone(), signing_material.to_vec()));
		self.authority.issue(web_id, signing_material).await
	}
}
