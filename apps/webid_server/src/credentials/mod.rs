//! Credential issuance strategies: how a new account gets a credential.
//!
//! Which strategy applies is server configuration ([`CredentialIssuer`]). The
//! client only decides which of the strategy's fields it fills in.

mod certificate;
mod password;

pub use self::certificate::{
	decode_signing_material, ed25519_pub_jwk, CertificateAuthority, CertificateClaims, Confirmation,
	CredentialGenerationError, IssuedCertificate, LocalAuthority,
	CERTIFICATE_CONTENT_TYPE,
};
pub use self::password::{CredentialStore, CredentialStoreError, SqliteCredentialStore};

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{
	accounts::{RegistrationData, UserAccount},
	error::{AccountError, ValidationError},
};

/// The authentication method new accounts are provisioned for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
pub enum AuthMethod {
	/// WebID certificates, issued from a client supplied public key.
	Tls,
	/// Password credentials, for use by the OIDC login flow.
	#[value(alias = "password")]
	Oidc,
}

/// The configured authentication method, together with the collaborator that
/// issues or stores its credentials.
#[derive(Debug, Clone)]
pub enum CredentialIssuer {
	Tls(Arc<dyn CertificateAuthority>),
	Oidc(Arc<dyn CredentialStore>),
}

impl CredentialIssuer {
	pub fn auth_method(&self) -> AuthMethod {
		match self {
			Self::Tls(_) => AuthMethod::Tls,
			Self::Oidc(_) => AuthMethod::Oidc,
		}
	}
}

/// Optional operations that only some strategies offer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Capability {
	GenerateTlsCertificate,
	RegisterPassword,
}

/// The strategy selected for one registration, with its request fields.
#[derive(Debug)]
pub enum CredentialStrategy {
	Certificate(CertificateIssuance),
	Password(PasswordRegistration),
}

impl CredentialStrategy {
	/// Picks the strategy for `issuer` and takes the fields it needs out of
	/// `data`. Fails before any I/O if a required field is missing.
	pub fn from_registration(
		issuer: &CredentialIssuer,
		data: RegistrationData,
	) -> Result<Self, ValidationError> {
		Ok(match issuer {
			CredentialIssuer::Tls(authority) => Self::Certificate(CertificateIssuance {
				authority: Arc::clone(authority),
				signing_material: data.certificate_signing_material,
				certificate: None,
			}),
			CredentialIssuer::Oidc(credential_store) => {
				let password = data
					.password
					.filter(|p| !p.is_empty())
					.ok_or(ValidationError::PasswordRequired)?;
				Self::Password(PasswordRegistration {
					credential_store: Arc::clone(credential_store),
					password,
				})
			}
		})
	}

	pub fn auth_method(&self) -> AuthMethod {
		match self {
			Self::Certificate(_) => AuthMethod::Tls,
			Self::Password(_) => AuthMethod::Oidc,
		}
	}

	pub fn capabilities(&self) -> &'static [Capability] {
		match self {
			Self::Certificate(_) => &[Capability::GenerateTlsCertificate],
			Self::Password(_) => &[Capability::RegisterPassword],
		}
	}

	pub fn supports(&self, capability: Capability) -> bool {
		self.capabilities().contains(&capability)
	}

	/// Binds the strategy's credential to `account`. Call at most once.
	pub async fn save_credentials_for(
		&mut self,
		account: &UserAccount,
	) -> Result<(), AccountError> {
		match self {
			Self::Certificate(issuance) => {
				issuance.generate_tls_certificate(account).await?;
			}
			Self::Password(registration) => {
				registration.save_credentials_for(account).await?;
			}
		}
		Ok(())
	}

	/// Undoes [`Self::save_credentials_for`] after the account could not be
	/// committed. Issued certificates cannot be recalled and are left alone.
	pub async fn discard_credentials_for(
		&self,
		account: &UserAccount,
	) -> Result<(), CredentialStoreError> {
		match self {
			Self::Certificate(_) => Ok(()),
			Self::Password(registration) => {
				registration.credential_store.delete_user(account).await
			}
		}
	}

	/// Serial of the certificate issued so far, if any.
	pub fn certificate_serial(&self) -> Option<Uuid> {
		match self {
			Self::Certificate(issuance) => {
				issuance.certificate().map(IssuedCertificate::serial)
			}
			Self::Password(_) => None,
		}
	}
}

/// Issues a WebID certificate for the client's public key.
#[derive(Debug)]
pub struct CertificateIssuance {
	authority: Arc<dyn CertificateAuthority>,
	signing_material: Option<String>,
	certificate: Option<IssuedCertificate>,
}

impl CertificateIssuance {
	pub async fn generate_tls_certificate(
		&mut self,
		account: &UserAccount,
	) -> Result<&IssuedCertificate, CredentialGenerationError> {
		let encoded = self
			.signing_material
			.as_deref()
			.ok_or(CredentialGenerationError::MissingSigningMaterial)?;
		let signing_material = decode_signing_material(encoded)?;
		let certificate = self
			.authority
			.issue(account.web_id(), &signing_material)
			.await?;
		debug!(serial = %certificate.serial(), "issued certificate");
		Ok(&*self.certificate.insert(certificate))
	}

	pub fn certificate(&self) -> Option<&IssuedCertificate> {
		self.certificate.as_ref()
	}
}

/// Registers the password captured from the request with the credential
/// store.
#[derive(derive_more::Debug)]
pub struct PasswordRegistration {
	credential_store: Arc<dyn CredentialStore>,
	#[debug(skip)]
	password: String,
}

impl PasswordRegistration {
	pub async fn save_credentials_for(
		&self,
		account: &UserAccount,
	) -> Result<(), CredentialStoreError> {
		self.credential_store
			.create_user(account, &self.password)
			.await
	}
}
