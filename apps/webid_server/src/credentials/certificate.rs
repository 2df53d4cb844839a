//! WebID certificates.
//!
//! A certificate is a compact JWS signed by the server's ed25519 key. It binds
//! the account's WebID (`sub`) to the public key the client registered with,
//! which is embedded as a JWK in the `cnf` claim (see RFC 7800).

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use axum::async_trait;
use base64::Engine as _;
use ed25519_dalek::{
	pkcs8::EncodePrivateKey as _, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH,
};
use jose_jwk::Jwk;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::uuid::UuidProvider;

/// Media type of the serialized certificate.
pub const CERTIFICATE_CONTENT_TYPE: &str = "application/jwt";

/// Issues signed identity certificates from client supplied signing material.
#[async_trait]
pub trait CertificateAuthority: std::fmt::Debug + Send + Sync + 'static {
	async fn issue(
		&self,
		web_id: &Url,
		signing_material: &[u8],
	) -> Result<IssuedCertificate, CredentialGenerationError>;
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialGenerationError {
	#[error("certificate signing material is required")]
	MissingSigningMaterial,
	#[error(
		"certificate signing material must be a {} byte ed25519 public key",
		PUBLIC_KEY_LENGTH
	)]
	MalformedSigningMaterial,
	#[error("public key rejected: {0}")]
	RejectedKey(&'static str),
	#[error("certificate authority failed to sign")]
	Signing(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A certificate that was signed for one WebID.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IssuedCertificate {
	serial: Uuid,
	web_id: Url,
	expires_at: u64,
	token: String,
}

impl IssuedCertificate {
	/// Unique id of the certificate, also its `jti` claim.
	pub fn serial(&self) -> Uuid {
		self.serial
	}

	pub fn web_id(&self) -> &Url {
		&self.web_id
	}

	/// Unix timestamp, in seconds.
	pub fn expires_at(&self) -> u64 {
		self.expires_at
	}

	/// The compact serialized JWS.
	pub fn as_str(&self) -> &str {
		&self.token
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateClaims {
	pub iss: String,
	pub sub: String,
	pub jti: Uuid,
	pub iat: u64,
	pub nbf: u64,
	pub exp: u64,
	pub cnf: Confirmation,
}

/// Proof-of-possession key of the certificate subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
	pub jwk: Jwk,
}

/// A [`CertificateAuthority`] that signs with a key held by this server.
#[derive(derive_more::Debug)]
pub struct LocalAuthority {
	issuer: Url,
	#[debug(skip)]
	encoding_key: Arc<EncodingKey>,
	verifying_key: VerifyingKey,
	validity: Duration,
	serials: UuidProvider,
}

impl LocalAuthority {
	pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

	pub fn new(
		issuer: Url,
		signing_key: &SigningKey,
		serials: UuidProvider,
	) -> Result<Self, CredentialGenerationError> {
		let der = signing_key
			.to_pkcs8_der()
			.map_err(|err| CredentialGenerationError::Signing(err.to_string().into()))?;
		Ok(Self {
			issuer,
			encoding_key: Arc::new(EncodingKey::from_ed_der(der.as_bytes())),
			verifying_key: signing_key.verifying_key(),
			validity: Self::DEFAULT_VALIDITY,
			serials,
		})
	}

	pub fn with_validity(mut self, validity: Duration) -> Self {
		self.validity = validity;
		self
	}

	/// The key that certificates can be verified with.
	pub fn verifying_key(&self) -> VerifyingKey {
		self.verifying_key
	}

	pub fn issuer(&self) -> &Url {
		&self.issuer
	}
}

#[async_trait]
impl CertificateAuthority for LocalAuthority {
	#[tracing::instrument(skip_all, fields(%web_id))]
	async fn issue(
		&self,
		web_id: &Url,
		signing_material: &[u8],
	) -> Result<IssuedCertificate, CredentialGenerationError> {
		let subject_key = subject_key_from(signing_material)?;
		let now = jsonwebtoken::get_current_timestamp();
		let claims = CertificateClaims {
			iss: self.issuer.to_string(),
			sub: web_id.to_string(),
			jti: self.serials.next_v4(),
			iat: now,
			nbf: now,
			exp: now.saturating_add(self.validity.as_secs()),
			cnf: Confirmation {
				jwk: ed25519_pub_jwk(&subject_key),
			},
		};
		let (serial, expires_at) = (claims.jti, claims.exp);

		let encoding_key = Arc::clone(&self.encoding_key);
		let token = tokio::task::spawn_blocking(move || {
			jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &encoding_key)
		})
		.await
		.map_err(|err| CredentialGenerationError::Signing(err.into()))?
		.map_err(|err| CredentialGenerationError::Signing(err.into()))?;
		debug!(%serial, "signed certificate");

		Ok(IssuedCertificate {
			serial,
			web_id: web_id.clone(),
			expires_at,
			token,
		})
	}
}

/// Decodes signing material as sent over the wire: base64url, padding optional.
pub fn decode_signing_material(encoded: &str) -> Result<Vec<u8>, CredentialGenerationError> {
	base64::prelude::BASE64_URL_SAFE_NO_PAD
		.decode(encoded.trim().trim_end_matches('='))
		.map_err(|_| CredentialGenerationError::MalformedSigningMaterial)
}

/// Parses and vets the client's public key.
fn subject_key_from(
	signing_material: &[u8],
) -> Result<VerifyingKey, CredentialGenerationError> {
	let bytes: &[u8; PUBLIC_KEY_LENGTH] = signing_material
		.try_into()
		.map_err(|_| CredentialGenerationError::MalformedSigningMaterial)?;
	let key = VerifyingKey::from_bytes(bytes).map_err(|_| {
		CredentialGenerationError::RejectedKey("not a point on the ed25519 curve")
	})?;
	// Low order keys produce signatures that verify for almost any message.
	if key.is_weak() {
		return Err(CredentialGenerationError::RejectedKey("key has low order"));
	}
	Ok(key)
}

/// Creates a JWK from an ed25519 verifying key.
pub fn ed25519_pub_jwk(pub_key: &VerifyingKey) -> Jwk {
	Jwk {
		key: jose_jwk::Okp {
			crv: jose_jwk::OkpCurves::Ed25519,
			x: pub_key.as_bytes().as_slice().to_owned().into(),
			d: None,
		}
		.into(),
		prm: jose_jwk::Parameters {
			ops: Some(BTreeSet::from([jose_jwk::Operations::Verify])),
			..Default::default()
		},
	}
}

#[cfg(test)]
mod test {
	use jsonwebtoken::{DecodingKey, Validation};

	use super::*;

	const CA_SEED: [u8; 32] = [7; 32];
	const SUBJECT_SEED: [u8; 32] = [42; 32];

	fn authority(serials: Vec<Uuid>) -> LocalAuthority {
		LocalAuthority::new(
			"https://example.org/".parse().unwrap(),
			&SigningKey::from_bytes(&CA_SEED),
			UuidProvider::new_from_sequence(serials),
		)
		.unwrap()
	}

	fn subject_key() -> VerifyingKey {
		SigningKey::from_bytes(&SUBJECT_SEED).verifying_key()
	}

	fn decode(ca: &LocalAuthority, token: &str) -> CertificateClaims {
		let x = base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(ca.verifying_key().as_bytes());
		let key = DecodingKey::from_ed_components(&x).unwrap();
		let mut validation = Validation::new(Algorithm::EdDSA);
		validation.set_issuer(&[ca.issuer().as_str()]);
		validation.set_required_spec_claims(&["exp", "sub", "iss"]);
		jsonwebtoken::decode::<CertificateClaims>(token, &key, &validation)
			.unwrap()
			.claims
	}

	#[tokio::test]
	async fn issued_certificate_binds_web_id_to_key() {
		let serial = Uuid::new_v4();
		let ca = authority(vec![serial]);
		let web_id: Url = "https://alice.example.org/profile/card#me".parse().unwrap();

		let cert = ca.issue(&web_id, subject_key().as_bytes()).await.unwrap();
		assert_eq!(cert.serial(), serial);
		assert_eq!(cert.web_id(), &web_id);

		let claims = decode(&ca, cert.as_str());
		assert_eq!(claims.sub, web_id.as_str());
		assert_eq!(claims.jti, serial);
		assert_eq!(claims.exp, cert.expires_at());
		assert_eq!(
			claims.exp - claims.iat,
			LocalAuthority::DEFAULT_VALIDITY.as_secs()
		);
		assert_eq!(claims.cnf.jwk, ed25519_pub_jwk(&subject_key()));
	}

	#[tokio::test]
	async fn certificate_from_other_authority_does_not_verify() {
		let ca = authority(vec![Uuid::new_v4()]);
		let impostor = LocalAuthority::new(
			ca.issuer().clone(),
			&SigningKey::from_bytes(&[8; 32]),
			UuidProvider::new_random(),
		)
		.unwrap();
		let web_id: Url = "https://alice.example.org/profile/card#me".parse().unwrap();
		let forged = impostor
			.issue(&web_id, subject_key().as_bytes())
			.await
			.unwrap();

		let x = base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(ca.verifying_key().as_bytes());
		let key = DecodingKey::from_ed_components(&x).unwrap();
		let validation = Validation::new(Algorithm::EdDSA);
		assert!(
			jsonwebtoken::decode::<CertificateClaims>(forged.as_str(), &key, &validation)
				.is_err()
		);
	}

	#[tokio::test]
	async fn malformed_signing_material_is_rejected() {
		let ca = authority(vec![Uuid::new_v4()]);
		let web_id: Url = "https://alice.example.org/profile/card#me".parse().unwrap();
		let materials: [&[u8]; 3] = [
			&[],
			&[1; PUBLIC_KEY_LENGTH - 1],
			&[1; PUBLIC_KEY_LENGTH + 1],
		];
		for material in materials {
			assert!(matches!(
				ca.issue(&web_id, material).await,
				Err(CredentialGenerationError::MalformedSigningMaterial)
			));
		}
	}

	#[tokio::test]
	async fn weak_keys_are_rejected() {
		let ca = authority(vec![Uuid::new_v4()]);
		let web_id: Url = "https://alice.example.org/profile/card#me".parse().unwrap();
		// Compressed encoding of the identity point, which has order 1.
		let mut identity = [0; PUBLIC_KEY_LENGTH];
		identity[0] = 1;
		assert!(matches!(
			ca.issue(&web_id, &identity).await,
			Err(CredentialGenerationError::RejectedKey(_))
		));
	}

	#[test]
	fn signing_material_padding_is_optional() {
		let key = subject_key();
		let unpadded = base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(key.as_bytes());
		let padded = base64::prelude::BASE64_URL_SAFE.encode(key.as_bytes());
		assert_ne!(unpadded, padded);
		for encoded in [unpadded, padded] {
			assert_eq!(decode_signing_material(&encoded).unwrap(), key.as_bytes());
		}
		assert!(matches!(
			decode_signing_material("not base64!"),
			Err(CredentialGenerationError::MalformedSigningMaterial)
		));
	}

	#[test]
	fn pub_jwk_test_vectors() {
		// See https://datatracker.ietf.org/doc/html/rfc8037#appendix-A.2
		let rfc_example = serde_json::json!({
			"kty": "OKP",
			"crv": "Ed25519",
			"x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
		});
		let pubkey_bytes = hex_literal::hex!(
			"d7 5a 98 01 82 b1 0a b7 d5 4b fe d3 c9 64 07 3a
            0e e1 72 f3 da a6 23 25 af 02 1a 68 f7 07 51 1a"
		);
		let key = VerifyingKey::from_bytes(&pubkey_bytes).unwrap();
		let mut jwk = ed25519_pub_jwk(&key);
		assert_eq!(
			jwk.prm.ops.take().unwrap(),
			BTreeSet::from([jose_jwk::Operations::Verify]),
			"certificate subject keys should only be usable for verification"
		);
		assert_eq!(serde_json::to_value(&jwk).unwrap(), rfc_example);
		assert_eq!(serde_json::from_value::<Jwk>(rfc_example).unwrap(), jwk);
	}
}
