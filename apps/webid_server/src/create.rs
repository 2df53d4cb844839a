//! The account creation pipeline.
//!
//! One [`AccountCreationRequest`] is built per registration attempt:
//!
//! 1. [`AccountCreationRequest::from_params`] validates the input and picks the
//!    configured credential strategy. Nothing has been touched yet if this fails.
//! 2. [`AccountCreationRequest::create_account`] checks that the account does not
//!    exist, saves its credentials, commits the account record, signs the user
//!    into the session and fills in the response.
//!
//! Any error ends the pipeline and is returned as is. Nothing is retried. If the
//! account record cannot be committed, the password saved for it is deleted
//! again. Issued certificates stay issued.

use std::sync::Arc;

use axum::http::{
	header::{CONTENT_TYPE, LOCATION},
	HeaderName, HeaderValue, StatusCode,
};
use bytes::Bytes;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
	accounts::{AccountDirectory, RegistrationData, UserAccount},
	credentials::{
		AuthMethod, Capability, CertificateIssuance, CredentialIssuer, CredentialStrategy,
		CERTIFICATE_CONTENT_TYPE,
	},
	error::AccountError,
	response::ResponseSink,
	session::Session,
};

/// Response header naming the WebID of the new account.
pub const USER_HEADER: HeaderName = HeaderName::from_static("user");

/// A single attempt to create an account.
#[derive(Debug)]
pub struct AccountCreationRequest<'r, R> {
	directory: Arc<AccountDirectory>,
	user_account: UserAccount,
	session: Session,
	response: &'r mut R,
	strategy: CredentialStrategy,
}

impl<'r, R: ResponseSink> AccountCreationRequest<'r, R> {
	/// Validates `data` for the configured `issuer`. Fails without doing any I/O.
	pub fn from_params(
		data: RegistrationData,
		session: Session,
		response: &'r mut R,
		directory: Arc<AccountDirectory>,
		issuer: &CredentialIssuer,
	) -> Result<Self, AccountError> {
		let user_account = directory.user_account_from(&data)?;
		let strategy = CredentialStrategy::from_registration(issuer, data)?;
		Ok(Self {
			directory,
			user_account,
			session,
			response,
			strategy,
		})
	}

	pub fn user_account(&self) -> &UserAccount {
		&self.user_account
	}

	pub fn auth_method(&self) -> AuthMethod {
		self.strategy.auth_method()
	}

	pub fn supports(&self, capability: Capability) -> bool {
		self.strategy.supports(capability)
	}

	/// Certificate generation, if this request's strategy offers it.
	pub fn tls_certificate_generator(&mut self) -> Option<&mut CertificateIssuance> {
		match &mut self.strategy {
			CredentialStrategy::Certificate(issuance) => Some(issuance),
			CredentialStrategy::Password(_) => None,
		}
	}

	/// Runs the pipeline. On success the response has been filled in and the new
	/// account is returned.
	#[tracing::instrument(
		skip_all,
		fields(username = self.user_account.username(), method = ?self.auth_method())
	)]
	pub async fn create_account(mut self) -> Result<UserAccount, AccountError> {
		if self.directory.account_exists(&self.user_account).await? {
			return Err(AccountError::AccountExists {
				username: self.user_account.username().to_owned(),
			});
		}
		self.strategy
			.save_credentials_for(&self.user_account)
			.await?;
		let committed = self
			.directory
			.commit(&self.user_account, self.strategy.certificate_serial())
			.await;
		if let Err(err) = committed {
			// Uncommitted accounts keep no credentials.
			if let Err(cleanup) = self
				.strategy
				.discard_credentials_for(&self.user_account)
				.await
			{
				error!("failed to discard credentials of uncommitted account: {cleanup:?}");
			}
			return Err(err);
		}
		self.session.sign_in(&self.user_account);
		self.send_response();
		info!(web_id = %self.user_account.web_id(), "created account");
		Ok(self.user_account)
	}

	/// Fills in a `201 Created` response pointing at the new account.
	pub fn send_response(&mut self) {
		let account = &self.user_account;
		self.response.set_status(StatusCode::CREATED);
		set_uri_header(&mut *self.response, LOCATION, account.account_uri().as_str());
		set_uri_header(&mut *self.response, USER_HEADER, account.web_id().as_str());

		let (content_type, body) = match &self.strategy {
			CredentialStrategy::Certificate(issuance) => match issuance.certificate() {
				Some(cert) => (
					CERTIFICATE_CONTENT_TYPE,
					Bytes::from(cert.as_str().to_owned()),
				),
				None => {
					warn!("responding without a certificate, none was issued");
					(CERTIFICATE_CONTENT_TYPE, Bytes::new())
				}
			},
			CredentialStrategy::Password(_) => (
				"application/json",
				Bytes::from(
					json!({
						"username": account.username(),
						"webId": account.web_id(),
						"accountUri": account.account_uri(),
					})
					.to_string(),
				),
			),
		};
		self.response
			.set_header(CONTENT_TYPE, HeaderValue::from_static(content_type));
		self.response.send(body);
	}
}

fn set_uri_header(response: &mut impl ResponseSink, name: HeaderName, uri: &str) {
	match HeaderValue::from_str(uri) {
		Ok(value) => response.set_header(name, value),
		Err(err) => warn!(%name, uri, "uri is not a valid header value: {err}"),
	}
}
