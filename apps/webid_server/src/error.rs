//! The error type shared by every phase of account creation.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde_json::json;
use tracing::error;

use crate::{
	accounts::StorageError,
	credentials::{CredentialGenerationError, CredentialStoreError},
};

/// Malformed or missing input. Always detected before any I/O happens.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
	#[error("Username required")]
	EmptyUsername,
	#[error(
		"invalid username {0:?}: use 1 to 63 lowercase letters, digits or hyphens, not starting or ending with a hyphen"
	)]
	InvalidUsername(String),
	#[error("Password required")]
	PasswordRequired,
}

/// Everything that can go wrong while creating an account, whether it was
/// detected synchronously at construction or later in the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AccountError {
	#[error(transparent)]
	Validation(#[from] ValidationError),
	#[error("account {username:?} already exists")]
	AccountExists { username: String },
	#[error(transparent)]
	CredentialGeneration(#[from] CredentialGenerationError),
	#[error(transparent)]
	CredentialStore(#[from] CredentialStoreError),
	#[error("account storage is unavailable")]
	StorageUnavailable(#[source] StorageError),
}

impl AccountError {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::CredentialGeneration(CredentialGenerationError::Signing(_)) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
			Self::Validation(_)
			| Self::AccountExists { .. }
			| Self::CredentialGeneration(_) => StatusCode::BAD_REQUEST,
			Self::CredentialStore(CredentialStoreError::Duplicate { .. }) => {
				StatusCode::BAD_REQUEST
			}
			Self::CredentialStore(_) | Self::StorageUnavailable(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}

	/// Message that is safe to show to the client.
	pub fn public_message(&self) -> String {
		match self {
			Self::CredentialGeneration(err @ CredentialGenerationError::Signing(_)) => {
				err.to_string()
			}
			Self::Validation(_)
			| Self::AccountExists { .. }
			| Self::CredentialGeneration(_) => self.to_string(),
			Self::CredentialStore(err @ CredentialStoreError::Duplicate { .. }) => {
				err.to_string()
			}
			Self::CredentialStore(_) => String::from("failed to store credentials"),
			Self::StorageUnavailable(_) => self.to_string(),
		}
	}
}

impl IntoResponse for AccountError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!("{self:?}");
		} else {
			tracing::info!(%status, "rejected account creation: {self}");
		}
		(status, Json(json!({ "error": self.public_message() }))).into_response()
	}
}
