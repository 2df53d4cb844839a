//! V1 of the API. This is subject to change until we commit to stability, after
//! which point any breaking changes will go in a V2 api.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::{
	accounts::{AccountDirectory, RegistrationData},
	create::AccountCreationRequest,
	credentials::CredentialIssuer,
	error::AccountError,
	response::PendingResponse,
	session::SessionStore,
};

/// Configuration for the V1 router.
#[derive(Debug)]
pub struct RouterConfig {
	pub directory: Arc<AccountDirectory>,
	pub issuer: CredentialIssuer,
	pub sessions: Arc<SessionStore>,
}

impl RouterConfig {
	pub async fn build(self) -> color_eyre::Result<Router> {
		Ok(Router::new()
			.route("/accounts", post(create_account))
			.with_state(RouterState {
				directory: self.directory,
				issuer: self.issuer,
				sessions: self.sessions,
			}))
	}
}

#[derive(Debug, Clone)]
struct RouterState {
	directory: Arc<AccountDirectory>,
	issuer: CredentialIssuer,
	sessions: Arc<SessionStore>,
}

#[tracing::instrument(skip_all)]
#[axum_macros::debug_handler]
async fn create_account(
	State(state): State<RouterState>,
	jar: CookieJar,
	Json(data): Json<RegistrationData>,
) -> Result<(CookieJar, PendingResponse), AccountError> {
	debug!(?data, "received registration");
	let (session_id, session) = state.sessions.begin(&jar);

	let mut response = PendingResponse::default();
	AccountCreationRequest::from_params(
		data,
		session.clone(),
		&mut response,
		Arc::clone(&state.directory),
		&state.issuer,
	)?
	.create_account()
	.await?;

	let jar = state.sessions.save(session_id, session, jar);
	Ok((jar, response))
}
