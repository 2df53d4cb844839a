//! Server side sessions, identified by a cookie.

use std::sync::{Arc, Mutex, PoisonError};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use url::Url;
use uuid::Uuid;

use crate::{accounts::UserAccount, uuid::UuidProvider};

/// What a session knows about its user.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SessionData {
	pub username: Option<String>,
	pub web_id: Option<Url>,
}

/// Handle to one session. Clones share state, so changes made while handling
/// a request are visible to whoever holds the session afterwards.
#[derive(Debug, Clone, Default)]
pub struct Session {
	data: Arc<Mutex<SessionData>>,
}

impl Session {
	/// Marks `account` as the logged in user of this session.
	pub fn sign_in(&self, account: &UserAccount) {
		let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
		data.username = Some(account.username().to_owned());
		data.web_id = Some(account.web_id().clone());
	}

	pub fn web_id(&self) -> Option<Url> {
		self.snapshot().web_id
	}

	pub fn snapshot(&self) -> SessionData {
		self.data
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

/// All live sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
	sessions: DashMap<Uuid, Session>,
	ids: UuidProvider,
}

impl SessionStore {
	pub const COOKIE: &'static str = "session";

	pub fn new(ids: UuidProvider) -> Self {
		Self {
			sessions: DashMap::new(),
			ids,
		}
	}

	/// The session named by the request's cookie, or a fresh one that is not
	/// stored until [`Self::save`] is called.
	pub fn begin(&self, jar: &CookieJar) -> (Uuid, Session) {
		let existing = jar
			.get(Self::COOKIE)
			.and_then(|cookie| cookie.value().parse::<Uuid>().ok())
			.and_then(|id| self.get(&id).map(|session| (id, session)));
		existing.unwrap_or_else(|| (self.ids.next_v4(), Session::default()))
	}

	pub fn get(&self, id: &Uuid) -> Option<Session> {
		self.sessions.get(id).map(|entry| entry.value().clone())
	}

	/// Stores the session and adds its cookie to `jar`.
	pub fn save(&self, id: Uuid, session: Session, jar: CookieJar) -> CookieJar {
		self.sessions.insert(id, session);
		jar.add(
			Cookie::build((Self::COOKIE, id.to_string()))
				.path("/")
				.http_only(true)
				.same_site(SameSite::Lax),
		)
	}
}
