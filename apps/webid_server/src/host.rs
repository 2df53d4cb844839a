//! Maps usernames to the URIs that identify their accounts.

use url::{Host, Url};

use crate::error::ValidationError;

/// Longest username we accept. Usernames become DNS labels in multi-user mode.
pub const MAX_USERNAME_LEN: usize = 63;

/// Path of the WebID relative to the account root.
const WEB_ID_PATH: &str = "profile/card#me";

/// Resolves a username to its account URI and WebID, relative to the server's
/// public base URI.
///
/// In multi-user mode every account lives on its own subdomain
/// (`https://alice.example.org/`). In single-user mode the server root is the
/// one and only account.
#[derive(Debug, Clone)]
pub struct HostResolver {
	server_uri: Url,
	multiuser: bool,
}

impl HostResolver {
	pub fn new(server_uri: Url, multiuser: bool) -> Result<Self, HostConfigError> {
		if !matches!(server_uri.scheme(), "http" | "https") {
			return Err(HostConfigError::UnsupportedScheme(
				server_uri.scheme().to_owned(),
			));
		}
		match server_uri.host() {
			None => return Err(HostConfigError::MissingHost(server_uri)),
			Some(Host::Ipv4(_) | Host::Ipv6(_)) if multiuser => {
				return Err(HostConfigError::IpHostInMultiuser(server_uri));
			}
			Some(_) => (),
		}
		let mut server_uri = server_uri;
		server_uri.set_path("/");
		server_uri.set_query(None);
		server_uri.set_fragment(None);
		Ok(Self {
			server_uri,
			multiuser,
		})
	}

	pub fn server_uri(&self) -> &Url {
		&self.server_uri
	}

	pub fn is_multiuser(&self) -> bool {
		self.multiuser
	}

	/// The root URI of `username`'s account.
	pub fn account_uri_for(&self, username: &str) -> Result<Url, ValidationError> {
		let username = normalize_username(username)?;
		if !self.multiuser {
			return Ok(self.server_uri.clone());
		}
		let mut uri = self.server_uri.clone();
		let host = format!(
			"{username}.{}",
			self.server_uri.host_str().unwrap_or_default()
		);
		uri.set_host(Some(&host))
			.map_err(|_| ValidationError::InvalidUsername(username))?;
		Ok(uri)
	}

	/// The WebID of `username`. Always derived from [`Self::account_uri_for`].
	pub fn web_id_for(&self, username: &str) -> Result<Url, ValidationError> {
		let account_uri = self.account_uri_for(username)?;
		web_id_from_account_uri(&account_uri)
			.map_err(|_| ValidationError::InvalidUsername(username.to_owned()))
	}
}

pub(crate) fn web_id_from_account_uri(
	account_uri: &Url,
) -> Result<Url, url::ParseError> {
	account_uri.join(WEB_ID_PATH)
}

/// Trims and lowercases `raw`, then checks that it is a valid DNS label.
pub fn normalize_username(raw: &str) -> Result<String, ValidationError> {
	let username = raw.trim().to_ascii_lowercase();
	if username.is_empty() {
		return Err(ValidationError::EmptyUsername);
	}
	let valid_chars = username
		.bytes()
		.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
	if !valid_chars
		|| username.len() > MAX_USERNAME_LEN
		|| username.starts_with('-')
		|| username.ends_with('-')
	{
		return Err(ValidationError::InvalidUsername(username));
	}
	Ok(username)
}

#[derive(thiserror::Error, Debug)]
pub enum HostConfigError {
	#[error("server uri must use http or https, got {0:?}")]
	UnsupportedScheme(String),
	#[error("server uri {0} has no host")]
	MissingHost(Url),
	/// Accounts need subdomains, which an IP address does not have.
	#[error("multi-user mode needs a domain name, but server uri {0} uses an ip address")]
	IpHostInMultiuser(Url),
}
