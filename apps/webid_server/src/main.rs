use std::{
	io::ErrorKind,
	net::{Ipv6Addr, SocketAddr},
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::Parser as _;
use color_eyre::eyre::{eyre, Context as _};
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use tokio::io::AsyncWriteExt as _;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;
use webid_server::{
	accounts::{AccountDirectory, SqliteAccountStorage},
	credentials::{AuthMethod, CredentialIssuer, LocalAuthority, SqliteCredentialStore},
	host::HostResolver,
	session::SessionStore,
	uuid::UuidProvider,
	MigratedDbPool,
};

#[derive(clap::Parser, Debug)]
struct Cli {
	#[clap(long, short, env, default_value = "0")]
	port: u16,
	#[clap(long, env, default_value = "identities.db")]
	db_path: PathBuf,
	/// Public base URI of this server. Account URIs and WebIDs are derived from it.
	#[clap(long, env)]
	server_uri: Url,
	/// The kind of credential that new accounts are registered with.
	#[clap(long, env, value_enum, default_value_t = AuthMethod::Oidc)]
	auth_method: AuthMethod,
	/// Give every account its own subdomain of the server uri.
	#[clap(long, env)]
	multiuser: bool,
	/// Seed of the ed25519 key that signs WebID certificates. Generated if it
	/// does not exist yet. Only used with `--auth-method tls`.
	#[clap(long, env, default_value = "ca.key")]
	ca_key_path: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or("info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cli = Cli::parse();

	let db_pool = {
		let connect_opts = sqlx::sqlite::SqliteConnectOptions::new()
			.create_if_missing(true)
			.filename(&cli.db_path);
		let pool_opts = sqlx::sqlite::SqlitePoolOptions::new();
		let pool = pool_opts
			.connect_with(connect_opts.clone())
			.await
			.wrap_err_with(|| {
				format!(
					"failed to connect to database with path {}",
					connect_opts.get_filename().display()
				)
			})?;
		MigratedDbPool::new(pool)
			.await
			.wrap_err("failed to migrate db pool")?
	};

	let host = HostResolver::new(cli.server_uri.clone(), cli.multiuser)
		.wrap_err("invalid server uri")?;
	let directory = Arc::new(AccountDirectory::new(
		host,
		Arc::new(SqliteAccountStorage::new(&db_pool)),
	));
	let issuer = match cli.auth_method {
		AuthMethod::Tls => {
			let signing_key = load_or_create_ca_key(&cli.ca_key_path).await?;
			let authority =
				LocalAuthority::new(cli.server_uri.clone(), &signing_key, UuidProvider::default())
					.wrap_err("failed to set up certificate authority")?;
			CredentialIssuer::Tls(Arc::new(authority))
		}
		AuthMethod::Oidc => {
			CredentialIssuer::Oidc(Arc::new(SqliteCredentialStore::new(&db_pool)))
		}
	};
	info!(auth_method = ?cli.auth_method, multiuser = cli.multiuser, "provisioning accounts");

	let v1_cfg = webid_server::v1::RouterConfig {
		directory,
		issuer,
		sessions: Arc::new(SessionStore::default()),
	};
	let router = webid_server::RouterConfig { v1: v1_cfg }
		.build()
		.await
		.wrap_err("failed to build router")?;

	let listener = tokio::net::TcpListener::bind(SocketAddr::new(
		Ipv6Addr::UNSPECIFIED.into(),
		cli.port,
	))
	.await
	.wrap_err("failed to bind listener")?;
	info!("listening on {}", listener.local_addr()?);
	axum::serve(listener, router).await.map_err(|e| e.into())
}

async fn load_or_create_ca_key(path: &Path) -> color_eyre::Result<SigningKey> {
	match tokio::fs::read(path).await {
		Ok(bytes) => {
			let seed: [u8; SECRET_KEY_LENGTH] =
				bytes.as_slice().try_into().map_err(|_| {
					eyre!(
						"expected {SECRET_KEY_LENGTH} bytes in {} but found {}",
						path.display(),
						bytes.len()
					)
				})?;
			if let Ok(metadata) = tokio::fs::metadata(path).await {
				warn_if_exposed(path, &metadata);
			}
			Ok(SigningKey::from_bytes(&seed))
		}
		Err(err) if err.kind() == ErrorKind::NotFound => {
			warn!(path = %path.display(), "no certificate authority key, generating one");
			let key = SigningKey::generate(&mut rand::rngs::OsRng);
			write_private(path, &key.to_bytes())
				.await
				.wrap_err_with(|| format!("failed to write {}", path.display()))?;
			Ok(key)
		}
		Err(err) => {
			Err(err).wrap_err_with(|| format!("failed to read {}", path.display()))
		}
	}
}

/// Creates `path`, readable and writable only by the owner. Fails if it exists.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	let mut opts = tokio::fs::OpenOptions::new();
	opts.write(true).create_new(true);
	#[cfg(unix)]
	opts.mode(0o600);
	let mut file = opts.open(path).await?;
	file.write_all(contents).await?;
	file.sync_all().await
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path, metadata: &std::fs::Metadata) {
	use std::os::unix::fs::PermissionsExt as _;

	let mode = metadata.permissions().mode();
	if mode & 0o077 != 0 {
		warn!(
			path = %path.display(),
			"certificate authority key is accessible to other users (mode {:o}), restrict it to 0600",
			mode & 0o777
		);
	}
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path, _metadata: &std::fs::Metadata) {}
