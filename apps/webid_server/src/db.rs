use sqlx::{migrate::Migrator, SqlitePool};

static MIGRATOR: Migrator = sqlx::migrate!();

/// A database pool whose schema is known to be up to date.
#[derive(Debug, Clone)]
pub struct MigratedDbPool(SqlitePool);

impl MigratedDbPool {
	pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::migrate::MigrateError> {
		MIGRATOR.run(&pool).await?;
		Ok(Self(pool))
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.0
	}

	/// Fresh in-memory database. A single connection is kept alive for the whole
	/// test, since every connection to `:memory:` gets its own database.
	#[cfg(test)]
	pub async fn in_memory() -> Self {
		let pool = sqlx::sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect("sqlite::memory:")
			.await
			.expect("failed to open in-memory sqlite");
		Self::new(pool).await.expect("failed to migrate")
	}
}
