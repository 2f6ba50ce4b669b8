//! [`BackingStore`] over a `PostgreSQL` connection pool.

use crate::schema::CLEAR_ORDERS;
use boxoffice_core::backing_store::StoreFuture;
use boxoffice_core::{
    ArtistId, ArtistRow, BackingStore, BackingStoreError, CatalogRows, ExportedOrder, Order,
    OrderId, SaleSummary, StockId, StockRow, StoreSnapshot, TicketId, TicketRow, VariationId,
    VariationRow,
};
use sqlx::Row;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use std::time::{Duration, Instant};

/// Connection pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a connection before giving up
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL-backed [`BackingStore`].
///
/// Reads happen at startup and on an administrative reset; writes come from
/// the write-behind consumer one order at a time.
///
/// # Tables
///
/// | Table           | Columns                                                   |
/// |-----------------|-----------------------------------------------------------|
/// | `artist`        | `id`, `name`                                              |
/// | `ticket`        | `id`, `name`, `artist_id`                                 |
/// | `variation`     | `id`, `name`, `ticket_id`                                 |
/// | `stock`         | `id`, `variation_id`, `seat_id`, `order_id`, `updated_at` |
/// | `order_request` | `id`, `member_id`                                         |
///
/// # Example
///
/// ```ignore
/// use boxoffice_postgres::PostgresBackingStore;
///
/// let store = PostgresBackingStore::new("postgres://localhost/boxoffice").await?;
/// store.migrate().await?;
/// let snapshot = store.load_snapshot(10).await?;
/// ```
#[derive(Clone)]
pub struct PostgresBackingStore {
    pool: PgPool,
    initial_data: Option<String>,
}

impl std::fmt::Debug for PostgresBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackingStore")
            .field("pool_size", &self.pool.size())
            .field("initial_data", &self.initial_data.as_ref().map(String::len))
            .finish()
    }
}

impl PostgresBackingStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`BackingStoreError::Unavailable`] if no connection can be made.
    pub async fn new(database_url: &str) -> Result<Self, BackingStoreError> {
        Self::connect_with(database_url, PoolSettings::default()).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`BackingStoreError::Unavailable`] if no connection can be made.
    pub async fn connect_with(
        database_url: &str,
        settings: PoolSettings,
    ) -> Result<Self, BackingStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| BackingStoreError::Unavailable(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            initial_data: None,
        }
    }

    /// Run `script` on [`BackingStore::reinitialize`] instead of only clearing
    /// orders. The script may contain several statements.
    #[must_use]
    pub fn with_initial_data(mut self, script: impl Into<String>) -> Self {
        self.initial_data = Some(script.into());
        self
    }

    /// Create the schema if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackingStoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), BackingStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BackingStoreError::Database(format!("Migration failed: {e}")))
    }

    /// Run an arbitrary multi-statement script, e.g. to seed a dataset.
    ///
    /// # Errors
    ///
    /// Returns a [`BackingStoreError`] if any statement fails.
    pub async fn execute_script(&self, script: &str) -> Result<(), BackingStoreError> {
        sqlx::raw_sql(script)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| store_error("script", e))
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn snapshot(&self, recent_limit: usize) -> Result<StoreSnapshot, BackingStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin snapshot", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("set isolation", e))?;

        let catalog = load_catalog(&mut *tx).await?;

        let unsold = sqlx::query(
            "SELECT id, variation_id, seat_id FROM stock WHERE order_id IS NULL ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("load unsold stock", e))?
        .iter()
        .map(|row| {
            Ok(StockRow {
                id: StockId::new(column(row, "id")?),
                variation_id: VariationId::new(column(row, "variation_id")?),
                seat_label: column(row, "seat_id")?,
            })
        })
        .collect::<Result<Vec<_>, BackingStoreError>>()?;

        let max_order_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM order_request")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| store_error("load max order id", e))?;

        let limit = i64::try_from(recent_limit).unwrap_or(i64::MAX);
        let recent_sales = sqlx::query(
            r"
            SELECT stock.order_id, stock.seat_id,
                   variation.name AS variation_name,
                   ticket.name AS ticket_name,
                   artist.name AS artist_name
            FROM stock
            JOIN variation ON stock.variation_id = variation.id
            JOIN ticket ON variation.ticket_id = ticket.id
            JOIN artist ON ticket.artist_id = artist.id
            WHERE stock.order_id IS NOT NULL
            ORDER BY stock.order_id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("load recent sales", e))?
        .iter()
        .map(|row| {
            Ok(SaleSummary {
                order_id: OrderId::new(column(row, "order_id")?),
                artist_name: column(row, "artist_name")?,
                ticket_name: column(row, "ticket_name")?,
                variation_name: column(row, "variation_name")?,
                seat_label: column(row, "seat_id")?,
            })
        })
        .collect::<Result<Vec<_>, BackingStoreError>>()?;

        tx.commit()
            .await
            .map_err(|e| store_error("commit snapshot", e))?;

        Ok(StoreSnapshot {
            catalog,
            unsold,
            max_order_id: max_order_id.map_or(OrderId::SOLD_OUT, OrderId::new),
            recent_sales,
        })
    }

    async fn insert_order(&self, order: &Order) -> Result<(), BackingStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin order", e))?;

        // A retry after a lost commit acknowledgement replays the same order.
        sqlx::query(
            "INSERT INTO order_request (id, member_id) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(order.id.get())
        .bind(&order.member_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("insert order", e))?;

        let updated = sqlx::query(
            r"
            UPDATE stock SET order_id = $1, updated_at = now()
            WHERE id = $2 AND (order_id IS NULL OR order_id = $1)
            ",
        )
        .bind(order.id.get())
        .bind(order.seat.stock_id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("assign seat", e))?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back the order row.
            return Err(BackingStoreError::InvalidData(format!(
                "stock row {} does not exist or belongs to another order",
                order.seat.stock_id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| store_error("commit order", e))
    }

    async fn orders(&self) -> Result<Vec<ExportedOrder>, BackingStoreError> {
        sqlx::query(
            r"
            SELECT order_request.id, order_request.member_id,
                   stock.seat_id, stock.variation_id, stock.updated_at
            FROM order_request
            JOIN stock ON order_request.id = stock.order_id
            ORDER BY order_request.id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("export orders", e))?
        .iter()
        .map(|row| {
            Ok(ExportedOrder {
                order_id: OrderId::new(column(row, "id")?),
                member_id: column(row, "member_id")?,
                seat_label: column(row, "seat_id")?,
                variation_id: VariationId::new(column(row, "variation_id")?),
                updated_at: column(row, "updated_at")?,
            })
        })
        .collect()
    }

    async fn restore(&self) -> Result<(), BackingStoreError> {
        let script = self.initial_data.as_deref().unwrap_or(CLEAR_ORDERS);
        tracing::info!(
            custom_script = self.initial_data.is_some(),
            "Reinitializing backing store"
        );
        self.execute_script(script).await
    }
}

async fn load_catalog(conn: &mut PgConnection) -> Result<CatalogRows, BackingStoreError> {
    let artists = sqlx::query("SELECT id, name FROM artist ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| store_error("load artists", e))?
        .iter()
        .map(|row| {
            Ok(ArtistRow {
                id: ArtistId::new(column(row, "id")?),
                name: column(row, "name")?,
            })
        })
        .collect::<Result<Vec<_>, BackingStoreError>>()?;

    let tickets = sqlx::query("SELECT id, name, artist_id FROM ticket ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| store_error("load tickets", e))?
        .iter()
        .map(|row| {
            Ok(TicketRow {
                id: TicketId::new(column(row, "id")?),
                name: column(row, "name")?,
                artist_id: ArtistId::new(column(row, "artist_id")?),
            })
        })
        .collect::<Result<Vec<_>, BackingStoreError>>()?;

    let variations = sqlx::query("SELECT id, name, ticket_id FROM variation ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| store_error("load variations", e))?
        .iter()
        .map(|row| {
            Ok(VariationRow {
                id: VariationId::new(column(row, "id")?),
                name: column(row, "name")?,
                ticket_id: TicketId::new(column(row, "ticket_id")?),
            })
        })
        .collect::<Result<Vec<_>, BackingStoreError>>()?;

    Ok(CatalogRows {
        artists,
        tickets,
        variations,
    })
}

fn column<T>(row: &PgRow, name: &str) -> Result<T, BackingStoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| BackingStoreError::InvalidData(format!("column {name}: {e}")))
}

/// Classify a sqlx error. Pool and socket failures are transient; decode
/// failures mean the stored data is wrong.
fn store_error(context: &str, err: sqlx::Error) -> BackingStoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            BackingStoreError::Unavailable(format!("{context}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::RowNotFound => BackingStoreError::InvalidData(format!("{context}: {err}")),
        _ => BackingStoreError::Database(format!("{context}: {err}")),
    }
}

fn record_query(operation: &'static str, started: Instant, ok: bool) {
    metrics::histogram!("backing_store_query_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if !ok {
        metrics::counter!("backing_store_errors_total", "operation" => operation).increment(1);
    }
}

impl BackingStore for PostgresBackingStore {
    fn load_snapshot(&self, recent_limit: usize) -> StoreFuture<'_, StoreSnapshot> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.snapshot(recent_limit).await;
            record_query("load_snapshot", started, result.is_ok());
            if let Ok(snapshot) = &result {
                tracing::info!(
                    artists = snapshot.catalog.artists.len(),
                    unsold = snapshot.unsold.len(),
                    max_order_id = %snapshot.max_order_id,
                    "Loaded snapshot"
                );
            }
            result
        })
    }

    fn record_sale(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.insert_order(&order).await;
            record_query("record_sale", started, result.is_ok());
            tracing::debug!(order_id = %order.id, ok = result.is_ok(), "Recorded sale");
            result
        })
    }

    fn export_orders(&self) -> StoreFuture<'_, Vec<ExportedOrder>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.orders().await;
            record_query("export_orders", started, result.is_ok());
            result
        })
    }

    fn reinitialize(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.restore().await;
            record_query("reinitialize", started, result.is_ok());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            store_error("load", sqlx::Error::PoolTimedOut),
            BackingStoreError::Unavailable(_)
        ));
        assert!(matches!(
            store_error("load", sqlx::Error::PoolClosed),
            BackingStoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_decode_errors_are_invalid_data() {
        let err = store_error("load", sqlx::Error::ColumnNotFound("seat_id".into()));
        assert!(matches!(err, BackingStoreError::InvalidData(msg) if msg.contains("seat_id")));
    }

    #[test]
    fn test_other_errors_are_database() {
        let err = store_error("insert order", sqlx::Error::Protocol("bad message".into()));
        assert!(matches!(err, BackingStoreError::Database(msg) if msg.starts_with("insert order: ")));
    }

    #[test]
    fn test_default_pool_settings() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 10);
        assert!(settings.min_connections <= settings.max_connections);
    }
}
