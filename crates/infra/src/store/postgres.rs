//! Postgres-backed ticketing store.
//!
//! Every unit is one `READ COMMITTED` transaction. Rows read inside a unit are
//! taken `FOR UPDATE`, so writers on the same event or booking queue behind the
//! row lock and then see the committed row; the seat decrement is a single
//! conditional `UPDATE` on top of that. A unit therefore ends in a domain outcome
//! (`InsufficientInventory`, `AlreadyCancelled`) rather than a serialization
//! failure when it loses a race. Deadlocks still surface as `Serialization`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | TicketingError |
//! |------------|----------------------|----------------|
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Serialization` |
//! | Database (unique violation on a name index) | `23505` | `Domain(DuplicateName)` |
//! | Database (other unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Domain(Conflict)` |
//! | Database (check constraint violation) | `23514` | `Domain(InvariantViolation)` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Other | N/A | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use horizon_core::{
    BookingId, CategoryId, DomainError, EventId, TicketClassId, UserId,
};
use horizon_ticketing::{
    Booking, BookingStatus, Category, Event, InventoryLedger, Release, TicketClass, TicketType,
};

use super::{StoreUnit, TicketingStore};
use crate::error::{TicketingError, TicketingResult};

const EVENT_SELECT: &str = r#"
    SELECT
        id,
        host_id,
        category_id,
        category_name,
        name,
        description,
        location,
        image_url,
        event_date,
        start_time,
        end_time,
        created_at
    FROM events
"#;

const BOOKING_SELECT: &str = r#"
    SELECT
        id,
        user_id,
        event_id,
        ticket_class_id,
        ticket_type,
        transaction_id,
        quantity,
        total_paid,
        status,
        booked_at,
        cancelled_at
    FROM bookings
"#;

const CATEGORY_SELECT: &str = "SELECT id, name, created_at FROM categories";

/// Postgres-backed ticketing store.
///
/// Uses the SQLx connection pool, which is thread-safe; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresTicketingStore {
    pool: Arc<PgPool>,
}

impl PostgresTicketingStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `url`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> TicketingResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> TicketingResult<()> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| TicketingError::Backend(format!("migration failed: {e}")))?;
        Ok(())
    }

    async fn acquire(&self, operation: &str) -> TicketingResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn fetch_events(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> TicketingResult<Vec<Event>> {
        let mut conn = self.acquire(operation).await?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        hydrate_events(&mut conn, rows).await
    }

    async fn fetch_bookings(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> TicketingResult<Vec<Booking>> {
        let mut conn = self.acquire(operation).await?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn fetch_categories(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> TicketingResult<Vec<Category>> {
        let mut conn = self.acquire(operation).await?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(category_from_row).collect()
    }
}

/// Atomic unit over [`PostgresTicketingStore`]: one read-committed transaction.
///
/// Dropping it without `commit` rolls the transaction back.
#[derive(Debug)]
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TicketingStore for PostgresTicketingStore {
    type Unit = PostgresUnit;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> TicketingResult<Self::Unit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PostgresUnit { tx })
    }

    #[instrument(skip(self), fields(event_id = %id), err)]
    async fn event(&self, id: EventId) -> TicketingResult<Option<Event>> {
        let sql = format!("{EVENT_SELECT} WHERE id = $1");
        let mut events = self
            .fetch_events("load_event", sqlx::query(&sql).bind(*id.as_uuid()))
            .await?;
        Ok(events.pop())
    }

    #[instrument(skip(self), fields(event_count = tracing::field::Empty), err)]
    async fn events(&self) -> TicketingResult<Vec<Event>> {
        let sql = format!("{EVENT_SELECT} ORDER BY start_time ASC, id ASC");
        let events = self.fetch_events("list_events", sqlx::query(&sql)).await?;
        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(skip(self), fields(category_id = %category_id), err)]
    async fn events_in_category(&self, category_id: CategoryId) -> TicketingResult<Vec<Event>> {
        let sql = format!("{EVENT_SELECT} WHERE category_id = $1 ORDER BY start_time ASC, id ASC");
        self.fetch_events(
            "list_events_in_category",
            sqlx::query(&sql).bind(*category_id.as_uuid()),
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn expired_events(&self, now: DateTime<Utc>) -> TicketingResult<Vec<Event>> {
        let sql = format!("{EVENT_SELECT} WHERE end_time < $1 ORDER BY end_time ASC, id ASC");
        self.fetch_events("list_expired_events", sqlx::query(&sql).bind(now))
            .await
    }

    #[instrument(skip(self), fields(booking_id = %id), err)]
    async fn booking(&self, id: BookingId) -> TicketingResult<Option<Booking>> {
        let sql = format!("{BOOKING_SELECT} WHERE id = $1");
        let mut bookings = self
            .fetch_bookings("load_booking", sqlx::query(&sql).bind(*id.as_uuid()))
            .await?;
        Ok(bookings.pop())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn bookings_for_user(&self, user_id: UserId) -> TicketingResult<Vec<Booking>> {
        let sql = format!(
            "{BOOKING_SELECT} WHERE user_id = $1 AND status = 'confirmed' ORDER BY booked_at ASC, id ASC"
        );
        self.fetch_bookings("list_user_bookings", sqlx::query(&sql).bind(*user_id.as_uuid()))
            .await
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn bookings_for_event(&self, event_id: EventId) -> TicketingResult<Vec<Booking>> {
        let sql = format!(
            "{BOOKING_SELECT} WHERE event_id = $1 AND status = 'confirmed' ORDER BY booked_at ASC, id ASC"
        );
        self.fetch_bookings("list_event_bookings", sqlx::query(&sql).bind(*event_id.as_uuid()))
            .await
    }

    #[instrument(skip(self), err)]
    async fn all_bookings(&self) -> TicketingResult<Vec<Booking>> {
        let sql =
            format!("{BOOKING_SELECT} WHERE status = 'confirmed' ORDER BY booked_at ASC, id ASC");
        self.fetch_bookings("list_all_bookings", sqlx::query(&sql)).await
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn category(&self, id: CategoryId) -> TicketingResult<Option<Category>> {
        let sql = format!("{CATEGORY_SELECT} WHERE id = $1");
        let mut categories = self
            .fetch_categories("load_category", sqlx::query(&sql).bind(*id.as_uuid()))
            .await?;
        Ok(categories.pop())
    }

    #[instrument(skip(self), err)]
    async fn category_by_name(&self, name: &str) -> TicketingResult<Option<Category>> {
        let sql = format!("{CATEGORY_SELECT} WHERE lower(name) = lower($1)");
        let mut categories = self
            .fetch_categories(
                "load_category_by_name",
                sqlx::query(&sql).bind(name.trim().to_string()),
            )
            .await?;
        Ok(categories.pop())
    }

    #[instrument(skip(self), err)]
    async fn categories(&self) -> TicketingResult<Vec<Category>> {
        let sql = format!("{CATEGORY_SELECT} ORDER BY lower(name) ASC");
        self.fetch_categories("list_categories", sqlx::query(&sql))
            .await
    }
}

#[async_trait]
impl StoreUnit for PostgresUnit {
    async fn event(&mut self, id: EventId) -> TicketingResult<Option<Event>> {
        let sql = format!("{EVENT_SELECT} WHERE id = $1 FOR UPDATE");
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_event", e))?;
        Ok(hydrate_events(&mut *self.tx, rows).await?.pop())
    }

    async fn event_by_name(&mut self, name: &str) -> TicketingResult<Option<Event>> {
        let sql = format!("{EVENT_SELECT} WHERE lower(name) = lower($1) FOR UPDATE");
        let rows = sqlx::query(&sql)
            .bind(name.trim())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_event_by_name", e))?;
        Ok(hydrate_events(&mut *self.tx, rows).await?.pop())
    }

    #[instrument(skip(self, event), fields(event_id = %event.id), err)]
    async fn insert_event(&mut self, event: &Event) -> TicketingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (
                id,
                host_id,
                category_id,
                category_name,
                name,
                description,
                location,
                image_url,
                event_date,
                start_time,
                end_time,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.host_id.as_uuid())
        .bind(event.category_id.as_uuid())
        .bind(&event.category_name)
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(&event.image_url)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                TicketingError::from(DomainError::category_not_found())
            } else {
                map_sqlx_error("insert_event", e)
            }
        })?;

        write_ticket_classes(&mut self.tx, event).await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id), err)]
    async fn replace_event(&mut self, event: &Event) -> TicketingResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE events
            SET name = $2,
                description = $3,
                location = $4,
                image_url = $5,
                event_date = $6,
                start_time = $7,
                end_time = $8
            WHERE id = $1
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(&event.image_url)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.end_time)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_event", e))?;

        if updated.rows_affected() == 0 {
            return Err(DomainError::event_not_found().into());
        }

        let keep: Vec<Uuid> = event
            .tickets
            .classes()
            .iter()
            .map(|c| *c.id().as_uuid())
            .collect();

        sqlx::query("DELETE FROM ticket_classes WHERE event_id = $1 AND NOT (id = ANY($2))")
            .bind(event.id.as_uuid())
            .bind(&keep[..])
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("prune_ticket_classes", e))?;

        write_ticket_classes(&mut self.tx, event).await
    }

    #[instrument(skip(self, ids), fields(requested = ids.len(), removed = tracing::field::Empty), err)]
    async fn delete_events(&mut self, ids: &[EventId]) -> TicketingResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM events WHERE id = ANY($1)")
            .bind(&ids[..])
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_events", e))?;
        Span::current().record("removed", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(event_id = %event_id, class_id = %class_id), err)]
    async fn take_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        quantity: u32,
    ) -> TicketingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ticket_classes
            SET available_quantity = available_quantity - $3
            WHERE id = $1 AND event_id = $2 AND available_quantity >= $3
            "#,
        )
        .bind(class_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(to_i32(quantity, "quantity")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("take_tickets", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(event_id = %event_id, class_id = %class_id), err)]
    async fn restore_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        fallback: TicketType,
        quantity: u32,
    ) -> TicketingResult<Option<Release>> {
        let row = sqlx::query(
            r#"
            WITH target AS (
                SELECT id, available_quantity, total_quantity
                FROM ticket_classes
                WHERE event_id = $1 AND (id = $2 OR ticket_type = $3)
                ORDER BY (id = $2) DESC
                LIMIT 1
                FOR UPDATE
            )
            UPDATE ticket_classes t
            SET available_quantity = LEAST(
                target.total_quantity::BIGINT,
                target.available_quantity::BIGINT + $4
            )
            FROM target
            WHERE t.id = target.id
            RETURNING
                t.available_quantity,
                (target.available_quantity::BIGINT + $4 > target.total_quantity) AS clamped
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(class_id.as_uuid())
        .bind(fallback.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("restore_tickets", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let available: i32 = row
            .try_get("available_quantity")
            .map_err(|e| corrupt("ticket class", e))?;
        let clamped: bool = row.try_get("clamped").map_err(|e| corrupt("ticket class", e))?;

        Ok(Some(Release {
            available: from_i32(available, "available_quantity")?,
            clamped,
        }))
    }

    async fn booking(&mut self, id: BookingId) -> TicketingResult<Option<Booking>> {
        let sql = format!("{BOOKING_SELECT} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_booking", e))?;
        row.as_ref().map(booking_from_row).transpose()
    }

    #[instrument(skip(self, booking), fields(booking_id = %booking.id), err)]
    async fn insert_booking(&mut self, booking: &Booking) -> TicketingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id,
                user_id,
                event_id,
                ticket_class_id,
                ticket_type,
                transaction_id,
                quantity,
                total_paid,
                status,
                booked_at,
                cancelled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.event_id.as_uuid())
        .bind(booking.ticket_class_id.as_uuid())
        .bind(booking.ticket_type.as_str())
        .bind(&booking.transaction_id)
        .bind(to_i32(booking.quantity, "quantity")?)
        .bind(to_i64(booking.total_paid, "total_paid")?)
        .bind(booking.status.as_str())
        .bind(booking.booked_at)
        .bind(booking.cancelled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                TicketingError::from(DomainError::event_not_found())
            } else {
                map_sqlx_error("insert_booking", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(booking_id = %id), err)]
    async fn mark_cancelled(&mut self, id: BookingId, at: DateTime<Utc>) -> TicketingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancelled_at = $2
            WHERE id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("mark_cancelled", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(event_id = %event_id, removed = tracing::field::Empty), err)]
    async fn delete_bookings_for_event(&mut self, event_id: EventId) -> TicketingResult<u64> {
        let result = sqlx::query("DELETE FROM bookings WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_bookings_for_event", e))?;
        Span::current().record("removed", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn category(&mut self, id: CategoryId) -> TicketingResult<Option<Category>> {
        let sql = format!("{CATEGORY_SELECT} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn category_by_name(&mut self, name: &str) -> TicketingResult<Option<Category>> {
        let sql = format!("{CATEGORY_SELECT} WHERE lower(name) = lower($1) FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(name.trim())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_category_by_name", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn insert_category(&mut self, category: &Category) -> TicketingResult<()> {
        sqlx::query("INSERT INTO categories (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(category.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TicketingError::from(DomainError::duplicate_name(category.name.clone()))
                } else {
                    map_sqlx_error("insert_category", e)
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn rename_category(&mut self, id: CategoryId, name: &str) -> TicketingResult<bool> {
        let result = sqlx::query("UPDATE categories SET name = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TicketingError::from(DomainError::duplicate_name(name))
                } else {
                    map_sqlx_error("rename_category", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE events SET category_name = $2 WHERE category_id = $1")
            .bind(id.as_uuid())
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("refresh_category_name", e))?;
        Ok(true)
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn delete_category(&mut self, id: CategoryId) -> TicketingResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn event_ids_in_category(&mut self, category_id: CategoryId) -> TicketingResult<Vec<EventId>> {
        let rows = sqlx::query("SELECT id FROM events WHERE category_id = $1 ORDER BY id FOR UPDATE")
            .bind(category_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_category_events", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(EventId::from_uuid)
                    .map_err(|e| corrupt("event id", e))
            })
            .collect()
    }

    async fn commit(self) -> TicketingResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> TicketingResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Upsert every class of the event's ledger, in ledger order.
async fn write_ticket_classes(conn: &mut PgConnection, event: &Event) -> TicketingResult<()> {
    for (position, class) in event.tickets.classes().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO ticket_classes (
                id,
                event_id,
                position,
                ticket_type,
                price,
                total_quantity,
                available_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET position = EXCLUDED.position,
                price = EXCLUDED.price,
                total_quantity = EXCLUDED.total_quantity,
                available_quantity = EXCLUDED.available_quantity
            "#,
        )
        .bind(class.id().as_uuid())
        .bind(event.id.as_uuid())
        .bind(position as i32)
        .bind(class.ticket_type().as_str())
        .bind(to_i64(class.price(), "price")?)
        .bind(to_i32(class.total_quantity(), "total_quantity")?)
        .bind(to_i32(class.available_quantity(), "available_quantity")?)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_ticket_class", e))?;
    }
    Ok(())
}

/// Attach ticket classes to event rows.
async fn hydrate_events(conn: &mut PgConnection, rows: Vec<PgRow>) -> TicketingResult<Vec<Event>> {
    let rows = rows
        .iter()
        .map(EventRow::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| corrupt("event", e))?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let class_rows = sqlx::query(
        r#"
        SELECT
            id,
            event_id,
            ticket_type,
            price,
            total_quantity,
            available_quantity
        FROM ticket_classes
        WHERE event_id = ANY($1)
        ORDER BY position ASC
        "#,
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_ticket_classes", e))?;

    let mut classes: HashMap<Uuid, Vec<TicketClass>> = HashMap::new();
    for row in &class_rows {
        let class_row = TicketClassRow::from_row(row).map_err(|e| corrupt("ticket class", e))?;
        let event_id = class_row.event_id;
        classes
            .entry(event_id)
            .or_default()
            .push(TicketClass::try_from(class_row)?);
    }

    rows.into_iter()
        .map(|row| {
            let tickets = classes.remove(&row.id).unwrap_or_default();
            row.into_event(tickets)
        })
        .collect()
}

fn booking_from_row(row: &PgRow) -> TicketingResult<Booking> {
    BookingRow::from_row(row)
        .map_err(|e| corrupt("booking", e))?
        .try_into()
}

fn category_from_row(row: &PgRow) -> TicketingResult<Category> {
    Ok(CategoryRow::from_row(row)
        .map_err(|e| corrupt("category", e))?
        .into())
}

fn to_i32(value: u32, field: &str) -> TicketingResult<i32> {
    i32::try_from(value)
        .map_err(|_| DomainError::validation(format!("{field} {value} is out of range")).into())
}

fn to_i64(value: u64, field: &str) -> TicketingResult<i64> {
    i64::try_from(value)
        .map_err(|_| DomainError::validation(format!("{field} {value} is out of range")).into())
}

fn from_i32(value: i32, field: &str) -> TicketingResult<u32> {
    u32::try_from(value).map_err(|_| TicketingError::Corrupt(format!("{field} is negative: {value}")))
}

fn from_i64(value: i64, field: &str) -> TicketingResult<u64> {
    u64::try_from(value).map_err(|_| TicketingError::Corrupt(format!("{field} is negative: {value}")))
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> TicketingError {
    TicketingError::Corrupt(format!("failed to decode {what} row: {err}"))
}

/// Map SQLx errors to `TicketingError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> TicketingError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => TicketingError::Serialization(msg),
                Some("23505") => {
                    if db_err.constraint().is_some_and(|c| c.contains("name")) {
                        DomainError::duplicate_name(msg).into()
                    } else {
                        DomainError::conflict(msg).into()
                    }
                }
                Some("23503") => DomainError::conflict(msg).into(),
                Some("23514") => DomainError::invariant(msg).into(),
                _ => TicketingError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            TicketingError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            TicketingError::Backend(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            TicketingError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => TicketingError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn sql_state(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|c| c.into_owned());
    }
    None
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    sql_state(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sql_state(err).as_deref() == Some("23503")
}

// SQLx row types

#[derive(Debug)]
struct EventRow {
    id: Uuid,
    host_id: Uuid,
    category_id: Uuid,
    category_name: String,
    name: String,
    description: String,
    location: String,
    image_url: String,
    event_date: NaiveDate,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            host_id: row.try_get("host_id")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            location: row.try_get("location")?,
            image_url: row.try_get("image_url")?,
            event_date: row.try_get("event_date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl EventRow {
    fn into_event(self, tickets: Vec<TicketClass>) -> TicketingResult<Event> {
        let tickets = InventoryLedger::from_classes(tickets)
            .map_err(|e| TicketingError::Corrupt(format!("event {}: {e}", self.id)))?;
        Ok(Event {
            id: EventId::from_uuid(self.id),
            host_id: UserId::from_uuid(self.host_id),
            category_id: CategoryId::from_uuid(self.category_id),
            category_name: self.category_name,
            name: self.name,
            description: self.description,
            location: self.location,
            image_url: self.image_url,
            date: self.event_date,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: self.created_at,
            tickets,
        })
    }
}

#[derive(Debug)]
struct TicketClassRow {
    id: Uuid,
    event_id: Uuid,
    ticket_type: String,
    price: i64,
    total_quantity: i32,
    available_quantity: i32,
}

impl<'r> FromRow<'r, PgRow> for TicketClassRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TicketClassRow {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            ticket_type: row.try_get("ticket_type")?,
            price: row.try_get("price")?,
            total_quantity: row.try_get("total_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
        })
    }
}

impl TryFrom<TicketClassRow> for TicketClass {
    type Error = TicketingError;

    fn try_from(row: TicketClassRow) -> Result<Self, Self::Error> {
        let ticket_type: TicketType = row
            .ticket_type
            .parse()
            .map_err(|e| TicketingError::Corrupt(format!("ticket class {}: {e}", row.id)))?;
        TicketClass::restore(
            TicketClassId::from_uuid(row.id),
            ticket_type,
            from_i64(row.price, "price")?,
            from_i32(row.total_quantity, "total_quantity")?,
            from_i32(row.available_quantity, "available_quantity")?,
        )
        .map_err(|e| TicketingError::Corrupt(e.to_string()))
    }
}

#[derive(Debug)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    ticket_class_id: Uuid,
    ticket_type: String,
    transaction_id: String,
    quantity: i32,
    total_paid: i64,
    status: String,
    booked_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for BookingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BookingRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_id: row.try_get("event_id")?,
            ticket_class_id: row.try_get("ticket_class_id")?,
            ticket_type: row.try_get("ticket_type")?,
            transaction_id: row.try_get("transaction_id")?,
            quantity: row.try_get("quantity")?,
            total_paid: row.try_get("total_paid")?,
            status: row.try_get("status")?,
            booked_at: row.try_get("booked_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = TicketingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let ticket_type: TicketType = row
            .ticket_type
            .parse()
            .map_err(|e| TicketingError::Corrupt(format!("booking {}: {e}", row.id)))?;
        let status: BookingStatus = row
            .status
            .parse()
            .map_err(|e| TicketingError::Corrupt(format!("booking {}: {e}", row.id)))?;

        Ok(Booking {
            id: BookingId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            ticket_class_id: TicketClassId::from_uuid(row.ticket_class_id),
            ticket_type,
            transaction_id: row.transaction_id,
            quantity: from_i32(row.quantity, "quantity")?,
            total_paid: from_i64(row.total_paid, "total_paid")?,
            status,
            booked_at: row.booked_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(Debug)]
struct CategoryRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CategoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CategoryRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: CategoryId::from_uuid(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_quantities_are_validation_errors() {
        let err = to_i32(u32::MAX, "quantity").unwrap_err();
        assert!(matches!(err, TicketingError::Domain(DomainError::Validation(_))));
        assert_eq!(to_i32(7, "quantity").unwrap(), 7);
    }

    #[test]
    fn negative_columns_are_corrupt() {
        assert!(matches!(from_i32(-1, "quantity"), Err(TicketingError::Corrupt(_))));
        assert!(matches!(from_i64(-5, "price"), Err(TicketingError::Corrupt(_))));
    }

    #[test]
    fn pool_errors_map_to_backend() {
        let err = map_sqlx_error("begin_transaction", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, TicketingError::Backend(msg) if msg.contains("begin_transaction")));
    }

    #[test]
    fn corrupt_ticket_rows_are_rejected() {
        let row = TicketClassRow {
            id: Uuid::now_v7(),
            event_id: Uuid::now_v7(),
            ticket_type: "VIP".to_string(),
            price: 100,
            total_quantity: 5,
            available_quantity: 9,
        };
        assert!(matches!(TicketClass::try_from(row), Err(TicketingError::Corrupt(_))));
    }

    // The tests below need a live database:
    // DATABASE_URL=postgres://... cargo test -p horizon-infra -- --ignored
    mod live {
        use std::sync::Arc;

        use tokio::sync::Barrier;

        use super::*;
        use crate::{BookingTransactionManager, CascadeDeletionCoordinator, EventCatalog};
        use horizon_ticketing::{EventDetails, NewEvent, NewTicketClass};

        const ROUNDS: usize = 10;

        async fn connect() -> Option<PostgresTicketingStore> {
            let url = std::env::var("DATABASE_URL").ok()?;
            let store = PostgresTicketingStore::connect(&url, 8, Duration::from_secs(10))
                .await
                .unwrap();
            store.migrate().await.unwrap();
            Some(store)
        }

        /// A fresh category with one event of 10 VIP seats.
        async fn seed(catalog: &EventCatalog<PostgresTicketingStore>) -> (CategoryId, EventId) {
            let suffix = Uuid::now_v7().simple().to_string();
            let category = catalog.create_category(&format!("pg-{suffix}")).await.unwrap();
            let now = Utc::now();
            let event = catalog
                .create_event(
                    UserId::new(),
                    NewEvent {
                        details: EventDetails {
                            name: format!("pg-event-{suffix}"),
                            description: String::new(),
                            location: "Dock 4".to_string(),
                            image_url: String::new(),
                            date: now.date_naive(),
                            start_time: now + chrono::Duration::hours(1),
                            end_time: now + chrono::Duration::hours(2),
                            tickets: vec![NewTicketClass::new(TicketType::Vip, 100, 10)],
                        },
                        category_id: Some(category.id),
                        category_name: None,
                    },
                )
                .await
                .unwrap();
            (category.id, event.id)
        }

        async fn vip_available(store: &PostgresTicketingStore, event_id: EventId) -> u32 {
            store
                .event(event_id)
                .await
                .unwrap()
                .unwrap()
                .tickets
                .by_type(TicketType::Vip)
                .unwrap()
                .available_quantity()
        }

        /// Two bookings released together through a barrier.
        async fn race_two(
            bookings: &BookingTransactionManager<PostgresTicketingStore>,
            event_id: EventId,
            quantity: u32,
        ) -> Vec<TicketingResult<horizon_ticketing::BookingReceipt>> {
            let barrier = Arc::new(Barrier::new(2));
            let mut tasks = Vec::new();
            for _ in 0..2 {
                let bookings = bookings.clone();
                let barrier = barrier.clone();
                tasks.push(tokio::spawn(async move {
                    barrier.wait().await;
                    bookings
                        .create_booking(event_id, TicketType::Vip, quantity, UserId::new())
                        .await
                }));
            }
            let mut results = Vec::new();
            for task in tasks {
                results.push(task.await.unwrap());
            }
            results
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        #[ignore]
        async fn racing_bookings_lose_with_insufficient_inventory() {
            let Some(store) = connect().await else {
                return;
            };
            let catalog = EventCatalog::new(store.clone());
            let bookings = BookingTransactionManager::new(store.clone());

            for _ in 0..ROUNDS {
                let (_, event_id) = seed(&catalog).await;
                let results = race_two(&bookings, event_id, 6).await;

                let granted = results.iter().filter(|r| r.is_ok()).count();
                assert_eq!(granted, 1);
                let loser = results.into_iter().find_map(Result::err).unwrap();
                assert!(
                    matches!(
                        loser.domain(),
                        Some(DomainError::InsufficientInventory { requested: 6, .. })
                    ),
                    "unexpected loser error: {loser:?}"
                );
                assert_eq!(vip_available(&store, event_id).await, 4);
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        #[ignore]
        async fn racing_bookings_that_fit_both_succeed() {
            let Some(store) = connect().await else {
                return;
            };
            let catalog = EventCatalog::new(store.clone());
            let bookings = BookingTransactionManager::new(store.clone());

            for _ in 0..ROUNDS {
                let (_, event_id) = seed(&catalog).await;
                for result in race_two(&bookings, event_id, 3).await {
                    assert!(result.is_ok(), "fitting booking failed: {result:?}");
                }
                assert_eq!(vip_available(&store, event_id).await, 4);
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        #[ignore]
        async fn racing_cancels_restore_once() {
            let Some(store) = connect().await else {
                return;
            };
            let catalog = EventCatalog::new(store.clone());
            let bookings = BookingTransactionManager::new(store.clone());

            for _ in 0..ROUNDS {
                let (_, event_id) = seed(&catalog).await;
                let receipt = bookings
                    .create_booking(event_id, TicketType::Vip, 4, UserId::new())
                    .await
                    .unwrap();
                let booking_id = receipt.booking_id;

                let barrier = Arc::new(Barrier::new(2));
                let mut tasks = Vec::new();
                for _ in 0..2 {
                    let bookings = bookings.clone();
                    let barrier = barrier.clone();
                    tasks.push(tokio::spawn(async move {
                        barrier.wait().await;
                        bookings.cancel_booking(booking_id).await
                    }));
                }
                let mut cancelled = 0;
                for task in tasks {
                    match task.await.unwrap() {
                        Ok(outcome) => {
                            assert!(outcome.inventory_restored);
                            cancelled += 1;
                        }
                        Err(err) => assert_eq!(err.domain(), Some(&DomainError::AlreadyCancelled)),
                    }
                }
                assert_eq!(cancelled, 1);
                assert_eq!(vip_available(&store, event_id).await, 10);
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        #[ignore]
        async fn cascade_removes_category_tree() {
            let Some(store) = connect().await else {
                return;
            };
            let catalog = EventCatalog::new(store.clone());
            let bookings = BookingTransactionManager::new(store.clone());
            let cascade = CascadeDeletionCoordinator::new(store.clone());

            let (category_id, event_id) = seed(&catalog).await;
            bookings
                .create_booking(event_id, TicketType::Vip, 1, UserId::new())
                .await
                .unwrap();

            let deletion = cascade.delete_category_with_cascade(category_id).await.unwrap();
            assert_eq!(deletion.events_removed, 1);
            assert_eq!(deletion.bookings_removed, 1);
            assert!(store.event(event_id).await.unwrap().is_none());
            assert!(store.bookings_for_event(event_id).await.unwrap().is_empty());
        }
    }
}
