use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    AssignmentId, MessageId, MessageKind, NotificationId, OrderId, OrderStatus, ProductId, RoomId,
    UserId, UserRole,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub product_id: ProductId,
    pub provider_id: UserId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub city: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub order_id: OrderId,
    pub client_id: UserId,
    pub provider_id: UserId,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub event_date: NaiveDate,
    pub location: String,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderParty {
    Client,
    Provider,
}

#[derive(Debug, Clone)]
pub struct StoredRoom {
    pub room_id: RoomId,
    pub client_id: UserId,
    pub provider_id: UserId,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub path: String,
    pub name: String,
    pub mime: String,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub body: String,
    pub attachment: Option<StoredAttachment>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredNotification {
    pub notification_id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredAssignment {
    pub assignment_id: AssignmentId,
    pub client_id: UserId,
    pub organizer_id: UserId,
    pub event_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub path: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub size_bytes: i64,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn upsert_user(&self, username: &str, role: UserRole) -> Result<(UserId, UserRole)> {
        let rec = sqlx::query(
            "INSERT INTO users (username, role) VALUES (?, ?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id, role",
        )
        .bind(username)
        .bind(role_to_str(role))
        .fetch_one(&self.pool)
        .await?;
        Ok((
            UserId(rec.get::<i64, _>(0)),
            role_from_str(&rec.get::<String, _>(1)),
        ))
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT id, username, role, created_at FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredUser {
            user_id: UserId(r.get::<i64, _>(0)),
            username: r.get::<String, _>(1),
            role: role_from_str(&r.get::<String, _>(2)),
            created_at: r.get::<DateTime<Utc>, _>(3),
        }))
    }

    pub async fn username_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn create_product(
        &self,
        provider_id: UserId,
        name: &str,
        description: &str,
        category: &str,
        price_cents: i64,
        city: &str,
    ) -> Result<ProductId> {
        let rec = sqlx::query(
            "INSERT INTO products (provider_id, name, description, category, price_cents, city)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(provider_id.0)
        .bind(name)
        .bind(description)
        .bind(category)
        .bind(price_cents)
        .bind(city)
        .fetch_one(&self.pool)
        .await?;
        Ok(ProductId(rec.get::<i64, _>(0)))
    }

    pub async fn add_product_image(
        &self,
        product_id: ProductId,
        path: &str,
        position: i64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO product_images (product_id, path, position) VALUES (?, ?, ?)")
            .bind(product_id.0)
            .bind(path)
            .bind(position)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_product_images(&self, product_id: ProductId) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT path FROM product_images WHERE product_id = ? ORDER BY position ASC, id ASC",
        )
        .bind(product_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Option<StoredProduct>> {
        let row = sqlx::query(
            "SELECT id, provider_id, name, description, category, price_cents, city, created_at
             FROM products
             WHERE id = ?",
        )
        .bind(product_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| product_from_row(&r)))
    }

    /// Newest-first keyset pagination over the catalog. `query` does a
    /// substring match on name and description.
    pub async fn search_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<(StoredProduct, Option<String>)>> {
        let mut sql = String::from(
            "SELECT p.id, p.provider_id, p.name, p.description, p.category, p.price_cents, p.city, p.created_at,
                    (SELECT path FROM product_images i
                     WHERE i.product_id = p.id
                     ORDER BY i.position ASC, i.id ASC LIMIT 1) AS cover
             FROM products p
             WHERE 1=1",
        );
        if query.is_some() {
            sql.push_str(" AND (p.name LIKE ? OR p.description LIKE ?)");
        }
        if category.is_some() {
            sql.push_str(" AND p.category = ?");
        }
        if before.is_some() {
            sql.push_str(" AND p.id < ?");
        }
        sql.push_str(" ORDER BY p.id DESC LIMIT ?");

        let mut q = sqlx::query(&sql);
        if let Some(term) = query {
            let like = format!("%{term}%");
            q = q.bind(like.clone()).bind(like);
        }
        if let Some(category) = category {
            q = q.bind(category);
        }
        if let Some(before_id) = before {
            q = q.bind(before_id);
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let product = product_from_row(&r);
                let cover = r.get::<Option<String>, _>(8);
                (product, cover)
            })
            .collect())
    }

    /// Inserts the favorite when absent, removes it when present. Returns
    /// the resulting state: `true` means the product is now a favorite.
    pub async fn toggle_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user_id.0)
            .bind(product_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            return Ok(false);
        }
        sqlx::query("INSERT OR IGNORE INTO favorites (user_id, product_id) VALUES (?, ?)")
            .bind(user_id.0)
            .bind(product_id.0)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    pub async fn is_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user_id.0)
            .bind(product_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_favorites(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(StoredProduct, Option<String>)>> {
        let rows = sqlx::query(
            "SELECT p.id, p.provider_id, p.name, p.description, p.category, p.price_cents, p.city, p.created_at,
                    (SELECT path FROM product_images i
                     WHERE i.product_id = p.id
                     ORDER BY i.position ASC, i.id ASC LIMIT 1) AS cover
             FROM favorites f
             INNER JOIN products p ON p.id = f.product_id
             WHERE f.user_id = ?
             ORDER BY f.created_at DESC, p.id DESC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (product_from_row(&r), r.get::<Option<String>, _>(8)))
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_order(
        &self,
        client_id: UserId,
        provider_id: UserId,
        total_cents: i64,
        deposit_cents: i64,
        event_date: NaiveDate,
        location: &str,
        notes: Option<&str>,
    ) -> Result<StoredOrder> {
        let row = sqlx::query(
            "INSERT INTO orders (client_id, provider_id, total_cents, deposit_cents, event_date, location, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, client_id, provider_id, total_cents, deposit_cents, event_date, location, notes, status, created_at, updated_at",
        )
        .bind(client_id.0)
        .bind(provider_id.0)
        .bind(total_cents)
        .bind(deposit_cents)
        .bind(event_date)
        .bind(location)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(order_from_row(&row))
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>> {
        let row = sqlx::query(
            "SELECT id, client_id, provider_id, total_cents, deposit_cents, event_date, location, notes, status, created_at, updated_at
             FROM orders
             WHERE id = ?",
        )
        .bind(order_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| order_from_row(&r)))
    }

    pub async fn list_orders_for(
        &self,
        user_id: UserId,
        party: OrderParty,
    ) -> Result<Vec<StoredOrder>> {
        let sql = match party {
            OrderParty::Client => {
                "SELECT id, client_id, provider_id, total_cents, deposit_cents, event_date, location, notes, status, created_at, updated_at
                 FROM orders WHERE client_id = ? ORDER BY id DESC"
            }
            OrderParty::Provider => {
                "SELECT id, client_id, provider_id, total_cents, deposit_cents, event_date, location, notes, status, created_at, updated_at
                 FROM orders WHERE provider_id = ? ORDER BY id DESC"
            }
        };
        let rows = sqlx::query(sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    /// Compare-and-set status update. Returns `false` when the order was no
    /// longer in `from`, so concurrent transitions lose cleanly.
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE orders
             SET status = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND status = ?",
        )
        .bind(status_to_str(to))
        .bind(order_id.0)
        .bind(status_to_str(from))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// One room per (client, provider) pair; reopening updates the label.
    pub async fn open_room(
        &self,
        client_id: UserId,
        provider_id: UserId,
        label: &str,
    ) -> Result<StoredRoom> {
        let row = sqlx::query(
            "INSERT INTO rooms (client_id, provider_id, label) VALUES (?, ?, ?)
             ON CONFLICT(client_id, provider_id) DO UPDATE SET label=excluded.label
             RETURNING id, client_id, provider_id, label, created_at",
        )
        .bind(client_id.0)
        .bind(provider_id.0)
        .bind(label)
        .fetch_one(&self.pool)
        .await?;
        Ok(room_from_row(&row))
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Option<StoredRoom>> {
        let row = sqlx::query(
            "SELECT id, client_id, provider_id, label, created_at FROM rooms WHERE id = ?",
        )
        .bind(room_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| room_from_row(&r)))
    }

    pub async fn list_rooms_for(&self, user_id: UserId) -> Result<Vec<StoredRoom>> {
        let rows = sqlx::query(
            "SELECT id, client_id, provider_id, label, created_at
             FROM rooms
             WHERE client_id = ? OR provider_id = ?
             ORDER BY id DESC",
        )
        .bind(user_id.0)
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(room_from_row).collect())
    }

    pub async fn insert_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        kind: MessageKind,
        body: &str,
        attachment: Option<&StoredAttachment>,
    ) -> Result<StoredMessage> {
        let row = sqlx::query(
            "INSERT INTO messages (room_id, sender_id, kind, body, attachment_path, attachment_name, attachment_mime)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, read, created_at",
        )
        .bind(room_id.0)
        .bind(sender_id.0)
        .bind(kind_to_str(kind))
        .bind(body)
        .bind(attachment.map(|a| a.path.as_str()))
        .bind(attachment.map(|a| a.name.as_str()))
        .bind(attachment.map(|a| a.mime.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(StoredMessage {
            message_id: MessageId(row.get::<i64, _>(0)),
            room_id,
            sender_id,
            kind,
            body: body.to_string(),
            attachment: attachment.cloned(),
            read: row.get::<bool, _>(1),
            created_at: row.get::<DateTime<Utc>, _>(2),
        })
    }

    /// Returns the page oldest-first so feeds can append in arrival order.
    pub async fn list_messages(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<StoredMessage>> {
        let mut rows = if let Some(before_id) = before {
            sqlx::query(
                "SELECT id, room_id, sender_id, kind, body, attachment_path, attachment_name, attachment_mime, read, created_at
                 FROM messages
                 WHERE room_id = ? AND id < ?
                 ORDER BY id DESC
                 LIMIT ?",
            )
            .bind(room_id.0)
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, room_id, sender_id, kind, body, attachment_path, attachment_name, attachment_mime, read, created_at
                 FROM messages
                 WHERE room_id = ?
                 ORDER BY id DESC
                 LIMIT ?",
            )
            .bind(room_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.reverse();
        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Marks everything the reader did not send as read. Returns the number
    /// of rows that flipped.
    pub async fn mark_room_read(&self, room_id: RoomId, reader_id: UserId) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE messages SET read = 1 WHERE room_id = ? AND sender_id != ? AND read = 0",
        )
        .bind(room_id.0)
        .bind(reader_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    pub async fn insert_notification(
        &self,
        user_id: UserId,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<StoredNotification> {
        let row = sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, body)
             VALUES (?, ?, ?, ?)
             RETURNING id, read, created_at",
        )
        .bind(user_id.0)
        .bind(kind)
        .bind(title)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(StoredNotification {
            notification_id: NotificationId(row.get::<i64, _>(0)),
            user_id,
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            read: row.get::<bool, _>(1),
            created_at: row.get::<DateTime<Utc>, _>(2),
        })
    }

    pub async fn list_notifications(
        &self,
        user_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<StoredNotification>> {
        let sql = if unread_only {
            "SELECT id, user_id, kind, title, body, read, created_at
             FROM notifications WHERE user_id = ? AND read = 0 ORDER BY id DESC"
        } else {
            "SELECT id, user_id, kind, title, body, read, created_at
             FROM notifications WHERE user_id = ? ORDER BY id DESC"
        };
        let rows = sqlx::query(sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredNotification {
                notification_id: NotificationId(r.get::<i64, _>(0)),
                user_id: UserId(r.get::<i64, _>(1)),
                kind: r.get::<String, _>(2),
                title: r.get::<String, _>(3),
                body: r.get::<String, _>(4),
                read: r.get::<bool, _>(5),
                created_at: r.get::<DateTime<Utc>, _>(6),
            })
            .collect())
    }

    pub async fn mark_notification_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<bool> {
        let updated =
            sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
                .bind(notification_id.0)
                .bind(user_id.0)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(updated > 0)
    }

    pub async fn active_assignment(&self, client_id: UserId) -> Result<Option<StoredAssignment>> {
        let row = sqlx::query(
            "SELECT id, client_id, organizer_id, event_date, active, created_at
             FROM assignments
             WHERE client_id = ? AND active = 1",
        )
        .bind(client_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| assignment_from_row(&r)))
    }

    /// `None` means another active assignment won the race; the partial
    /// unique index on (client_id) WHERE active = 1 is the backstop.
    pub async fn create_assignment(
        &self,
        client_id: UserId,
        organizer_id: UserId,
        event_date: Option<NaiveDate>,
    ) -> Result<Option<StoredAssignment>> {
        let result = sqlx::query(
            "INSERT INTO assignments (client_id, organizer_id, event_date)
             VALUES (?, ?, ?)
             RETURNING id, client_id, organizer_id, event_date, active, created_at",
        )
        .bind(client_id.0)
        .bind(organizer_id.0)
        .bind(event_date)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => Ok(Some(assignment_from_row(&row))),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn complete_assignment(
        &self,
        assignment_id: AssignmentId,
        client_id: UserId,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE assignments SET active = 0 WHERE id = ? AND client_id = ? AND active = 1",
        )
        .bind(assignment_id.0)
        .bind(client_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Upserts the blob under `path`. Returns the stored size in bytes.
    pub async fn put_object(
        &self,
        path: &str,
        content_type: &str,
        body: &[u8],
        uploader_id: Option<UserId>,
    ) -> Result<i64> {
        let size_bytes = i64::try_from(body.len()).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO objects (path, content_type, body, size_bytes, uploader_id)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
               content_type=excluded.content_type,
               body=excluded.body,
               size_bytes=excluded.size_bytes,
               uploader_id=excluded.uploader_id",
        )
        .bind(path)
        .bind(content_type)
        .bind(body)
        .bind(size_bytes)
        .bind(uploader_id.map(|u| u.0))
        .execute(&self.pool)
        .await?;
        Ok(size_bytes)
    }

    pub async fn get_object(&self, path: &str) -> Result<Option<StoredObject>> {
        let row =
            sqlx::query("SELECT path, content_type, body, size_bytes FROM objects WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| StoredObject {
            path: r.get::<String, _>(0),
            content_type: r.get::<String, _>(1),
            body: r.get::<Vec<u8>, _>(2),
            size_bytes: r.get::<i64, _>(3),
        }))
    }
}

fn product_from_row(r: &SqliteRow) -> StoredProduct {
    StoredProduct {
        product_id: ProductId(r.get::<i64, _>(0)),
        provider_id: UserId(r.get::<i64, _>(1)),
        name: r.get::<String, _>(2),
        description: r.get::<String, _>(3),
        category: r.get::<String, _>(4),
        price_cents: r.get::<i64, _>(5),
        city: r.get::<String, _>(6),
        created_at: r.get::<DateTime<Utc>, _>(7),
    }
}

fn order_from_row(r: &SqliteRow) -> StoredOrder {
    StoredOrder {
        order_id: OrderId(r.get::<i64, _>(0)),
        client_id: UserId(r.get::<i64, _>(1)),
        provider_id: UserId(r.get::<i64, _>(2)),
        total_cents: r.get::<i64, _>(3),
        deposit_cents: r.get::<i64, _>(4),
        event_date: r.get::<NaiveDate, _>(5),
        location: r.get::<String, _>(6),
        notes: r.get::<Option<String>, _>(7),
        status: status_from_str(&r.get::<String, _>(8)),
        created_at: r.get::<DateTime<Utc>, _>(9),
        updated_at: r.get::<DateTime<Utc>, _>(10),
    }
}

fn room_from_row(r: &SqliteRow) -> StoredRoom {
    StoredRoom {
        room_id: RoomId(r.get::<i64, _>(0)),
        client_id: UserId(r.get::<i64, _>(1)),
        provider_id: UserId(r.get::<i64, _>(2)),
        label: r.get::<String, _>(3),
        created_at: r.get::<DateTime<Utc>, _>(4),
    }
}

fn message_from_row(r: &SqliteRow) -> StoredMessage {
    StoredMessage {
        message_id: MessageId(r.get::<i64, _>(0)),
        room_id: RoomId(r.get::<i64, _>(1)),
        sender_id: UserId(r.get::<i64, _>(2)),
        kind: kind_from_str(&r.get::<String, _>(3)),
        body: r.get::<String, _>(4),
        attachment: r.get::<Option<String>, _>(5).map(|path| StoredAttachment {
            path,
            name: r
                .get::<Option<String>, _>(6)
                .unwrap_or_else(|| "piece-jointe".to_string()),
            mime: r
                .get::<Option<String>, _>(7)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        }),
        read: r.get::<bool, _>(8),
        created_at: r.get::<DateTime<Utc>, _>(9),
    }
}

fn assignment_from_row(r: &SqliteRow) -> StoredAssignment {
    StoredAssignment {
        assignment_id: AssignmentId(r.get::<i64, _>(0)),
        client_id: UserId(r.get::<i64, _>(1)),
        organizer_id: UserId(r.get::<i64, _>(2)),
        event_date: r.get::<Option<NaiveDate>, _>(3),
        active: r.get::<bool, _>(4),
        created_at: r.get::<DateTime<Utc>, _>(5),
    }
}

fn role_to_str(role: UserRole) -> &'static str {
    match role {
        UserRole::Client => "client",
        UserRole::Provider => "provider",
        UserRole::Organizer => "organizer",
        UserRole::Admin => "admin",
    }
}

fn role_from_str(raw: &str) -> UserRole {
    match raw {
        "provider" => UserRole::Provider,
        "organizer" => UserRole::Organizer,
        "admin" => UserRole::Admin,
        _ => UserRole::Client,
    }
}

fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::InProgress => "in_progress",
        OrderStatus::Completed => "completed",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(raw: &str) -> OrderStatus {
    match raw {
        "confirmed" => OrderStatus::Confirmed,
        "in_progress" => OrderStatus::InProgress,
        "completed" => OrderStatus::Completed,
        "cancelled" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

fn kind_to_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::Voice => "voice",
    }
}

fn kind_from_str(raw: &str) -> MessageKind {
    match raw {
        "image" => MessageKind::Image,
        "voice" => MessageKind::Voice,
        _ => MessageKind::Text,
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
