//! services/mailing_store.rs
//! Persistencia de mailings, mensajes, clientes e intentos (SQLite).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::models::mailing_model::{
    ClientRecord, CreateMailingRequest, MailingAttemptRecord, MailingRecord, MailingStatus,
    MessageRecord, NewMailing, NewMailingAttempt,
};

/// Lo que el dispatcher (y la API) necesita del almacenamiento.
#[async_trait]
pub trait MailingStore: Send + Sync {
    /// Mailings cuyo estado está en `statuses`, más recientes primero.
    async fn list_mailings(&self, statuses: &[MailingStatus]) -> Result<Vec<MailingRecord>>;

    async fn get_mailing(&self, mailing_id: &str) -> Result<MailingRecord>;

    async fn get_message(&self, message_id: &str) -> Result<MessageRecord>;

    async fn list_recipients(&self, mailing_id: &str) -> Result<Vec<ClientRecord>>;

    /// Historial de intentos, del más reciente al más antiguo.
    async fn list_attempts(&self, mailing_id: &str) -> Result<Vec<MailingAttemptRecord>>;

    /// Cambia el estado solo si el actual sigue siendo `expected`.
    /// Devuelve `false` si otro proceso ya lo cambió (escritura obsoleta).
    async fn update_status(
        &self,
        mailing_id: &str,
        expected: MailingStatus,
        new_status: MailingStatus,
        actual_end_time: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Solo inserta; los intentos nunca se modifican.
    async fn append_attempt(&self, attempt: NewMailingAttempt) -> Result<MailingAttemptRecord>;

    async fn create_message(&self, subject: &str, body: Option<&str>) -> Result<MessageRecord>;

    /// Devuelve el cliente existente si el email ya está registrado.
    async fn create_client(
        &self,
        email: &str,
        full_name: &str,
        comment: Option<&str>,
    ) -> Result<ClientRecord>;

    async fn create_mailing(&self, new_mailing: NewMailing) -> Result<MailingRecord>;

    async fn count_mailings(&self, status: Option<MailingStatus>) -> Result<u64>;

    async fn count_clients(&self) -> Result<u64>;
}

#[derive(Clone, Debug)]
pub struct SqliteMailingStore {
    db_pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct MailingRow {
    id: String,
    description: Option<String>,
    start_time: String,
    periodicity: String,
    status: String,
    message_id: String,
    actual_end_time: Option<String>,
}

impl TryFrom<MailingRow> for MailingRecord {
    type Error = anyhow::Error;

    fn try_from(row: MailingRow) -> Result<Self> {
        Ok(MailingRecord {
            status: row.status.parse()?,
            start_time: parse_ts(&row.start_time)?,
            actual_end_time: row.actual_end_time.as_deref().map(parse_ts).transpose()?,
            id: row.id,
            description: row.description,
            periodicity: row.periodicity,
            message_id: row.message_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    mailing_id: String,
    timestamp: String,
    status: String,
    server_response: Option<String>,
}

impl TryFrom<AttemptRow> for MailingAttemptRecord {
    type Error = anyhow::Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(MailingAttemptRecord {
            timestamp: parse_ts(&row.timestamp)?,
            status: row.status.parse()?,
            id: row.id,
            mailing_id: row.mailing_id,
            server_response: row.server_response,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: String,
    email: String,
    full_name: String,
    comment: Option<String>,
}

impl From<ClientRow> for ClientRecord {
    fn from(row: ClientRow) -> Self {
        ClientRecord {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            comment: row.comment,
        }
    }
}

// Siempre el mismo formato en UTC para que ORDER BY sobre texto sea cronológico
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Fecha inválida en DB: '{raw}'"))?
        .with_timezone(&Utc))
}

const MAILING_COLUMNS: &str =
    "id, description, start_time, periodicity, status, message_id, actual_end_time";

impl SqliteMailingStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SqliteMailingStore { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run mailing migrations")?;
        Ok(())
    }
}

#[async_trait]
impl MailingStore for SqliteMailingStore {
    async fn list_mailings(&self, statuses: &[MailingStatus]) -> Result<Vec<MailingRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        // Un placeholder por estado: "?1, ?2, ..."
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {MAILING_COLUMNS} FROM mailings WHERE status IN ({placeholders}) \
             ORDER BY start_time DESC"
        );

        let mut query = sqlx::query_as::<Sqlite, MailingRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.db_pool)
            .await
            .context("Error listando mailings")?;

        rows.into_iter().map(MailingRecord::try_from).collect()
    }

    async fn get_mailing(&self, mailing_id: &str) -> Result<MailingRecord> {
        let sql = format!("SELECT {MAILING_COLUMNS} FROM mailings WHERE id = ?1");
        let row = sqlx::query_as::<Sqlite, MailingRow>(&sql)
            .bind(mailing_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Error consultando mailing")?
            .ok_or_else(|| anyhow!("Mailing {mailing_id} not found"))?;

        row.try_into()
    }

    async fn get_message(&self, message_id: &str) -> Result<MessageRecord> {
        let row = sqlx::query_as::<Sqlite, (String, String, Option<String>)>(
            "SELECT id, subject, body FROM messages WHERE id = ?1",
        )
        .bind(message_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Error consultando mensaje")?
        .ok_or_else(|| anyhow!("Message {message_id} not found"))?;

        Ok(MessageRecord {
            id: row.0,
            subject: row.1,
            body: row.2,
        })
    }

    async fn list_recipients(&self, mailing_id: &str) -> Result<Vec<ClientRecord>> {
        let rows = sqlx::query_as::<Sqlite, ClientRow>(
            r#"
            SELECT c.id, c.email, c.full_name, c.comment
            FROM clients c
            JOIN mailing_clients mc ON mc.client_id = c.id
            WHERE mc.mailing_id = ?1
            ORDER BY c.email
            "#,
        )
        .bind(mailing_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error listando destinatarios")?;

        Ok(rows.into_iter().map(ClientRecord::from).collect())
    }

    async fn list_attempts(&self, mailing_id: &str) -> Result<Vec<MailingAttemptRecord>> {
        let rows = sqlx::query_as::<Sqlite, AttemptRow>(
            r#"
            SELECT id, mailing_id, timestamp, status, server_response
            FROM mailing_attempts
            WHERE mailing_id = ?1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(mailing_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error listando intentos")?;

        rows.into_iter().map(MailingAttemptRecord::try_from).collect()
    }

    async fn update_status(
        &self,
        mailing_id: &str,
        expected: MailingStatus,
        new_status: MailingStatus,
        actual_end_time: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        if !expected.can_advance_to(new_status) {
            return Err(anyhow!(
                "Transición inválida {expected} -> {new_status} para mailing {mailing_id}"
            ));
        }

        let end_time = actual_end_time.as_ref().map(format_ts);
        let result = sqlx::query(
            r#"
            UPDATE mailings
            SET status = ?1,
                actual_end_time = COALESCE(?2, actual_end_time)
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(new_status.as_str())
        .bind(end_time)
        .bind(mailing_id)
        .bind(expected.as_str())
        .execute(&self.db_pool)
        .await
        .context("Error actualizando estado de mailing")?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_attempt(&self, attempt: NewMailingAttempt) -> Result<MailingAttemptRecord> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO mailing_attempts (id, mailing_id, timestamp, status, server_response)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(&attempt.mailing_id)
        .bind(format_ts(&attempt.timestamp))
        .bind(attempt.status.as_str())
        .bind(&attempt.server_response)
        .execute(&self.db_pool)
        .await
        .context("Error insertando intento de envío")?;

        Ok(MailingAttemptRecord {
            id,
            mailing_id: attempt.mailing_id,
            timestamp: attempt.timestamp,
            status: attempt.status,
            server_response: attempt.server_response,
        })
    }

    async fn create_message(&self, subject: &str, body: Option<&str>) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO messages (id, subject, body) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(subject)
            .bind(body)
            .execute(&self.db_pool)
            .await
            .context("Error insertando mensaje")?;

        Ok(MessageRecord {
            id,
            subject: subject.to_string(),
            body: body.map(str::to_string),
        })
    }

    async fn create_client(
        &self,
        email: &str,
        full_name: &str,
        comment: Option<&str>,
    ) -> Result<ClientRecord> {
        let existing = sqlx::query_as::<Sqlite, ClientRow>(
            "SELECT id, email, full_name, comment FROM clients WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await
        .context("Error consultando cliente")?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO clients (id, email, full_name, comment) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(email)
        .bind(full_name)
        .bind(comment)
        .execute(&self.db_pool)
        .await
        .context("Error insertando cliente")?;

        Ok(ClientRecord {
            id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            comment: comment.map(str::to_string),
        })
    }

    async fn create_mailing(&self, new_mailing: NewMailing) -> Result<MailingRecord> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("No se pudo abrir transacción")?;

        sqlx::query(
            r#"
            INSERT INTO mailings (
                id, description, start_time, periodicity, status, message_id, actual_end_time
            )
            VALUES (?1, ?2, ?3, ?4, 'created', ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(&new_mailing.description)
        .bind(format_ts(&new_mailing.start_time))
        .bind(new_mailing.periodicity.as_str())
        .bind(&new_mailing.message_id)
        .bind(new_mailing.actual_end_time.as_ref().map(format_ts))
        .execute(&mut *tx)
        .await
        .context("Error insertando mailing")?;

        for client_id in &new_mailing.client_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO mailing_clients (mailing_id, client_id) VALUES (?1, ?2)",
            )
            .bind(&id)
            .bind(client_id)
            .execute(&mut *tx)
            .await
            .context("Error asociando cliente al mailing")?;
        }

        tx.commit().await.context("Error confirmando mailing")?;

        Ok(MailingRecord {
            id,
            description: new_mailing.description,
            start_time: new_mailing.start_time,
            periodicity: new_mailing.periodicity.as_str().to_string(),
            status: MailingStatus::Created,
            message_id: new_mailing.message_id,
            actual_end_time: new_mailing.actual_end_time,
        })
    }

    async fn count_mailings(&self, status: Option<MailingStatus>) -> Result<u64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM mailings WHERE status = ?1")
                    .bind(status.as_str())
                    .fetch_one(&self.db_pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM mailings")
                    .fetch_one(&self.db_pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    async fn count_clients(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT email) FROM clients")
            .fetch_one(&self.db_pool)
            .await
            .context("Error contando clientes")?;
        Ok(count as u64)
    }
}

/// Crea mensaje, clientes y mailing a partir de la request de la API.
pub async fn create_mailing_from_request(
    store: &dyn MailingStore,
    req: CreateMailingRequest,
) -> Result<MailingRecord> {
    req.validate()?;

    let message = store
        .create_message(&req.subject, req.body.as_deref())
        .await?;

    let mut client_ids = Vec::with_capacity(req.recipients.len());
    for r in &req.recipients {
        let client = store
            .create_client(r.email.trim(), &r.full_name, r.comment.as_deref())
            .await?;
        client_ids.push(client.id);
    }

    store
        .create_mailing(NewMailing {
            description: req.description,
            start_time: req.start_time,
            periodicity: req.periodicity,
            message_id: message.id,
            actual_end_time: req.actual_end_time,
            client_ids,
        })
        .await
}
