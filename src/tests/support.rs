//! tests/support.rs
//! Helpers compartidos: SQLite en memoria, transporte falso y reloj manual.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::Notify;

use crate::config::mailing_config::MailingConfig;
use crate::models::mailing_model::{MailingRecord, MailingStatus, NewMailing, Periodicity};
use crate::services::clock::ManualClock;
use crate::services::dispatcher::MailingDispatcher;
use crate::services::mailing_store::{MailingStore, SqliteMailingStore};
use crate::services::transport::{MailTransport, TransportError, TransportResponse};

/// Instante base de los escenarios (T)
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

pub async fn memory_pool() -> Pool<Sqlite> {
    // Una sola conexión: cada conexión a ":memory:" es una DB distinta
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("No se pudo abrir SQLite en memoria")
}

pub async fn memory_store() -> (Pool<Sqlite>, SqliteMailingStore) {
    crate::logger::init_test_logger();
    let pool = memory_pool().await;
    let store = SqliteMailingStore::new(pool.clone());
    store.run_migrations().await.expect("migraciones");
    (pool, store)
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub subject: String,
    pub recipients: Vec<String>,
}

/// Transporte que registra cada llamada. Falla para los asuntos en `failing`.
#[derive(Default)]
pub struct FakeTransport {
    deliveries: Mutex<Vec<Delivery>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<StdDuration>>,
    gate: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn fail_subject(&self, subject: &str) {
        self.failing.lock().unwrap().insert(subject.to_string());
    }

    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Cada `deliver` espera un `notify_one` antes de responder.
    pub fn set_gate(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn calls_for(&self, subject: &str) -> usize {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.subject == subject)
            .count()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn deliver(
        &self,
        _from: &str,
        subject: &str,
        _body: &str,
        recipients: &[String],
    ) -> Result<TransportResponse, TransportError> {
        // Igual que SmtpMailTransport: sin destinatarios no se llama al servidor
        if recipients.is_empty() {
            return Err(TransportError::NoRecipients);
        }

        self.deliveries.lock().unwrap().push(Delivery {
            subject: subject.to_string(),
            recipients: recipients.to_vec(),
        });

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(subject) {
            return Err(TransportError::Rejected(format!(
                "554 relay denied for '{subject}'"
            )));
        }

        Ok(TransportResponse {
            delivered: recipients.len(),
            detail: "250 OK".to_string(),
        })
    }
}

pub struct TestEnv {
    pub pool: Pool<Sqlite>,
    pub store: Arc<SqliteMailingStore>,
    pub transport: Arc<FakeTransport>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: MailingDispatcher,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(MailingConfig::default()).await
    }

    pub async fn with_config(config: MailingConfig) -> Self {
        let (pool, store) = memory_store().await;
        let store = Arc::new(store);
        let transport = Arc::new(FakeTransport::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let dispatcher = MailingDispatcher::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            config,
        );

        Self {
            pool,
            store,
            transport,
            clock,
            dispatcher,
        }
    }

    /// Crea un mailing con un destinatario por email y lo deja en `status`.
    pub async fn seed_mailing(
        &self,
        subject: &str,
        periodicity: Periodicity,
        status: MailingStatus,
        actual_end_time: Option<DateTime<Utc>>,
    ) -> MailingRecord {
        let message = self
            .store
            .create_message(subject, Some("Hola"))
            .await
            .unwrap();
        let email = format!("{}@example.com", subject.to_lowercase().replace(' ', "."));
        let client = self
            .store
            .create_client(&email, "Cliente de prueba", None)
            .await
            .unwrap();

        let mut mailing = self
            .store
            .create_mailing(NewMailing {
                description: Some(subject.to_string()),
                start_time: t0() - chrono::Duration::days(1),
                periodicity,
                message_id: message.id,
                actual_end_time,
                client_ids: vec![client.id],
            })
            .await
            .unwrap();

        if status != MailingStatus::Created {
            let ok = self
                .store
                .update_status(&mailing.id, MailingStatus::Created, status, None)
                .await
                .unwrap();
            assert!(ok);
            mailing.status = status;
        }
        mailing
    }

    pub async fn status_of(&self, mailing_id: &str) -> MailingStatus {
        self.store.get_mailing(mailing_id).await.unwrap().status
    }

    pub async fn attempts_of(
        &self,
        mailing_id: &str,
    ) -> Vec<crate::models::mailing_model::MailingAttemptRecord> {
        self.store.list_attempts(mailing_id).await.unwrap()
    }
}
