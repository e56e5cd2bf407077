//! models/mailing_model.rs
//! Registros de mailings, mensajes, clientes e intentos de envío.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lettre::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Estado de un mailing. Solo avanza: created -> started -> completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailingStatus {
    Created,
    Started,
    Completed,
}

impl MailingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailingStatus::Created => "created",
            MailingStatus::Started => "started",
            MailingStatus::Completed => "completed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            MailingStatus::Created => 0,
            MailingStatus::Started => 1,
            MailingStatus::Completed => 2,
        }
    }

    /// `true` si pasar de `self` a `next` no retrocede el estado.
    pub fn can_advance_to(&self, next: MailingStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(MailingStatus::Created),
            "started" => Ok(MailingStatus::Started),
            "completed" => Ok(MailingStatus::Completed),
            other => Err(anyhow::anyhow!("Estado de mailing desconocido: {other}")),
        }
    }
}

/// Política de reenvío.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Weekly,
    Monthly,
}

impl Periodicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::Daily => "daily",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
        }
    }

    /// Días completos que deben pasar desde el último intento.
    pub fn min_elapsed_days(&self) -> i64 {
        match self {
            Periodicity::Daily => 1,
            Periodicity::Weekly => 7,
            Periodicity::Monthly => 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("periodicidad desconocida: '{0}'")]
pub struct PolicyError(pub String);

impl FromStr for Periodicity {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Periodicity::Daily),
            "weekly" => Ok(Periodicity::Weekly),
            "monthly" => Ok(Periodicity::Monthly),
            other => Err(PolicyError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptStatus::Success),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(anyhow::anyhow!("Estado de intento desconocido: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingRecord {
    pub id: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Texto tal cual está en DB; se valida al decidir si toca enviar.
    pub periodicity: String,
    pub status: MailingStatus,
    pub message_id: String,
    pub actual_end_time: Option<DateTime<Utc>>,
}

impl MailingRecord {
    pub fn periodicity(&self) -> Result<Periodicity, PolicyError> {
        self.periodicity.parse()
    }

    /// Nombre legible para logs.
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub subject: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingAttemptRecord {
    pub id: String,
    pub mailing_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttemptStatus,
    pub server_response: Option<String>,
}

/// Intento aún no persistido (el id lo pone la DB).
#[derive(Debug, Clone)]
pub struct NewMailingAttempt {
    pub mailing_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttemptStatus,
    pub server_response: Option<String>,
}

/// Datos para insertar un mailing (siempre arranca en `created`)
#[derive(Debug, Clone)]
pub struct NewMailing {
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub periodicity: Periodicity,
    pub message_id: String,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub client_ids: Vec<String>,
}

/// Request para crear un mailing con su mensaje y destinatarios
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMailingRequest {
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub periodicity: Periodicity,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub subject: String,
    pub body: Option<String>,
    pub recipients: Vec<RecipientRequest>,
}

impl CreateMailingRequest {
    /// Un mailing nuevo necesita destinatarios con email válido y, si trae fecha de fin,
    /// que sea posterior al inicio.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.subject.trim().is_empty() {
            anyhow::bail!("El asunto no puede estar vacío");
        }
        if self.recipients.is_empty() {
            anyhow::bail!("El mailing necesita al menos un destinatario");
        }
        for r in &self.recipients {
            // Mismo parser que usa el transporte al enviar
            if let Err(e) = r.email.trim().parse::<Address>() {
                anyhow::bail!("Email de destinatario inválido '{}': {}", r.email, e);
            }
        }
        if let Some(end) = self.actual_end_time {
            if end <= self.start_time {
                anyhow::bail!("actual_end_time ({end}) debe ser posterior a start_time");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientRequest {
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MailingDetailResponse {
    #[serde(flatten)]
    pub mailing: MailingRecord,
    pub message: MessageRecord,
    pub recipients: Vec<ClientRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MailingStatsResponse {
    pub total_mailings: u64,
    pub active_mailings: u64,
    pub unique_clients: u64,
}
