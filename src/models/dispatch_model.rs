//! models/dispatch_model.rs
//! Resultado agregado de una pasada del dispatcher.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::mailing_model::AttemptStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Strict,
    BestEffort,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Strict => "strict",
            PassKind::BestEffort => "best_effort",
        }
    }
}

/// Qué pasó con un mailing durante una pasada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MailingOutcome {
    /// Se llamó al transporte y quedó un intento registrado
    Sent { attempt_status: AttemptStatus },
    /// Pasó su fecha de fin, marcado como completed sin enviar
    Completed,
    NotDue,
    /// Otro envío tiene tomado el lease de este mailing
    Busy,
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MailingPassEntry {
    pub mailing_id: String,
    #[serde(flatten)]
    pub outcome: MailingOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub kind: PassKind,
    pub now: DateTime<Utc>,
    pub entries: Vec<MailingPassEntry>,
}

impl PassReport {
    pub fn new(kind: PassKind, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            now,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, mailing_id: &str, outcome: MailingOutcome) {
        self.entries.push(MailingPassEntry {
            mailing_id: mailing_id.to_string(),
            outcome,
        });
    }

    pub fn outcome_for(&self, mailing_id: &str) -> Option<&MailingOutcome> {
        self.entries
            .iter()
            .find(|e| e.mailing_id == mailing_id)
            .map(|e| &e.outcome)
    }

    fn count(&self, pred: impl Fn(&MailingOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn sent(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                MailingOutcome::Sent {
                    attempt_status: AttemptStatus::Success
                }
            )
        })
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                MailingOutcome::Sent {
                    attempt_status: AttemptStatus::Failed
                }
            )
        })
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, MailingOutcome::Completed))
    }

    pub fn errors(&self) -> usize {
        self.count(|o| matches!(o, MailingOutcome::Error { .. }))
    }

    /// Resumen de una línea para el log
    pub fn summary(&self) -> String {
        format!(
            "pass={} mailings={} sent={} failed={} completed={} errors={}",
            self.kind.as_str(),
            self.entries.len(),
            self.sent(),
            self.failed(),
            self.completed(),
            self.errors()
        )
    }
}
