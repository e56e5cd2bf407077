//! services/dispatcher.rs
//! Recorre los mailings no completados, decide cuáles enviar y registra
//! cada intento. Dos modos:
//!
//! - estricto: respeta periodicidad y fecha de fin, avanza el estado;
//! - best-effort ("hard"): reenvía todo lo no completado sin tocar el estado.
//!
//! En ambos, un error en un mailing se loguea y la pasada sigue.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::timeout;

use crate::{
    config::mailing_config::MailingConfig,
    models::{
        dispatch_model::{MailingOutcome, PassKind, PassReport},
        mailing_model::{
            AttemptStatus, MailingAttemptRecord, MailingRecord, MailingStatus, NewMailingAttempt,
        },
    },
    services::{
        clock::Clock,
        due_policy::is_due,
        mailing_store::MailingStore,
        transport::{MailTransport, TransportError},
    },
};

const PENDING_STATUSES: [MailingStatus; 2] = [MailingStatus::Created, MailingStatus::Started];

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ya hay una pasada '{}' en curso", .0.as_str())]
    PassInProgress(PassKind),
    #[error("Mailing {0} está siendo enviado")]
    Busy(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct MailingDispatcher {
    store: Arc<dyn MailingStore>,
    transport: Arc<dyn MailTransport>,
    clock: Arc<dyn Clock>,
    config: Arc<MailingConfig>,
    leases: Arc<Mutex<HashSet<String>>>,
    strict_guard: Arc<tokio::sync::Mutex<()>>,
    best_effort_guard: Arc<tokio::sync::Mutex<()>>,
}

impl MailingDispatcher {
    pub fn new(
        store: Arc<dyn MailingStore>,
        transport: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        config: MailingConfig,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            config: Arc::new(config),
            leases: Arc::new(Mutex::new(HashSet::new())),
            strict_guard: Arc::new(tokio::sync::Mutex::new(())),
            best_effort_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Pasada estricta
    // ========================================================================

    pub async fn run_strict_pass(&self, now: DateTime<Utc>) -> Result<PassReport, DispatchError> {
        let _pass = self
            .strict_guard
            .try_lock()
            .map_err(|_| DispatchError::PassInProgress(PassKind::Strict))?;

        let mailings = self.store.list_mailings(&PENDING_STATUSES).await?;
        log::debug!(
            "(strict) {} mailings para procesar en {}",
            mailings.len(),
            now
        );

        let mut report = PassReport::new(PassKind::Strict, now);
        for mailing in mailings {
            if mailing.status == MailingStatus::Completed {
                log::debug!("Mailing {} ya está completado", mailing.id);
                continue;
            }

            let outcome = match self.strict_step(&mailing, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("(strict) Error procesando mailing {}: {:#}", mailing.id, e);
                    MailingOutcome::Error {
                        message: format!("{e:#}"),
                    }
                }
            };
            report.push(&mailing.id, outcome);
        }

        log::info!("(strict) {}", report.summary());
        Ok(report)
    }

    async fn strict_step(
        &self,
        mailing: &MailingRecord,
        now: DateTime<Utc>,
    ) -> Result<MailingOutcome> {
        let Some(_lease) = self.try_lease(&mailing.id) else {
            log::warn!("(strict) Mailing {} ocupado por otro envío", mailing.id);
            return Ok(MailingOutcome::Busy);
        };

        // La fecha de fin gana aunque además toque enviar
        if let Some(end_time) = mailing.actual_end_time {
            if end_time <= now {
                self.complete(mailing, end_time).await?;
                return Ok(MailingOutcome::Completed);
            }
        }

        let attempts = self.store.list_attempts(&mailing.id).await?;
        if !is_due(mailing, &attempts, now, self.config.timezone) {
            return Ok(MailingOutcome::NotDue);
        }

        let attempt = self.send_mailing(mailing).await?;

        if mailing.status == MailingStatus::Created && attempt.status == AttemptStatus::Success {
            self.advance(mailing, MailingStatus::Started, None).await?;
            log::info!("Mailing {} iniciado", mailing.label());
        }

        Ok(MailingOutcome::Sent {
            attempt_status: attempt.status,
        })
    }

    async fn complete(&self, mailing: &MailingRecord, end_time: DateTime<Utc>) -> Result<()> {
        self.advance(mailing, MailingStatus::Completed, Some(end_time))
            .await?;
        log::info!(
            "Mailing {} completado (fin programado {})",
            mailing.label(),
            end_time
        );
        Ok(())
    }

    async fn advance(
        &self,
        mailing: &MailingRecord,
        new_status: MailingStatus,
        actual_end_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let updated = self
            .store
            .update_status(&mailing.id, mailing.status, new_status, actual_end_time)
            .await?;

        if !updated {
            // Otro proceso lo cambió entre la lectura y ahora: no pisamos su estado
            log::warn!(
                "Mailing {}: estado ya no es '{}', se descarta el cambio a '{}'",
                mailing.id,
                mailing.status,
                new_status
            );
        }
        Ok(())
    }

    // ========================================================================
    // Pasada best-effort
    // ========================================================================

    pub async fn run_best_effort_pass(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PassReport, DispatchError> {
        let _pass = self
            .best_effort_guard
            .try_lock()
            .map_err(|_| DispatchError::PassInProgress(PassKind::BestEffort))?;

        let mailings = self.store.list_mailings(&PENDING_STATUSES).await?;
        log::debug!("(best_effort) {} mailings para procesar", mailings.len());

        let mut report = PassReport::new(PassKind::BestEffort, now);
        for mailing in mailings {
            if mailing.status == MailingStatus::Completed {
                log::debug!("Mailing {} ya está completado", mailing.id);
                continue;
            }

            let Some(_lease) = self.try_lease(&mailing.id) else {
                log::warn!("(best_effort) Mailing {} ocupado por otro envío", mailing.id);
                report.push(&mailing.id, MailingOutcome::Busy);
                continue;
            };

            log::debug!(
                "Enviando mailing {} con estado {}",
                mailing.id,
                mailing.status
            );
            let outcome = match self.send_mailing(&mailing).await {
                Ok(attempt) => MailingOutcome::Sent {
                    attempt_status: attempt.status,
                },
                Err(e) => {
                    log::error!(
                        "(best_effort) Error procesando mailing {}: {:#}",
                        mailing.id,
                        e
                    );
                    MailingOutcome::Error {
                        message: format!("{e:#}"),
                    }
                }
            };
            report.push(&mailing.id, outcome);
        }

        log::info!("(best_effort) {}", report.summary());
        Ok(report)
    }

    // ========================================================================
    // Envío
    // ========================================================================

    /// Envía un mailing puntual por id (sin cambiar su estado).
    pub async fn send(&self, mailing_id: &str) -> Result<MailingAttemptRecord, DispatchError> {
        let _lease = self
            .try_lease(mailing_id)
            .ok_or_else(|| DispatchError::Busy(mailing_id.to_string()))?;

        let mailing = self.store.get_mailing(mailing_id).await?;
        Ok(self.send_mailing(&mailing).await?)
    }

    /// Llama al transporte y registra exactamente un intento.
    /// Los errores del transporte quedan como intento `failed`; solo
    /// se propagan errores de lectura/escritura en el almacenamiento.
    async fn send_mailing(&self, mailing: &MailingRecord) -> Result<MailingAttemptRecord> {
        let message = self.store.get_message(&mailing.message_id).await?;
        let recipients: Vec<String> = self
            .store
            .list_recipients(&mailing.id)
            .await?
            .into_iter()
            .map(|c| c.email)
            .collect();

        let send_timeout = self.config.send_timeout;
        let delivery = timeout(
            send_timeout,
            self.transport.deliver(
                &self.config.from,
                &message.subject,
                message.body.as_deref().unwrap_or_default(),
                &recipients,
            ),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(send_timeout)));

        let (status, server_response) = match delivery {
            Ok(response) => {
                log::info!(
                    "Mailing {} enviado a {} destinatarios",
                    mailing.label(),
                    recipients.len()
                );
                (AttemptStatus::Success, response.to_string())
            }
            Err(e) => {
                log::error!("Error al enviar mailing {}: {}", mailing.label(), e);
                (AttemptStatus::Failed, e.to_string())
            }
        };

        self.store
            .append_attempt(NewMailingAttempt {
                mailing_id: mailing.id.clone(),
                timestamp: self.clock.now(),
                status,
                server_response: Some(server_response),
            })
            .await
    }

    // ========================================================================
    // Lease por mailing
    // ========================================================================

    fn try_lease(&self, mailing_id: &str) -> Option<MailingLease> {
        let mut held = self.leases.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(mailing_id.to_string()) {
            return None;
        }
        Some(MailingLease {
            mailing_id: mailing_id.to_string(),
            leases: Arc::clone(&self.leases),
        })
    }

    #[cfg(test)]
    pub(crate) fn hold_lease_for_test(&self, mailing_id: &str) -> Option<MailingLease> {
        self.try_lease(mailing_id)
    }
}

/// Libera el lease al salir de scope
pub(crate) struct MailingLease {
    mailing_id: String,
    leases: Arc<Mutex<HashSet<String>>>,
}

impl Drop for MailingLease {
    fn drop(&mut self) {
        let mut held = self.leases.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.mailing_id);
    }
}
