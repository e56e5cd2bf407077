//! services/due_policy.rs
//! Decide si a un mailing le toca (re)enviarse según su periodicidad.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::mailing_model::{MailingAttemptRecord, MailingRecord};

/// Función pura: sin I/O, sin efectos.
///
/// - Sin intentos previos siempre toca.
/// - Si no, se cuentan los días completos desde el intento más reciente
///   (ambas fechas en la zona `tz`) y se comparan con la periodicidad.
/// - Una periodicidad desconocida se trata como "no toca" y se loguea.
pub fn is_due(
    mailing: &MailingRecord,
    attempts: &[MailingAttemptRecord],
    now: DateTime<Utc>,
    tz: Tz,
) -> bool {
    let Some(last) = attempts.iter().max_by_key(|a| a.timestamp) else {
        return true;
    };

    let periodicity = match mailing.periodicity() {
        Ok(p) => p,
        Err(e) => {
            log::warn!(
                "Mailing {}: {}; se considera no pendiente",
                mailing.id,
                e
            );
            return false;
        }
    };

    let now_local = now.with_timezone(&tz);
    let last_local = last.timestamp.with_timezone(&tz);
    let elapsed_days = (now_local - last_local).num_days();

    log::debug!(
        "Último intento de {}: {}, hace {} días",
        mailing.label(),
        last_local,
        elapsed_days
    );

    elapsed_days >= periodicity.min_elapsed_days()
}
