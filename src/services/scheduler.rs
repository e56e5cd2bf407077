//! services/scheduler.rs
//! Bucle periódico que lanza la pasada estricta cada `tick_interval`.
//! Cada tick espera a que termine la pasada anterior, así nunca se solapan.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::models::dispatch_model::PassReport;
use crate::services::dispatcher::{DispatchError, MailingDispatcher};

#[derive(Clone)]
pub struct MailingScheduler {
    dispatcher: MailingDispatcher,
    tick_interval: Duration,
}

impl MailingScheduler {
    pub fn new(dispatcher: MailingDispatcher, tick_interval: Duration) -> Self {
        Self {
            dispatcher,
            tick_interval,
        }
    }

    /// Una sola pasada estricta con la hora del reloj del dispatcher.
    pub async fn tick(&self) -> Result<PassReport, DispatchError> {
        let now = self.dispatcher.now();
        self.dispatcher.run_strict_pass(now).await
    }

    /// Corre hasta que `shutdown` pase a `true` (o se cierre el canal).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "Scheduler de mailings iniciado (cada {:?})",
            self.tick_interval
        );

        let mut ticker = interval(self.tick_interval);
        // Si una pasada tarda más que el intervalo, se saltan los ticks perdidos
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => log::debug!("Tick del scheduler: {}", report.summary()),
                        Err(DispatchError::PassInProgress(kind)) => {
                            log::warn!("Pasada '{}' aún en curso, se omite este tick", kind.as_str());
                        }
                        Err(e) => log::error!("Fallo en la pasada programada: {:#}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Scheduler de mailings detenido");
    }
}
