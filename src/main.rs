use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::watch;

use crate::config::mailing_config::MailingConfig;
use crate::logger::init_logger;
use crate::services::clock::SystemClock;
use crate::services::dispatcher::MailingDispatcher;
use crate::services::mailing_store::{MailingStore, SqliteMailingStore};
use crate::services::scheduler::MailingScheduler;
use crate::services::transport::SmtpMailTransport;

mod app;
mod config;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(db_path: &str) -> Result<Pool<Sqlite>> {
    // Crear la carpeta del archivo si no existe (p.ej. "data/")
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
        }
    }

    let db_url = format!("sqlite:{}", db_path);
    log::info!("Conectando a SQLite en {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let db_pool = Pool::<Sqlite>::connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = MailingConfig::from_env()?;
    log::info!(
        "Mailing service: remitente={}, zona horaria={}",
        config.from,
        config.timezone
    );

    let db_pool = setup_database(&config.database_path).await?;

    let store = SqliteMailingStore::new(db_pool.clone());
    store.run_migrations().await?;
    let store: Arc<dyn MailingStore> = Arc::new(store);

    let transport = Arc::new(
        SmtpMailTransport::new(&config.smtp).context("No se pudo configurar el transporte SMTP")?,
    );

    let dispatcher = MailingDispatcher::new(
        store.clone(),
        transport,
        Arc::new(SystemClock),
        config.clone(),
    );

    // Scheduler en background: una pasada estricta por tick, nunca dos a la vez
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = if config.scheduler_enabled {
        let scheduler = MailingScheduler::new(dispatcher.clone(), config.tick_interval);
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        log::info!("Scheduler deshabilitado (MAILING_SCHEDULER_ENABLED=false)");
        None
    };

    log::info!("Levantando servidor en {}", config.bind_addr);
    let dispatcher_data = web::Data::new(dispatcher);
    let store_data: web::Data<dyn MailingStore> = web::Data::from(store);
    HttpServer::new(move || {
        App::new()
            .app_data(dispatcher_data.clone())
            .app_data(store_data.clone())
            .configure(app::init_app)
    })
    .workers(1)
    .bind(config.bind_addr.as_str())?
    .run()
    .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            log::error!("El scheduler terminó con error: {}", e);
        }
    }

    Ok(())
}
