//! handlers/dispatch_handler.rs
//! Disparo manual de pasadas y envíos puntuales.

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::models::dispatch_model::PassReport;
use crate::services::dispatcher::{DispatchError, MailingDispatcher};

fn pass_response(result: Result<PassReport, DispatchError>) -> HttpResponse {
    match result {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "summary": report.summary(),
            "report": report
        })),
        Err(e @ DispatchError::PassInProgress(_)) => HttpResponse::Conflict().json(json!({
            "success": false,
            "error": e.to_string()
        })),
        Err(e) => {
            log::error!("Dispatch pass error: {:#}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{:#}", e)
            }))
        }
    }
}

/// POST /api/dispatch/strict
pub async fn run_strict_pass_endpoint(dispatcher: web::Data<MailingDispatcher>) -> HttpResponse {
    let now = dispatcher.now();
    pass_response(dispatcher.run_strict_pass(now).await)
}

/// POST /api/dispatch/best-effort
pub async fn run_best_effort_pass_endpoint(
    dispatcher: web::Data<MailingDispatcher>,
) -> HttpResponse {
    let now = dispatcher.now();
    pass_response(dispatcher.run_best_effort_pass(now).await)
}

/// POST /api/mailings/{id}/send
pub async fn send_mailing_endpoint(
    dispatcher: web::Data<MailingDispatcher>,
    path: web::Path<String>,
) -> HttpResponse {
    let mailing_id = path.into_inner();

    match dispatcher.send(&mailing_id).await {
        Ok(attempt) => HttpResponse::Ok().json(json!({
            "success": true,
            "attempt": attempt
        })),
        Err(e @ DispatchError::Busy(_)) => HttpResponse::Conflict().json(json!({
            "success": false,
            "error": e.to_string()
        })),
        Err(e) => {
            let status_code = if e.to_string().contains("not found") {
                actix_web::http::StatusCode::NOT_FOUND
            } else {
                log::error!("Send mailing error: {:#}", e);
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            };

            HttpResponse::build(status_code).json(json!({
                "success": false,
                "error": format!("{:#}", e)
            }))
        }
    }
}
