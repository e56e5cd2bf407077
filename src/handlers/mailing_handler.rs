//! handlers/mailing_handler.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::models::mailing_model::{
    CreateMailingRequest, MailingDetailResponse, MailingStatsResponse, MailingStatus,
};
use crate::services::mailing_store::{create_mailing_from_request, MailingStore};

#[derive(Deserialize)]
pub struct MailingListQuery {
    status: Option<MailingStatus>,
}

fn not_found_or_500(e: anyhow::Error) -> HttpResponse {
    if e.to_string().contains("not found") {
        HttpResponse::NotFound().json(json!({
            "success": false,
            "error": e.to_string()
        }))
    } else {
        log::error!("Mailing handler error: {:#}", e);
        HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{:#}", e)
        }))
    }
}

/// GET /api/mailings
pub async fn list_mailings_endpoint(
    store: web::Data<dyn MailingStore>,
    query: web::Query<MailingListQuery>,
) -> HttpResponse {
    let statuses = match query.status {
        Some(status) => vec![status],
        None => vec![
            MailingStatus::Created,
            MailingStatus::Started,
            MailingStatus::Completed,
        ],
    };

    match store.list_mailings(&statuses).await {
        Ok(mailings) => HttpResponse::Ok().json(mailings),
        Err(e) => not_found_or_500(e),
    }
}

/// POST /api/mailings
pub async fn create_mailing_endpoint(
    store: web::Data<dyn MailingStore>,
    body: web::Json<CreateMailingRequest>,
) -> HttpResponse {
    let req = body.into_inner();
    if let Err(e) = req.validate() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": e.to_string()
        }));
    }

    match create_mailing_from_request(store.get_ref(), req).await {
        Ok(mailing) => HttpResponse::Created().json(mailing),
        Err(e) => not_found_or_500(e),
    }
}

/// GET /api/mailings/{id}
pub async fn get_mailing_endpoint(
    store: web::Data<dyn MailingStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let mailing_id = path.into_inner();

    let detail = async {
        let mailing = store.get_mailing(&mailing_id).await?;
        let message = store.get_message(&mailing.message_id).await?;
        let recipients = store.list_recipients(&mailing.id).await?;
        Ok::<_, anyhow::Error>(MailingDetailResponse {
            mailing,
            message,
            recipients,
        })
    };

    match detail.await {
        Ok(detail) => HttpResponse::Ok().json(detail),
        Err(e) => not_found_or_500(e),
    }
}

/// GET /api/mailings/{id}/attempts
pub async fn list_attempts_endpoint(
    store: web::Data<dyn MailingStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let mailing_id = path.into_inner();

    if let Err(e) = store.get_mailing(&mailing_id).await {
        return not_found_or_500(e);
    }

    match store.list_attempts(&mailing_id).await {
        Ok(attempts) => HttpResponse::Ok().json(attempts),
        Err(e) => not_found_or_500(e),
    }
}

/// GET /api/stats
pub async fn stats_endpoint(store: web::Data<dyn MailingStore>) -> HttpResponse {
    let stats = async {
        Ok::<_, anyhow::Error>(MailingStatsResponse {
            total_mailings: store.count_mailings(None).await?,
            active_mailings: store.count_mailings(Some(MailingStatus::Started)).await?,
            unique_clients: store.count_clients().await?,
        })
    };

    match stats.await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => not_found_or_500(e),
    }
}
