//! app.rs
use crate::handlers::{dispatch_handler, mailing_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/dispatch")
                    .route(
                        "/strict",
                        web::post().to(dispatch_handler::run_strict_pass_endpoint),
                    )
                    .route(
                        "/best-effort",
                        web::post().to(dispatch_handler::run_best_effort_pass_endpoint),
                    ),
            )
            .service(
                web::scope("/mailings")
                    .route("", web::get().to(mailing_handler::list_mailings_endpoint))
                    .route("", web::post().to(mailing_handler::create_mailing_endpoint))
                    .route("/{id}", web::get().to(mailing_handler::get_mailing_endpoint))
                    .route(
                        "/{id}/attempts",
                        web::get().to(mailing_handler::list_attempts_endpoint),
                    )
                    .route(
                        "/{id}/send",
                        web::post().to(dispatch_handler::send_mailing_endpoint),
                    ),
            )
            .route("/stats", web::get().to(mailing_handler::stats_endpoint)),
    );
}
