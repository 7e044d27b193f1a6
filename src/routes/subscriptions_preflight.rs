use actix_web::http::header;
use actix_web::web;
use actix_web::HttpResponse;

use crate::configuration::DeploySettings;

/// `OPTIONS /api/subscribe`
///
/// CORS preflight for the signup forms. The allowed origin depends on where
/// this instance is deployed, see `DeploySettings::allowed_origin`.
pub async fn subscribe_preflight(deploy: web::Data<DeploySettings>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, deploy.allowed_origin()))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}
