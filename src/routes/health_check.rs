use actix_web::HttpResponse;

/// `GET /health_check`
///
/// Liveness probe for the hosting platform. Never touches the provider.
pub async fn health_check() -> HttpResponse { HttpResponse::Ok().finish() }
