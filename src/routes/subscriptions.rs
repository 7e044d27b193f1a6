use std::collections::HashMap;
use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::domain::NewSubscription;
use crate::domain::SubscriberEmail;
use crate::domain::ValidationIssue;
use crate::domain::DEFAULT_SOURCE;
use crate::mailing_list_client::MailingListClient;
use crate::mailing_list_client::ProviderCredentials;
use crate::notifications::SignupNotifier;
use crate::tag_sync::TagSynchronizer;
use crate::utils::error_chain_fmt;

const SUBSCRIBED: &str = "Successfully subscribed to email list";
const REJECTED_FALLBACK: &str = "Invalid email address or already subscribed";

/// Request body as sent by the site's signup forms. Everything is optional at
/// this stage so that a missing `email` becomes a field-level validation issue
/// rather than an opaque deserialisation error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    email: Option<String>,
    first_name: Option<String>,
    source: Option<String>,
    tags: Option<Vec<String>>,
    custom_fields: Option<HashMap<String, String>>,
}

impl TryFrom<SubscribeBody> for NewSubscription {
    type Error = Vec<ValidationIssue>;
    fn try_from(body: SubscribeBody) -> Result<Self, Self::Error> {
        let email = match body.email {
            Some(email) => SubscriberEmail::parse(email)
                .map_err(|_| vec![ValidationIssue::field("email", "Invalid email address")])?,
            None => return Err(vec![ValidationIssue::field("email", "Required")]),
        };

        Ok(NewSubscription {
            email,
            first_name: body.first_name,
            source: body
                .source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            tags: body.tags.unwrap_or_default(),
            custom_fields: body.custom_fields.unwrap_or_default(),
        })
    }
}

/// Success body of the provider's subscribe call. Only `subscription` is
/// looked at, and only to check that it is there.
#[derive(Deserialize)]
struct ProviderConfirmation {
    subscription: Option<Value>,
}

/// Error body of the provider's subscribe call
#[derive(Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SubscribeResponse {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscription: Option<Value>,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [ValidationIssue]>,
}

/// The `Display` of each variant is exactly what the caller gets to see;
/// the underlying cause, if any, only ever reaches the logs (via `Debug`).
#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Invalid request data")]
    ValidationError(Vec<ValidationIssue>),
    #[error("Email service configuration error")]
    ConfigurationError,
    /// Provider refused the address; the message is the provider's own.
    #[error("{0}")]
    Rejected(String),
    #[error("Failed to subscribe to email list")]
    ProviderError(#[source] anyhow::Error),
    #[error("Internal server error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl Debug for SubscribeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::ConfigurationError | Self::ProviderError(_) | Self::UnexpectedError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            Self::ValidationError(issues) => Some(issues.as_slice()),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            details,
        })
    }
}

/// A body that is not JSON at all is treated like any other unexpected
/// failure; a JSON body of the wrong shape is the caller's mistake.
fn parse_body(body: &[u8]) -> Result<NewSubscription, SubscribeError> {
    let body: SubscribeBody = match serde_json::from_slice(body) {
        Ok(body) => body,
        Err(e) if e.is_data() => {
            return Err(SubscribeError::ValidationError(vec![
                ValidationIssue::body(e.to_string()),
            ]))
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Request body is not JSON").into()),
    };
    body.try_into().map_err(SubscribeError::ValidationError)
}

/// Map a non-2xx provider response to what the caller sees. Only a 400 is
/// treated as the caller's problem; its message is passed through if the
/// provider sent one.
fn provider_rejection(
    status: reqwest::StatusCode,
    body: &str,
) -> SubscribeError {
    if status != reqwest::StatusCode::BAD_REQUEST {
        return SubscribeError::ProviderError(anyhow::anyhow!(
            "provider responded with {status}: {body}"
        ));
    }

    tracing::warn!(provider_response = %body, "provider rejected subscription");
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|e| {
            e.message
                .filter(|m| !m.is_empty())
                .or(e.error.filter(|m| !m.is_empty()))
        })
        .unwrap_or_else(|| REJECTED_FALLBACK.to_string());
    SubscribeError::Rejected(message)
}

/// `POST /api/subscribe`
///
/// Subscribes the email with the provider's form, then tags the new
/// subscriber. Tagging is best-effort: it is awaited, but however many tags
/// fail, the response is still a success.
///
/// ```sh
///     curl -v -H 'Content-Type: application/json' \
///         -d '{"email":"john@foo.com","firstName":"John","tags":["blog-reader"]}' \
///         http://127.0.0.1:8000/api/subscribe
/// ```
#[tracing::instrument(
    name = "Subscribing to mailing list",
    skip_all,
    fields(
        subscriber_email = tracing::field::Empty,
        source = tracing::field::Empty,
    )
)]
pub async fn subscribe(
    body: web::Bytes,
    client: web::Data<MailingListClient>,
    credentials: web::Data<ProviderCredentials>,
    tag_sync: web::Data<TagSynchronizer>,
    notifier: web::Data<SignupNotifier>,
) -> Result<HttpResponse, SubscribeError> {
    let new_sub = parse_body(&body)?;
    tracing::Span::current()
        .record("subscriber_email", tracing::field::display(&new_sub.email))
        .record("source", tracing::field::display(&new_sub.source));

    let (api_secret, form_id) = credentials.require().ok_or_else(|| {
        tracing::error!("mailing-list api secret or form id is not configured");
        SubscribeError::ConfigurationError
    })?;

    let response = client
        .subscribe(api_secret, form_id, &new_sub)
        .await
        .context("Failed to reach the mailing-list provider")?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .context("Failed to read the provider's error response")?;
        return Err(provider_rejection(status, &body));
    }

    let confirmation: ProviderConfirmation = response
        .json()
        .await
        .context("Failed to parse the provider's subscribe response")?;

    if !new_sub.tags.is_empty() {
        match confirmation.subscription {
            Some(_) => {
                let outcome = tag_sync
                    .apply_tags_to_subscriber(api_secret, &new_sub.tags, &new_sub.email)
                    .await;
                tracing::info!(
                    tags_applied = outcome.success,
                    tags_failed = outcome.failed,
                    "finished tagging subscriber"
                );
            }
            None => tracing::warn!("provider returned no subscription, skipping tags"),
        }
    }

    notifier.notify(&new_sub).await;

    Ok(HttpResponse::Ok().json(SubscribeResponse {
        success: true,
        message: SUBSCRIBED,
        subscription: confirmation.subscription,
    }))
}
