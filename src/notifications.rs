use std::collections::HashMap;

use reqwest::Client;
use serde::Serialize;

use crate::domain::NewSubscription;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupNotification<'a> {
    form_type: &'static str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    source: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    additional_data: &'a HashMap<String, String>,
}

/// Tells a chat webhook (Slack or similar) about every new signup.
///
/// Without a `webhook_url` this is a no-op. Delivery failures are logged and
/// otherwise ignored; a signup never fails because of a notification.
#[derive(Clone, Debug)]
pub struct SignupNotifier {
    http_client: Client,
    webhook_url: Option<String>,
}

impl SignupNotifier {
    pub fn new(
        webhook_url: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            webhook_url: webhook_url.filter(|url| !url.trim().is_empty()),
        })
    }

    #[tracing::instrument(name = "Sending signup notification", skip_all)]
    pub async fn notify(
        &self,
        new_sub: &NewSubscription,
    ) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = SignupNotification {
            form_type: "email_subscription",
            email: new_sub.email.as_ref(),
            name: new_sub.first_name.as_deref(),
            source: &new_sub.source,
            additional_data: &new_sub.custom_fields,
        };

        let sent = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = sent {
            tracing::warn!(error.message = %e, "failed to send signup notification");
        }
    }
}
