use serde_json::json;
use serde_json::Value;
use wiremock::matchers::body_json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

use crate::helpers::spawn_app;
use crate::helpers::spawn_app_with;
use crate::helpers::API_SECRET;
use crate::helpers::FORM_ID;

fn subscribe_path() -> String { format!("/forms/{FORM_ID}/subscribe") }

#[tokio::test]
async fn subscribe_ok() {
    let app = spawn_app().await;
    app.provider_accepts_subscription().await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Successfully subscribed to email list");
    assert_eq!(body["subscription"]["id"], 1);
}

#[tokio::test]
async fn subscribe_sends_defaults_to_provider() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .and(body_json(json!({
            "api_secret": API_SECRET,
            "email": "test@example.com",
            "first_name": "",
            "fields": {"source": "website"},
            "tags": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscription": {"id": 1}})))
        .expect(1)
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn subscribe_sends_custom_fields_and_tags_to_provider() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .and(body_json(json!({
            "api_secret": API_SECRET,
            "email": "test@example.com",
            "first_name": "Test",
            "fields": {"source": "adventure-ignition", "budget": "10000"},
            "tags": ["adventure-game"]
        })))
        // no subscription reported, so no tagging follows
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({
            "email": "test@example.com",
            "firstName": "Test",
            "source": "adventure-ignition",
            "tags": ["adventure-game"],
            "customFields": {"budget": "10000"}
        }))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("subscription").is_none());
    assert_eq!(app.provider_requests_to("/tags").await, 0);
}

#[tokio::test]
async fn invalid_email_is_rejected_before_provider() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "invalid-email"}))
        .await;

    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid request data");
    assert_eq!(body["details"][0]["path"], json!(["email"]));
    assert_eq!(body["details"][0]["message"], "Invalid email address");
}

#[tokio::test]
async fn malformed_requests_are_400() {
    let app = spawn_app().await;

    for (body, msg) in [
        (json!({}), "missing email"),
        (json!({"firstName": "Test"}), "only name"),
        (json!({"email": ""}), "empty email"),
        (json!({"email": 42}), "email not a string"),
        (json!({"email": "test@example.com", "tags": "adventure-game"}), "tags not a list"),
        (json!(["test@example.com"]), "not an object"),
    ] {
        let resp = app.post_subscribe(&body).await;
        assert_eq!(resp.status().as_u16(), 400, "{msg}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Invalid request data", "{msg}");
        assert!(body["details"].is_array(), "{msg}");
    }
    assert_eq!(app.provider_requests_to(&subscribe_path()).await, 0);
}

#[tokio::test]
async fn body_that_is_not_json_is_500() {
    let app = spawn_app().await;

    for body in ["", "email=test%40example.com", "{\"email\":"] {
        let resp = app.post_subscribe_raw(body).await;
        assert_eq!(resp.status().as_u16(), 500, "{body:?}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Internal server error");
    }
}

#[tokio::test]
async fn missing_credentials_are_500_without_provider_call() {
    for (secret, form_id) in [(None, Some("123")), (Some("secret"), None), (Some(""), Some("123"))] {
        let app = spawn_app_with(|cfg| {
            cfg.mailing_list.api_secret = secret.map(|s| secrecy::Secret::new(s.to_string()));
            cfg.mailing_list.form_id = form_id.map(str::to_string);
        })
        .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&app.provider_server)
            .await;

        let resp = app
            .post_subscribe(&json!({"email": "test@example.com"}))
            .await;

        assert_eq!(resp.status().as_u16(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Email service configuration error");
    }
}

#[tokio::test]
async fn validation_comes_before_configuration() {
    let app = spawn_app_with(|cfg| cfg.mailing_list.api_secret = None).await;

    let resp = app
        .post_subscribe(&json!({"email": "invalid-email"}))
        .await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn provider_400_message_is_passed_through() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "INVALID_EMAIL",
            "message": "Email address is invalid"
        })))
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;

    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Email address is invalid");
}

#[tokio::test]
async fn provider_400_without_json_gets_generic_message() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid JSON response"))
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;

    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid email address or already subscribed");
}

#[tokio::test]
async fn other_provider_errors_are_500() {
    for status in [401, 404, 422, 500, 503] {
        let app = spawn_app().await;
        Mock::given(method("POST"))
            .and(path(subscribe_path()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "nope"})))
            .mount(&app.provider_server)
            .await;

        let resp = app
            .post_subscribe(&json!({"email": "test@example.com"}))
            .await;

        assert_eq!(resp.status().as_u16(), 500, "{status}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Failed to subscribe to email list", "{status}");
    }
}

#[tokio::test]
async fn provider_success_that_is_not_json_is_500() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;

    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn unreachable_provider_is_500() {
    // bind then release a port, so that nothing is listening on it
    let free_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let app = spawn_app_with(|cfg| {
        cfg.mailing_list.base_url = format!("http://127.0.0.1:{free_port}")
    })
    .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com", "tags": ["a"]}))
        .await;

    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn requested_tags_are_resolved_and_applied() {
    let app = spawn_app().await;
    app.provider_accepts_subscription().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .and(query_param("api_secret", API_SECRET))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"tags": [{"id": 11, "name": "adventure-game"}]})),
        )
        // both names miss the cold cache concurrently, so each may list
        .expect(1..=2)
        .mount(&app.provider_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags"))
        .and(body_json(json!({
            "api_secret": API_SECRET,
            "tag": {"name": "ignition-interested"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"tag": {"id": 12}})))
        .expect(1)
        .mount(&app.provider_server)
        .await;
    for tag_id in [11, 12] {
        Mock::given(method("POST"))
            .and(path(format!("/tags/{tag_id}/subscribe")))
            .and(body_json(json!({
                "api_secret": API_SECRET,
                "email": "test@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscription": {}})))
            .expect(1)
            .mount(&app.provider_server)
            .await;
    }

    let resp = app
        .post_subscribe(&json!({
            "email": "test@example.com",
            "tags": ["adventure-game", "ignition-interested"]
        }))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn failing_tags_do_not_fail_the_signup() {
    let app = spawn_app().await;
    app.provider_accepts_subscription().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": [
            {"id": 11, "name": "a"},
            {"id": 12, "name": "b"}
        ]})))
        .mount(&app.provider_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/11/subscribe"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.provider_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/12/subscribe"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.provider_server)
        .await;
    // "c" is unknown and cannot be created
    Mock::given(method("POST"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com", "tags": ["a", "b", "c"]}))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn tag_listing_is_cached_across_requests() {
    let app = spawn_app().await;
    app.provider_accepts_subscription().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tags": [{"id": 11, "name": "a"}]})),
        )
        .expect(1)
        .mount(&app.provider_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/11/subscribe"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.provider_server)
        .await;

    for email in ["one@example.com", "two@example.com"] {
        let resp = app
            .post_subscribe(&json!({"email": email, "tags": ["a"]}))
            .await;
        assert_eq!(resp.status().as_u16(), 200);
    }
}

#[tokio::test]
async fn empty_tag_list_touches_no_tag_endpoint() {
    let app = spawn_app().await;
    app.provider_accepts_subscription().await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com", "tags": []}))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(app.provider_requests_to("/tags").await, 0);
}

#[tokio::test]
async fn signup_is_announced_to_webhook() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signups"))
        .and(body_json(json!({
            "formType": "email_subscription",
            "email": "test@example.com",
            "name": "Test",
            "source": "blog"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let webhook_url = format!("{}/signups", webhook.uri());
    let app = spawn_app_with(|cfg| cfg.notifications.webhook_url = Some(webhook_url)).await;
    app.provider_accepts_subscription().await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com", "firstName": "Test", "source": "blog"}))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn failed_signup_is_not_announced() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&webhook)
        .await;

    let webhook_url = webhook.uri();
    let app = spawn_app_with(|cfg| cfg.notifications.webhook_url = Some(webhook_url)).await;
    Mock::given(method("POST"))
        .and(path(subscribe_path()))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.provider_server)
        .await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;
    assert_eq!(resp.status().as_u16(), 500);
}

#[tokio::test]
async fn unreachable_webhook_does_not_fail_the_signup() {
    // bind then release a port, so that nothing is listening on it
    let free_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let app = spawn_app_with(|cfg| {
        cfg.notifications.webhook_url = Some(format!("http://127.0.0.1:{free_port}/signups"))
    })
    .await;
    app.provider_accepts_subscription().await;

    let resp = app
        .post_subscribe(&json!({"email": "test@example.com"}))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
}
