use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::http::Method;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::notifications::SignupNotifier;
use crate::routes::health_check;
use crate::routes::mailing_list_diagnostics;
use crate::routes::subscribe;
use crate::routes::subscribe_preflight;
use crate::tag_sync::TagCache;
use crate::tag_sync::TagSynchronizer;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    /// Left private; use `port` to access
    port: u16,
    server: Server,
}

impl Application {
    /// Bind the configured address and build the `Server`. Does not start
    /// serving; see `run_until_stopped`.
    pub fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // with port 0, this is whatever the OS picked
        let port = listener.local_addr()?.port();

        let server = run(listener, cfg)?;
        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// The server only listens to an already bound address.
///
/// Declares all API endpoints. Every worker gets its own `App`, but the tag
/// cache is created once, here, and shared by all of them.
pub fn run(
    listener: TcpListener,
    cfg: Settings,
) -> Result<Server, anyhow::Error> {
    let client = cfg.mailing_list.client()?;
    let tag_cache = Arc::new(TagCache::new(cfg.mailing_list.tag_cache_ttl()?));
    let notifier = SignupNotifier::new(
        cfg.notifications.webhook_url.clone(),
        cfg.mailing_list.timeout(),
    )?;

    let tag_sync = web::Data::new(TagSynchronizer::new(client.clone(), tag_cache));
    let client = web::Data::new(client);
    let credentials = web::Data::new(cfg.mailing_list.credentials());
    let notifier = web::Data::new(notifier);
    let mailing_list = web::Data::new(cfg.mailing_list);
    let deploy = web::Data::new(cfg.deploy);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/api/subscribe")
                    .route(web::post().to(subscribe))
                    .route(web::method(Method::OPTIONS).to(subscribe_preflight)),
            )
            .route(
                "/api/debug/mailing-list",
                web::get().to(mailing_list_diagnostics),
            )
            .app_data(client.clone())
            .app_data(credentials.clone())
            .app_data(tag_sync.clone())
            .app_data(notifier.clone())
            .app_data(mailing_list.clone())
            .app_data(deploy.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
