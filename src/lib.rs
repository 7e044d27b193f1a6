pub mod configuration;
pub mod domain;
pub mod mailing_list_client;
pub mod notifications;
pub mod routes;
pub mod startup;
pub mod tag_sync;
pub mod telemetry;
pub mod utils;
