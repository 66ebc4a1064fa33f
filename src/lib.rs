#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{figment::Figment, Build, Rocket};

use crate::{logging::LoggerFairing, service::Service};

pub mod api;
pub mod cluster;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod model;
pub mod overlay;
pub mod protocol;
pub mod scheduled_task;
pub mod service;

pub use config::Config;

/// Build the HTTP front of one node, serving `service`.
pub fn build(service: Arc<Service>, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(LoggerFairing::new(service.identity().clone()))
        .manage(service)
}
