use evote_backend::{cluster::LocalCluster, overlay::ServerIdentity, Config};
use log::{error, info, LevelFilter};
use rocket::{figment::Error as FigmentError, futures::future::try_join_all, Error as RocketError};
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error("Failed to load configuration: {0}")]
    ConfigError(#[from] FigmentError),
    #[error("{nodes} nodes do not fit above port {port}")]
    PortRange { port: u16, nodes: usize },
    #[error(transparent)]
    RocketError(#[from] RocketError),
}

async fn run() -> Result<(), Error> {
    info!("Configuring cluster...");
    let figment = rocket::Config::figment();
    let config: Config = figment.extract()?;
    let base: rocket::Config = figment.extract()?;

    // Node `i` listens on the configured port plus `i`.
    let ports = config.ports(base.port).ok_or(Error::PortRange {
        port: base.port,
        nodes: config.nodes(),
    })?;
    let identities = ports
        .iter()
        .map(|port| ServerIdentity::new(format!("http://{}:{port}", base.address)))
        .collect();
    let cluster = LocalCluster::with_identities(identities, &config).await;

    let mut rockets = Vec::with_capacity(ports.len());
    for (service, port) in cluster.services().iter().zip(ports) {
        let figment = figment.clone().merge(("port", port));
        rockets.push(evote_backend::build(service.clone(), figment).ignite().await?);
    }
    info!("...cluster of {} nodes configured!", rockets.len());

    // Disable rocket logging from now on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let result = try_join_all(rockets.into_iter().map(|rocket| rocket.launch())).await;
    cluster.shutdown().await;
    result?;
    Ok(())
}

#[rocket::main]
async fn main() {
    // Set up logging.
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    // Launch the cluster.
    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
