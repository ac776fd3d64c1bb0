#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use pulse_service::monitoring::IntervalTimer;
use pulse_service::{Config, UptimeService};
use tracing::info;

mod error;
mod routes;

use error::AppError;
use logger::init_tracing;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::load(None)?;
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let service = Arc::new(UptimeService::open(&config).await?);

    let scheduler = service.scheduler().clone();
    let monitor = tokio::spawn(async move {
        scheduler.run(&IntervalTimer, std::future::pending()).await;
    });

    let result = run_server(addr, service).await;
    monitor.abort();
    result
}

async fn run_server(addr: SocketAddr, service: Arc<UptimeService>) -> Result<(), AppError> {
    info!("Listening on {}", addr);
    let service = web::Data::from(service);

    HttpServer::new(move || App::new().app_data(service.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
