//! Main entry point for the campsite booking server.
//! This crate wires the booking service to its database and exposes the REST API.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use booking_services::{BookingService, SystemClock};
use database::database::create_booking_store;
use web_handlers::*;

mod config;

use config::ServerConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting campsite booking server...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Create the booking store
    let store = match create_booking_store(&config.database_url, config.max_connections).await {
        Ok(store) => {
            log::info!("🗃️ Booking store ready");
            store
        }
        Err(e) => {
            log::error!("❌ Failed to prepare the database: {}", e);
            log::error!("💡 Check DATABASE_URL (postgres:// or sqlite:)");
            std::process::exit(1);
        }
    };

    let booking_service = web::Data::new(BookingService::new(
        store,
        Arc::new(SystemClock),
        config.policy,
    ));

    log::info!(
        "📏 Stays of up to {} nights, booked {}-{} days ahead",
        config.policy.max_nights,
        config.policy.min_days_ahead,
        config.policy.max_days_ahead
    );
    log::info!("🌐 Server will be available at: http://{}", config.bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(booking_service.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(booking_health))
                    .configure(booking_routes),
            )
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
