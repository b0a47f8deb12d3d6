use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alma::security::redact_key;
use alma::{AlmaBridge, BasePaymentData, InMemoryPaymentRepository};
use alma_server::config::ServerConfig;
use alma_server::routes;
use alma_server::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set, /metrics is disabled");
    }
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, /admin/gateway is disabled");
    }

    let mode = config.gateway.api_mode;
    let key = redact_key(config.gateway.active_api_key());
    let api_root = config.gateway.api_root().to_string();
    let port = config.port;
    let rate_limit_rpm = config.rate_limit_rpm;
    let cors_origins = config.allowed_origins.clone();

    let state = web::Data::new(AppState {
        bridge: AlmaBridge::new(config.gateway),
        payments: Arc::new(InMemoryPaymentRepository::new()),
        data_builder: Arc::new(BasePaymentData),
        public_base_url: config.public_base_url,
        metrics_token: config.metrics_token,
        public_metrics: config.public_metrics,
        admin_token: config.admin_token,
    });

    tracing::info!("Alma gateway listening on port {port}");
    tracing::info!("Alma mode: {mode} ({key}) at {api_root}");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  POST http://localhost:{port}/payments/{{id}}/notify?pid=...");
    tracing::info!("  GET  http://localhost:{port}/payments/{{id}}/status?pid=...");

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("Invalid RATE_LIMIT_RPM: {rate_limit_rpm}");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::notify)
            .service(routes::status)
            .service(routes::create_payment)
            .service(routes::checkout)
            .service(routes::installment_plan)
            .service(routes::admin_gateway)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
