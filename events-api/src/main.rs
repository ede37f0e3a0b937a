mod chart;
mod config;
mod http;

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;

use events_db::Store;
use events_ingest::Engine;
use log::{error, info};
use rocket::figment::Figment;

use crate::chart::NullChartRenderer;
use crate::config::Config;
use crate::http::AppState;

fn build_cors(cors_origins: Option<Vec<String>>) -> rocket_cors::Cors {
    let allowed_origins = match cors_origins {
        Some(origins) => rocket_cors::AllowedOrigins::some_exact(&origins),
        None => rocket_cors::AllowedOrigins::all(),
    };

    rocket_cors::CorsOptions {
        allowed_origins,
        ..Default::default()
    }
    .to_cors()
    .expect("CORS specification should be valid")
}

fn rocket_figment(config: &Config) -> Figment {
    let address: IpAddr = config
        .api_host
        .parse()
        .unwrap_or_else(|_| "0.0.0.0".parse().unwrap());

    rocket::Config::figment()
        .merge(("address", address))
        .merge(("port", config.api_port))
}

async fn run() -> miette::Result<()> {
    env_logger::init();

    let config = Config::load().map_err(|err| miette::miette!("invalid configuration: {err}"))?;

    info!("Opening event store at {}", config.database_path);
    let store = Store::initialize(&config.database_path)
        .map_err(|err| miette::miette!("failed to open event store: {err}"))?;

    let client = events_client::EventsClient::new("events-api/0.1", config.github_token.clone());
    let engine = Arc::new(Engine::new(client, store.clone(), config.ingest_config()));

    let ingest_handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    let state = AppState {
        store,
        engine: engine.clone(),
        chart_renderer: Arc::new(NullChartRenderer),
    };

    let cors = build_cors(config.cors_origin_list());
    let figment = rocket_figment(&config);

    let rocket = rocket::custom(figment)
        .attach(cors)
        .manage(state)
        .mount("/", http::routes());

    info!("Binding HTTP surface on {}:{}", config.api_host, config.api_port);

    let ignited = rocket
        .launch()
        .await
        .map_err(|err| miette::miette!("rocket failed to launch: {err}"))?;
    drop(ignited);

    info!("HTTP surface stopped accepting requests, signaling ingestion shutdown");
    engine.cancellation_token().cancel();
    let _ = ingest_handle.await;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::blocking::Client;

    fn test_rocket() -> rocket::Rocket<rocket::Build> {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::initialize(db_file.path().to_str().unwrap()).unwrap();
        let client = events_client::EventsClient::new("test-agent", None);
        let engine = Arc::new(Engine::new(client, store.clone(), events_ingest::IngestConfig::default()));

        let state = AppState {
            store,
            engine,
            chart_renderer: Arc::new(NullChartRenderer),
        };

        let port = openport::pick_random_unused_port();
        let figment = rocket::Config::figment().merge(("port", port));

        rocket::custom(figment).manage(state).mount("/", http::routes())
    }

    #[test]
    fn health_reports_ok() {
        let client = Client::tracked(test_rocket()).expect("valid rocket instance");
        let response = client.get("/health").dispatch();
        assert_eq!(response.status(), rocket::http::Status::Ok);
    }

    #[test]
    fn collect_with_out_of_range_limit_is_rejected() {
        let client = Client::tracked(test_rocket()).expect("valid rocket instance");
        let response = client.post("/collect?limit=0").dispatch();
        assert_eq!(response.status(), rocket::http::Status::BadRequest);
    }

    #[test]
    fn pr_interval_without_repo_is_rejected() {
        let client = Client::tracked(test_rocket()).expect("valid rocket instance");
        let response = client.get("/metrics/pr-interval").dispatch();
        assert_eq!(response.status(), rocket::http::Status::BadRequest);
    }

    #[test]
    fn metrics_on_empty_store_return_empty_structures() {
        let client = Client::tracked(test_rocket()).expect("valid rocket instance");
        let response = client.get("/metrics/event-counts").dispatch();
        assert_eq!(response.status(), rocket::http::Status::Ok);
        let body = response.into_string().unwrap();
        assert_eq!(body, "{}");
    }

    #[test]
    fn trending_chart_with_no_renderer_is_a_server_error() {
        let client = Client::tracked(test_rocket()).expect("valid rocket instance");
        let response = client.get("/visualization/trending-chart").dispatch();
        assert_eq!(response.status(), rocket::http::Status::InternalServerError);
    }
}
