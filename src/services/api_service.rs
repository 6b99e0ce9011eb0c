use actix_web::{http::StatusCode, middleware::Logger, web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::devices::SensorKind;
use crate::services::aggregator::{Aggregator, DeviceAction, SensorSnapshot, Snapshot};
use crate::utils::error::SensorError;

/// Body of `POST /api`.
#[derive(Debug, Deserialize)]
pub struct ApiRequest {
    pub item: String,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiItem {
    GetPressures,
    GetTemperature,
    GetStatus,
    Action(DeviceAction),
}

impl ApiRequest {
    pub fn parse(&self) -> Result<ApiItem, SensorError> {
        match self.item.as_str() {
            "getpressures" => Ok(ApiItem::GetPressures),
            "gettemperature" => Ok(ApiItem::GetTemperature),
            "getstatus" => Ok(ApiItem::GetStatus),
            "resetmax" | "laser" => DeviceAction::from_request(&self.item, self.command.as_deref()).map(ApiItem::Action),
            other => Err(SensorError::InvalidData(format!("item '{}' not found", other))),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PressureEntry {
    pub pump: String,
    pub pressure: f64,
    pub units: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

/// Pressure readings only; the pyrometer is reported by `gettemperature`.
pub fn pressures(snapshot: &Snapshot) -> Vec<PressureEntry> {
    snapshot
        .readings
        .iter()
        .filter(|r| r.kind != SensorKind::Pyrometer)
        .map(|r| PressureEntry {
            pump: r.id.clone(),
            pressure: r.value,
            units: r.unit.clone(),
        })
        .collect()
}

fn error_status(err: &SensorError) -> (StatusCode, &'static str) {
    match err {
        SensorError::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "DEVICE_NOT_FOUND"),
        SensorError::UnsupportedCommand { .. } => (StatusCode::BAD_REQUEST, "UNSUPPORTED_COMMAND"),
        SensorError::InvalidData(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        SensorError::DeviceNotReady(_) => (StatusCode::CONFLICT, "DEVICE_NOT_READY"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "DEVICE_ERROR"),
    }
}

fn error_response(err: &SensorError) -> HttpResponse {
    let (status, code) = error_status(err);
    if status.is_server_error() {
        error!("❌ API request failed: {}", err);
    } else {
        warn!("⚠️  API request rejected: {}", err);
    }
    HttpResponse::build(status).json(ErrorResponse {
        success: false,
        error: err.to_string(),
        code: code.to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Clone)]
pub struct ApiServiceState {
    pub aggregator: Aggregator,
}

pub struct ApiService {
    state: ApiServiceState,
    server_handle: Option<actix_web::dev::ServerHandle>,
}

impl ApiService {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            state: ApiServiceState { aggregator },
            server_handle: None,
        }
    }

    pub async fn start(&mut self, config: &ApiConfig) -> Result<(), SensorError> {
        info!("🌐 Starting HTTP API server on {}:{}", config.bind, config.port);

        let state_data = web::Data::new(self.state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state_data.clone())
                .wrap(Logger::default())
                .configure(routes)
        })
        .workers(1)
        .bind((config.bind.as_str(), config.port))?
        .run();

        self.server_handle = Some(server.handle());
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("❌ HTTP API server error: {}", e);
            }
        });

        info!("✅ HTTP API server started on port {}", config.port);
        Ok(())
    }

    pub async fn stop(&mut self) {
        let Some(handle) = self.server_handle.take() else {
            return;
        };

        info!("🛑 Stopping HTTP API server...");
        tokio::select! {
            _ = handle.stop(true) => {
                info!("✅ HTTP API server stopped gracefully");
            }
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(10)) => {
                warn!("⚠️  HTTP API server shutdown timeout, forcing stop");
                handle.stop(false).await;
            }
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("", web::post().to(api_request))
            .route("/status", web::get().to(status))
            .route("/health", web::get().to(health_check)),
    );
}

// POST /api
async fn api_request(
    request: web::Json<ApiRequest>,
    state: web::Data<ApiServiceState>,
) -> ActixResult<HttpResponse> {
    let aggregator = &state.aggregator;

    let item = match request.parse() {
        Ok(item) => item,
        Err(e) => return Ok(error_response(&e)),
    };

    // Existing clients expect 201 for every answered request.
    let response = match item {
        ApiItem::GetPressures => Ok(serde_json::json!(pressures(&aggregator.snapshot()))),
        ApiItem::GetTemperature => aggregator.temperature().map(temperature_body),
        ApiItem::GetStatus => serde_json::to_value(aggregator.status_view()).map_err(SensorError::from),
        ApiItem::Action(DeviceAction::ResetMax) => aggregator
            .reset_max()
            .await
            .map(|_| serde_json::json!(pressures(&aggregator.snapshot()))),
        ApiItem::Action(action) => aggregator
            .laser_control(action == DeviceAction::LaserOn)
            .await
            .and_then(|_| aggregator.temperature())
            .map(temperature_body),
    };

    Ok(match response {
        Ok(body) => HttpResponse::Created().json(body),
        Err(e) => error_response(&e),
    })
}

fn temperature_body(reading: SensorSnapshot) -> serde_json::Value {
    serde_json::json!({
        "device": reading.id,
        "temperature": reading.value,
        "units": reading.unit,
        "state": reading.reading,
    })
}

// GET /api/status
async fn status(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.aggregator.status_view()))
}

// GET /api/health
async fn health_check(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let counters = state.aggregator.counters();
    let running = state.aggregator.registry().is_running();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": if running { "healthy" } else { "idle" },
        "service": "Pump Reader API",
        "timestamp": Utc::now(),
        "version": crate::VERSION,
        "counters": counters,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Reading;

    fn request(item: &str, command: Option<&str>) -> ApiRequest {
        ApiRequest {
            item: item.to_string(),
            command: command.map(str::to_string),
        }
    }

    #[test]
    fn test_request_items() {
        assert_eq!(request("getpressures", None).parse().unwrap(), ApiItem::GetPressures);
        assert_eq!(request("gettemperature", None).parse().unwrap(), ApiItem::GetTemperature);
        assert_eq!(request("getstatus", None).parse().unwrap(), ApiItem::GetStatus);
        assert_eq!(
            request("resetmax", None).parse().unwrap(),
            ApiItem::Action(DeviceAction::ResetMax)
        );
        assert_eq!(
            request("laser", Some("on")).parse().unwrap(),
            ApiItem::Action(DeviceAction::LaserOn)
        );
        assert_eq!(
            request("laser", Some("off")).parse().unwrap(),
            ApiItem::Action(DeviceAction::LaserOff)
        );
        assert!(request("laser", None).parse().is_err());
        assert!(request("selfdestruct", None).parse().is_err());
    }

    #[test]
    fn test_request_body_without_command() {
        let req: ApiRequest = serde_json::from_str(r#"{"item": "getpressures"}"#).unwrap();
        assert_eq!(req.item, "getpressures");
        assert!(req.command.is_none());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(error_status(&SensorError::DeviceNotFound("x".into())).0, StatusCode::NOT_FOUND);
        assert_eq!(error_status(&SensorError::DeviceNotReady("pyro".into())).0, StatusCode::CONFLICT);
        assert_eq!(
            error_status(&SensorError::UnsupportedCommand {
                device: "turbo".into(),
                action: "reset-max".into()
            })
            .0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(error_status(&SensorError::Timeout).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_pressures_skip_pyrometer() {
        let entry = |id: &str, kind: SensorKind, value: f64| SensorSnapshot {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            value,
            unit: "mbar".to_string(),
            reading: Reading::Value(value),
        };
        let snapshot = Snapshot {
            taken_at: Utc::now(),
            readings: vec![
                entry("turbo", SensorKind::Gauge, 0.5),
                entry("pyro", SensorKind::Pyrometer, 23.4),
                entry("gas", SensorKind::Analog, 40.0),
            ],
        };

        let list = pressures(&snapshot);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], PressureEntry { pump: "turbo".into(), pressure: 0.5, units: "mbar".into() });
        assert_eq!(list[1].pump, "gas");
    }

    fn state() -> ApiServiceState {
        use crate::config::{AnalogConfig, DeviceConfig, PollingConfig};
        use crate::devices::{AnalogPressureReader, SerialGaugeReader};
        use crate::services::registry::SensorRegistry;
        use std::sync::Arc;

        let polling = PollingConfig::default();
        let turbo = DeviceConfig::gauge("turbo", "Turbo Pump", "/dev/null", 5, "UFIxDQ==", Some("BQ=="));
        let gauges = vec![SerialGaugeReader::with_transport(&turbo, &polling, None).unwrap()];
        let analog_config = AnalogConfig {
            controller_path: None,
            ..AnalogConfig::default()
        };
        let analog = AnalogPressureReader::with_adc(&analog_config, None);
        let registry = SensorRegistry::from_readers(gauges, analog, &polling);
        ApiServiceState {
            aggregator: Aggregator::new(Arc::new(registry)),
        }
    }

    #[actix_web::test]
    async fn test_post_api_routes() {
        use actix_web::test;

        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api")
            .set_json(serde_json::json!({"item": "getpressures"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body[0]["pump"], "turbo");
        assert_eq!(body[0]["pressure"], 0.0);
        assert_eq!(body[1]["pump"], "gas");
        assert_eq!(body[1]["pressure"], 1000.0);

        let req = test::TestRequest::post()
            .uri("/api")
            .set_json(serde_json::json!({"item": "laser", "command": "on"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api")
            .set_json(serde_json::json!({"item": "nonsense"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["entries"][0]["label"], "Port not available");
        assert_eq!(body["entries"][1]["label"], "Reader not connected");
    }
}
