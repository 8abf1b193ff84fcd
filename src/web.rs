//! HTTP surface polled by the panels.
//!
//! A device first asks `/hash` and only downloads `/image_packed` when the
//! hash differs from what it is showing. Both answer for the *peeked* image,
//! so the pair always agrees; the rotation advances only once a frame has
//! been produced for download.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::Utc;
use schedule_model::ScheduleConfig;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{FrameCache, PackedFrame, PipelineRenderer};
use crate::config::Configuration;
use crate::device::DeviceId;
use crate::error::Error;
use crate::rotation::RotationManager;
use crate::rotation_store::RotationStore;
use crate::schedule::ScheduleResolver;
use crate::telemetry::{BATTERY_HEADER, DeviceTelemetry, Telemetry, parse_voltage};

pub const IMAGE_HASH_HEADER: HeaderName = HeaderName::from_static("x-image-hash");

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<FrameCache>,
    pub rotation: Arc<RotationManager>,
    pub schedules: Arc<ScheduleResolver>,
    pub telemetry: Arc<Telemetry>,
}

impl AppState {
    pub fn new(cache: FrameCache, rotation: RotationManager, schedules: ScheduleResolver) -> Self {
        Self {
            cache: Arc::new(cache),
            rotation: Arc::new(rotation),
            schedules: Arc::new(schedules),
            telemetry: Arc::new(Telemetry::new()),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(
            FrameCache::new(PipelineRenderer::new(config.enhance)),
            RotationManager::open(
                &config.image_dir,
                RotationStore::new(config.rotation_state_path()),
            ),
            ScheduleResolver::from_config(config),
        )
    }

    fn touch(&self, device: &DeviceId, endpoint: &str, headers: &HeaderMap) {
        let voltage = headers
            .get(BATTERY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_voltage);
        self.telemetry.record(device, endpoint, voltage);
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hash", get(frame_hash))
        .route("/image_packed", get(image_packed))
        .route("/status", get(status))
        .route("/device_config", get(device_config))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind frame server on {addr}"))?;
    info!(%addr, "frame server listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .context("frame server exited")?;
    info!("frame server stopped");
    Ok(())
}

async fn frame_hash(
    State(state): State<AppState>,
    device: DeviceId,
    headers: HeaderMap,
) -> Response {
    state.touch(&device, "/hash", &headers);
    match next_frame(&state, device.clone(), false).await {
        Ok(frame) => {
            debug!(%device, hash = frame.hash(), "hash requested");
            frame.hash().to_owned().into_response()
        }
        Err(err) => error_response(&device, &err),
    }
}

async fn image_packed(
    State(state): State<AppState>,
    device: DeviceId,
    headers: HeaderMap,
) -> Response {
    state.touch(&device, "/image_packed", &headers);
    match next_frame(&state, device.clone(), true).await {
        Ok(frame) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (header::CONTENT_DISPOSITION, "attachment; filename=image.bin"),
            ],
            [(IMAGE_HASH_HEADER, frame.hash().to_owned())],
            frame.bytes().to_vec(),
        )
            .into_response(),
        Err(err) => error_response(&device, &err),
    }
}

/// Peek the device's next image and produce its frame off the async
/// runtime. With `commit`, the rotation advances once the frame exists.
async fn next_frame(
    state: &AppState,
    device: DeviceId,
    commit: bool,
) -> Result<PackedFrame, Error> {
    let rotation = Arc::clone(&state.rotation);
    let cache = Arc::clone(&state.cache);
    let task = tokio::task::spawn_blocking(move || -> Result<PackedFrame, Error> {
        let path = rotation
            .peek_next(&device)
            .ok_or_else(|| Error::Unavailable(format!("no images for device {device}")))?;
        let frame = cache.get_frame(&path)?;
        if commit {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                rotation.commit_served(&device, name);
            }
        }
        Ok(frame)
    });
    match task.await {
        Ok(result) => result,
        Err(join) => Err(Error::Processing {
            path: state.rotation.base_dir().to_path_buf(),
            source: anyhow::anyhow!("frame task failed: {join}"),
        }),
    }
}

fn error_response(device: &DeviceId, err: &Error) -> Response {
    if err.is_unavailable() {
        debug!(%device, "{err}");
        (StatusCode::NOT_FOUND, "No image").into_response()
    } else {
        error!(%device, error = %err, "frame request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", err.client_message()),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct DeviceConfigResponse {
    server_time: i64,
    schedule: ScheduleConfig,
    schedule_source: String,
}

async fn device_config(
    State(state): State<AppState>,
    device: DeviceId,
    headers: HeaderMap,
) -> Response {
    state.touch(&device, "/device_config", &headers);
    let schedules = Arc::clone(&state.schedules);
    let lookup = device.clone();
    match tokio::task::spawn_blocking(move || schedules.resolve(&lookup)).await {
        Ok(resolution) => Json(DeviceConfigResponse {
            server_time: Utc::now().timestamp(),
            schedule: resolution.config,
            schedule_source: resolution.source,
        })
        .into_response(),
        Err(err) => {
            error!(%device, error = %err, "schedule lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {err}")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    device: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    server_time: i64,
    devices: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
struct DeviceStatus {
    device: String,
    current_index: usize,
    current_image: Option<String>,
    next_image: Option<String>,
    schedule: ScheduleConfig,
    schedule_source: String,
    active_now: bool,
    #[serde(flatten)]
    telemetry: Option<DeviceTelemetry>,
}

async fn status(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    let task = tokio::task::spawn_blocking(move || build_status(&state, query.device.as_deref()));
    match task.await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!(error = %err, "status report failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {err}")).into_response()
        }
    }
}

fn build_status(state: &AppState, only: Option<&str>) -> StatusReport {
    let rotations = state.rotation.snapshot();
    let telemetry = state.telemetry.snapshot();

    let devices: Vec<DeviceId> = match only {
        Some(raw) => vec![DeviceId::normalize(raw)],
        None => {
            let mut known: Vec<DeviceId> = rotations
                .iter()
                .map(|r| r.device.as_str())
                .chain(telemetry.keys().map(String::as_str))
                .map(DeviceId::normalize)
                .collect();
            known.sort();
            known.dedup();
            known
        }
    };

    let now = Utc::now();
    let devices = devices
        .into_iter()
        .map(|device| {
            let resolution = state.schedules.resolve(&device);
            let file_name = |path: std::path::PathBuf| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            };
            DeviceStatus {
                current_index: rotations
                    .iter()
                    .find(|r| r.device == device.as_str())
                    .map_or(0, |r| r.current_index),
                current_image: state.rotation.current_image(&device).and_then(file_name),
                next_image: state.rotation.peek_next(&device).and_then(file_name),
                active_now: resolution.config.effective().is_active_at(now),
                schedule: resolution.config,
                schedule_source: resolution.source,
                telemetry: telemetry.get(device.as_str()).cloned(),
                device: device.to_string(),
            }
        })
        .collect();

    StatusReport {
        server_time: now.timestamp(),
        devices,
    }
}
