use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use spectra_frame_server::cache::{FrameCache, FrameRenderer};
use spectra_frame_server::config::Configuration;
use spectra_frame_server::processing::pack::PACKED_FRAME_LEN;
use spectra_frame_server::processing::pipeline::content_hash;
use spectra_frame_server::rotation::RotationManager;
use spectra_frame_server::rotation_store::RotationStore;
use spectra_frame_server::schedule::ScheduleResolver;
use spectra_frame_server::web::{AppState, router};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

const MAC: &str = "AA:11:BB:22:CC:33";

/// Frame filled with the first byte of the source file.
struct FillRenderer;

impl FrameRenderer for FillRenderer {
    fn render(&self, source: &Path) -> anyhow::Result<Vec<u8>> {
        let data = fs::read(source)?;
        match data.first() {
            Some(&fill) => Ok(vec![fill; PACKED_FRAME_LEN]),
            None => anyhow::bail!("cannot identify image file"),
        }
    }
}

fn expected_hash(fill: u8) -> String {
    content_hash(&vec![fill; PACKED_FRAME_LEN])
}

fn app(tmp: &TempDir) -> (Router, Configuration) {
    let cfg = Configuration {
        image_dir: tmp.path().join("images"),
        state_dir: tmp.path().join("state"),
        ..Configuration::default()
    };
    let state = AppState::new(
        FrameCache::new(FillRenderer),
        RotationManager::open(&cfg.image_dir, RotationStore::new(cfg.rotation_state_path())),
        ScheduleResolver::from_config(&cfg),
    );
    (router(state), cfg)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Device-MAC", MAC)
        .body(Body::empty())
        .unwrap()
}

async fn hash_of(app: &Router) -> (StatusCode, String) {
    let resp = app.clone().oneshot(get("/hash")).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn fetch(app: &Router) -> (String, Vec<u8>) {
    let resp = app.clone().oneshot(get("/image_packed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=image.bin"
    );
    let hash = headers["x-image-hash"].to_str().unwrap().to_string();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (hash, body.to_vec())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hash_then_fetch_agree_and_rotation_wraps() {
    let tmp = tempdir().unwrap();
    let (app, cfg) = app(&tmp);
    let dir = cfg.image_dir.join("aa11bb22cc33");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.jpg"), b"a").unwrap();
    fs::write(dir.join("b.png"), b"b").unwrap();

    for expected in [b'a', b'b', b'a'] {
        let (status, announced) = hash_of(&app).await;
        assert_eq!(status, StatusCode::OK);
        // asking twice must not move the rotation
        assert_eq!(hash_of(&app).await.1, announced);

        let (fetched, body) = fetch(&app).await;
        assert_eq!(announced, fetched);
        assert_eq!(fetched, expected_hash(expected));
        assert_eq!(body.len(), PACKED_FRAME_LEN);
        assert!(body.iter().all(|&b| b == expected));
    }

    let state: serde_json::Value =
        serde_json::from_slice(&fs::read(cfg.rotation_state_path()).unwrap()).unwrap();
    assert_eq!(state["aa11bb22cc33"]["current_index"], 1);
    assert_eq!(state["aa11bb22cc33"]["last_returned"], "a.jpg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_directory_is_not_found() {
    let tmp = tempdir().unwrap();
    let (app, cfg) = app(&tmp);
    fs::create_dir_all(&cfg.image_dir).unwrap();

    let (status, body) = hash_of(&app).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No image");

    let resp = app.clone().oneshot(get("/image_packed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_image_is_a_server_error_and_does_not_advance() {
    let tmp = tempdir().unwrap();
    let (app, cfg) = app(&tmp);
    fs::create_dir_all(&cfg.image_dir).unwrap();
    fs::write(cfg.image_dir.join("a.jpg"), b"").unwrap();
    fs::write(cfg.image_dir.join("b.jpg"), b"b").unwrap();

    let resp = app.clone().oneshot(get("/image_packed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("Error: "), "{text}");
    assert_eq!(text, "Error: failed to process a.jpg: cannot identify image file");
    assert!(!text.contains(&*tmp.path().to_string_lossy()), "{text}");

    // still stuck on the broken file
    let (status, _) = hash_of(&app).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!cfg.rotation_state_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_config_reports_resolved_schedule() {
    let tmp = tempdir().unwrap();
    let (app, cfg) = app(&tmp);
    fs::create_dir_all(&cfg.state_dir).unwrap();
    fs::write(
        cfg.global_schedule_path(),
        r#"{"refresh_interval_minutes": 30, "active_start_hour": 99}"#,
    )
    .unwrap();

    let resp = app.clone().oneshot(get("/device_config")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["schedule_source"], "global");
    assert_eq!(json["schedule"]["refresh_interval_minutes"], 30);
    assert!(json["schedule"].get("active_start_hour").is_none());
    assert!(json["server_time"].as_i64().unwrap() > 1_600_000_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_lists_devices_with_battery() {
    let tmp = tempdir().unwrap();
    let (app, cfg) = app(&tmp);
    fs::create_dir_all(&cfg.image_dir).unwrap();
    fs::write(cfg.image_dir.join("a.jpg"), b"a").unwrap();
    fs::write(cfg.image_dir.join("b.jpg"), b"b").unwrap();

    let req = Request::builder()
        .uri("/image_packed")
        .header("X-Device-MAC", MAC)
        .header("X-Battery-Voltage", "3.95")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status?device=aa:11:bb:22:cc:33")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let devices = json["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    let dev = &devices[0];
    assert_eq!(dev["device"], "aa11bb22cc33");
    assert_eq!(dev["current_image"], "a.jpg");
    assert_eq!(dev["next_image"], "b.jpg");
    assert_eq!(dev["current_index"], 1);
    assert_eq!(dev["schedule_source"], "none");
    assert_eq!(dev["last_endpoint"], "/image_packed");
    assert!((dev["battery_voltage"].as_f64().unwrap() - 3.95).abs() < 1e-3);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["devices"].as_array().unwrap().len(), 1);
}
