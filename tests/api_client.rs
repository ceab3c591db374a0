// Backend client against a wiremock server.

use hydrobox::api::{ApiConfig, ApiError, HydroApi};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, HydroApi) {
    let server = MockServer::start().await;
    let base_url = format!("{}/api/", server.uri());
    let api = HydroApi::from_reqwest(&base_url, reqwest::Client::new()).unwrap();
    (server, api)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_returns_user() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({"email": "ana@hydro.box", "password": "s3cret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc",
            "user": {"id": 4, "name": "Ana López", "email": "ana@hydro.box"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let user = api.login("ana@hydro.box", "s3cret").await.unwrap();
    assert_eq!(user.id, 4);
    assert_eq!(user.full_name(), "Ana López");
}

#[tokio::test]
async fn login_rejection_is_none() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;

    assert!(api.login("ana@hydro.box", "wrong").await.is_none());
}

#[tokio::test]
async fn login_with_unparseable_body_is_none() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    assert!(api.login("ana@hydro.box", "s3cret").await.is_none());
}

// ── Crops ───────────────────────────────────────────────────────────

#[tokio::test]
async fn current_crop_accepts_array_root() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/hortaliza/actual"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id_hortaliza": "3", "nombre": "Rúcula"}
        ])))
        .mount(&server)
        .await;

    let crop = api.current_crop().await.unwrap().unwrap();
    assert_eq!(crop.id, 3);
    assert_eq!(crop.name, "Rúcula");
}

#[tokio::test]
async fn current_crop_empty_body_is_none() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/hortaliza/actual"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert_eq!(api.current_crop().await.unwrap(), None);
}

#[tokio::test]
async fn current_crop_server_error_is_reported() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/hortaliza/actual"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = api.current_crop().await.unwrap_err();
    assert!(
        matches!(err, ApiError::Http { status: 500, ref body } if body == "boom"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn change_crop_posts_id() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/hortaliza/cambiar"))
        .and(body_json(json!({"id_hortaliza": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(api.change_crop(5).await);
}

#[tokio::test]
async fn change_crop_failure_is_false() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/hortaliza/cambiar"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    assert!(!api.change_crop(99).await);
}

// ── Measurements and sensors ────────────────────────────────────────

#[tokio::test]
async fn measurements_and_latest() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/registro-mediciones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ph_value": 6.1, "orp_value": 320, "fecha": "2025-03-01 08:00:00"},
            "garbage",
            {"ph_value": "6.4", "ce_value": 410, "us_value": 75, "fecha": "2025-03-01 09:00:00"}
        ])))
        .mount(&server)
        .await;

    let rows = api.measurements().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].orp, Some(320.0));

    let latest = api.latest_measurement().await.unwrap().unwrap();
    assert_eq!(latest.ph, Some(6.4));
    assert_eq!(latest.orp, Some(410.0));
    assert_eq!(latest.level, Some(75.0));
    assert_eq!(latest.recorded_at.as_deref(), Some("2025-03-01 09:00:00"));
}

#[tokio::test]
async fn invalid_json_is_an_error() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/registro-mediciones"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    assert!(matches!(api.measurements().await, Err(ApiError::Json(_))));
}

#[tokio::test]
async fn sensors_accept_single_object_root() {
    let (server, api) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/sensores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_sensor": 2,
            "nombre": "pH",
            "type": "ph",
            "unidad": "pH"
        })))
        .mount(&server)
        .await;

    let sensors = api.sensors().await.unwrap();
    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].id, 2);
    assert_eq!(sensors[0].name, "pH");
    assert_eq!(sensors[0].kind.as_deref(), Some("ph"));
    assert_eq!(sensors[0].unit.as_deref(), Some("pH"));
}

// ── Construction ────────────────────────────────────────────────────

#[test]
fn base_url_must_be_http() {
    assert!(matches!(
        HydroApi::from_reqwest("ftp://box", reqwest::Client::new()),
        Err(ApiError::InvalidUrl(_))
    ));

    let api = HydroApi::new(&ApiConfig::default()).unwrap();
    assert_eq!(api.base_url(), "https://hydrobox.pi.jademajesty.com/api");
}
