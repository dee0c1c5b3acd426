use std::time::Duration;

use kostal2mqtt::device_client::{AuthScheme, Credentials, DeviceClient, DeviceError};
use kostal2mqtt::field_catalog::ModuleRequests;
use kostal2mqtt::plenticore::PlenticoreClient;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> PlenticoreClient {
    PlenticoreClient::new(Duration::from_secs(2)).unwrap()
}

fn credentials(scheme: AuthScheme) -> Credentials {
    Credentials {
        username: "pvserver".to_string(),
        password: "secret".to_string(),
        scheme,
    }
}

fn requests(entries: &[(&str, &[&str])]) -> ModuleRequests {
    entries
        .iter()
        .map(|(module, ids)| {
            (
                module.to_string(),
                ids.iter().map(|id| id.to_string()).collect(),
            )
        })
        .collect()
}

async fn inverter(authenticated: bool, locked: bool) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/info/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "api_version": "0.2.0",
            "hostname": "scb",
            "name": "PUCK RESTful API",
            "sw_version": "01.26.09454"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authenticated": authenticated,
            "locked": locked,
            "anonymous": !authenticated,
            "role": "USER"
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn anonymous_connect() {
    let server = inverter(false, false).await;
    let session = client()
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    assert!(session.is_open());
    assert!(session.credentials().is_none());
    assert_eq!(session.base_url(), format!("{}/api/v1", server.uri()));
}

#[tokio::test]
async fn locked_account_is_reported_as_lockout() {
    let server = inverter(false, true).await;
    let result = client()
        .connect(&server.uri(), &credentials(AuthScheme::Basic))
        .await;
    assert!(matches!(result, Err(DeviceError::Lockout(_))));
}

#[tokio::test]
async fn rejected_credentials_are_reported_as_auth() {
    let server = inverter(false, false).await;
    let result = client()
        .connect(&server.uri(), &credentials(AuthScheme::Basic))
        .await;
    assert!(matches!(result, Err(DeviceError::Auth(_))));
}

#[tokio::test]
async fn unreachable_device_is_a_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let result = client()
        .connect(&uri, &credentials(AuthScheme::Anonymous))
        .await;
    assert!(matches!(result, Err(DeviceError::Transport(_))));
}

#[tokio::test]
async fn process_data_is_parsed() {
    let server = inverter(true, false).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/processdata/devices:local/Grid_P,P"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "moduleid": "devices:local",
            "processdata": [
                { "id": "Grid_P", "unit": "W", "value": -500.5 },
                { "id": "P", "unit": "W", "value": 3200 }
            ]
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Basic))
        .await
        .unwrap();
    let batch = client
        .fetch_points(&session, &requests(&[("devices:local", &["Grid_P", "P"])]))
        .await
        .unwrap();

    assert!(batch.failures.is_empty());
    assert_eq!(batch.points.len(), 2);
    assert_eq!(batch.points[0].module_id, "devices:local");
    assert_eq!(batch.points[0].identifier, "Grid_P");
    assert_eq!(batch.points[0].value, Some(-500.5));
    assert_eq!(batch.points[0].unit, "W");
    assert_eq!(batch.points[1].value, Some(3200.0));
}

#[tokio::test]
async fn unknown_ids_fall_back_to_the_complete_module() {
    let server = inverter(false, false).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/processdata/devices:local:ac/Frequency,Grid_F"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "message": "processdata not found" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/processdata/devices:local:ac"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "moduleid": "devices:local:ac",
            "processdata": [
                { "id": "Frequency", "unit": "Hz", "value": 50.01 },
                { "id": "L1_P", "unit": "W", "value": 1000 }
            ]
        }])))
        .mount(&server)
        .await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let batch = client
        .fetch_points(
            &session,
            &requests(&[("devices:local:ac", &["Frequency", "Grid_F"])]),
        )
        .await
        .unwrap();

    assert_eq!(batch.points.len(), 1);
    assert_eq!(batch.points[0].identifier, "Frequency");
    assert_eq!(batch.points[0].value, Some(50.01));
}

#[tokio::test]
async fn missing_module_does_not_fail_the_batch() {
    let server = inverter(false, false).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/processdata/devices:local/P"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "moduleid": "devices:local",
            "processdata": [{ "id": "P", "unit": "W", "value": 1200 }]
        }])))
        .mount(&server)
        .await;
    // devices:local:pv2 is absent on single string devices, both requests fail

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let batch = client
        .fetch_points(
            &session,
            &requests(&[("devices:local", &["P"]), ("devices:local:pv2", &["U"])]),
        )
        .await
        .unwrap();

    assert_eq!(batch.points.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert!(matches!(
        &batch.failures[0],
        DeviceError::PartialFetch { module, .. } if module == "devices:local:pv2"
    ));
}

#[tokio::test]
async fn failing_device_fails_the_fetch() {
    let server = inverter(false, false).await;
    // server errors are not retried with the complete module
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/processdata/.*"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let result = client
        .fetch_points(
            &session,
            &requests(&[("devices:local", &["P"]), ("devices:local:ac", &["P"])]),
        )
        .await;
    match result {
        Err(DeviceError::Transport(reason)) => assert!(reason.contains("503")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn batch_without_any_point_is_a_failure() {
    // no processdata routes at all, every module is unknown
    let server = inverter(false, false).await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let result = client
        .fetch_points(&session, &requests(&[("devices:local:pv2", &["U"])]))
        .await;
    assert!(matches!(
        result,
        Err(DeviceError::PartialFetch { module, .. }) if module == "devices:local:pv2"
    ));
}

#[tokio::test]
async fn rejected_session_fails_the_fetch() {
    let server = inverter(false, false).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/processdata/devices:local/P"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let result = client
        .fetch_points(&session, &requests(&[("devices:local", &["P"])]))
        .await;
    assert!(matches!(result, Err(DeviceError::Auth(_))));
}

#[tokio::test]
async fn device_info_combines_version_and_settings() {
    let server = inverter(false, false).await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/settings/devices:local/Properties:SerialNo,Branding:ProductName1,Branding:ProductName2,Properties:VersionMC",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "moduleid": "devices:local",
            "settings": [
                { "id": "Properties:SerialNo", "value": "90312ABC0042" },
                { "id": "Branding:ProductName1", "value": "PLENTICORE" },
                { "id": "Branding:ProductName2", "value": "plus 10" },
                { "id": "Properties:VersionMC", "value": "01.45" }
            ]
        }])))
        .mount(&server)
        .await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let info = client.device_info(&session).await.unwrap();

    assert_eq!(info.serial_number, "90312ABC0042");
    assert_eq!(info.model, "PLENTICORE plus 10");
    assert_eq!(info.version, "01.45");
    assert_eq!(info.api_version, "0.2.0");
    assert_eq!(info.hostname, "scb");
}

#[tokio::test]
async fn device_info_without_settings_uses_version_info() {
    let server = inverter(false, false).await;

    let client = client();
    let session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    let info = client.device_info(&session).await.unwrap();

    assert_eq!(info.serial_number, "");
    assert_eq!(info.model, "PUCK RESTful API");
    assert_eq!(info.version, "01.26.09454");
}

#[tokio::test]
async fn close_logs_out_once() {
    let server = inverter(true, false).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let mut session = client
        .connect(&server.uri(), &credentials(AuthScheme::Basic))
        .await
        .unwrap();
    client.close(&mut session).await;
    client.close(&mut session).await;
    assert!(!session.is_open());
}

#[tokio::test]
async fn anonymous_close_sends_nothing() {
    let server = inverter(false, false).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client();
    let mut session = client
        .connect(&server.uri(), &credentials(AuthScheme::Anonymous))
        .await
        .unwrap();
    client.close(&mut session).await;
    assert!(!session.is_open());
}
