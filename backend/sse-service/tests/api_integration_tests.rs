/// Integration tests for the sse-service HTTP API
///
/// This test module covers:
/// - Stream endpoint framing headers and frames
/// - Publishing to a device, a user, and everyone
/// - Status and client listing endpoints
/// - Client disconnect and shutdown handling

use actix_web::{dev::ServiceResponse, test, web, App};
use serde_json::{json, Value};
use sse_service::handlers::{register_notifications, register_stream};
use sse_service::{ClientIdentity, Publisher, SseConfig, Supervisor};

const OPEN_FRAME: &str = "event: open\ndata: The server is connected.\n\n";
const DISCONNECT_FRAME: &str = "event: disconnect\ndata: The server is shutting down.\n\n";

fn services(config: SseConfig) -> (Supervisor, Publisher) {
    sse_service::build(config)
}

fn quiet_config() -> SseConfig {
    SseConfig {
        ping_interval_ms: 0,
        ..Default::default()
    }
}

macro_rules! init_app {
    ($supervisor:expr, $publisher:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($supervisor.clone()))
                .app_data(web::Data::new($publisher.clone()))
                .configure(|cfg| {
                    register_stream(cfg, "/sse/connection");
                    register_notifications(cfg);
                }),
        )
        .await
    };
}

async fn wait_registered(supervisor: &Supervisor, identity: &ClientIdentity) {
    while !supervisor.registry().exists(identity).await {
        tokio::task::yield_now().await;
    }
}

async fn body_text(resp: ServiceResponse) -> String {
    let bytes = test::read_body(resp).await;
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[actix_rt::test]
async fn test_stream_sets_event_stream_headers() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);

    let req = test::TestRequest::get()
        .uri("/sse/connection?user_id=alice&device_id=phone")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
    assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
    assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");

    supervisor.shutdown();
    assert_eq!(body_text(resp).await, format!("{}{}", OPEN_FRAME, DISCONNECT_FRAME));
}

#[actix_rt::test]
async fn test_notify_device_reaches_stream() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);
    let identity = ClientIdentity::device("alice", "phone");

    let stream = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/sse/connection?user_id=alice&device_id=phone")
            .to_request(),
    )
    .await;
    wait_registered(&supervisor, &identity).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/sse/notify/alice?device_id=phone")
        .set_json(json!({
            "id": "1",
            "event": "new_message",
            "data": {"text": "hi"}
        }))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["delivered"], 1);

    supervisor.shutdown();
    assert_eq!(
        body_text(stream).await,
        format!(
            "{}id: 1\nevent: new_message\ndata: {{\"text\":\"hi\"}}\n\n{}",
            OPEN_FRAME, DISCONNECT_FRAME
        )
    );
}

#[actix_rt::test]
async fn test_notify_user_fans_out_to_devices() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);

    let mut streams = vec![];
    for device in ["phone", "laptop"] {
        let stream = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/sse/connection?user_id=alice&device_id={}", device))
                .to_request(),
        )
        .await;
        wait_registered(&supervisor, &ClientIdentity::device("alice", device)).await;
        streams.push(stream);
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/sse/notify/alice")
        .set_json(json!({"data": "hello"}))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["attempted"], 2);
    assert_eq!(resp["data"]["delivered"], 2);

    supervisor.shutdown();
    for stream in streams {
        assert_eq!(
            body_text(stream).await,
            format!("{}data: hello\n\n{}", OPEN_FRAME, DISCONNECT_FRAME)
        );
    }
}

#[actix_rt::test]
async fn test_notify_unknown_user_is_not_an_error() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);

    let req = test::TestRequest::post()
        .uri("/api/v1/sse/notify/nobody")
        .set_json(json!({"data": "hello"}))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["delivered"], 0);
    assert_eq!(resp["data"]["failed"], 0);
}

#[actix_rt::test]
async fn test_broadcast_and_listing() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);

    let mut streams = vec![];
    for user in ["alice", "bob", "carol"] {
        let stream = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/sse/connection?user_id={}", user))
                .to_request(),
        )
        .await;
        wait_registered(&supervisor, &ClientIdentity::user(user)).await;
        streams.push(stream);
    }

    let clients: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/sse/clients").to_request(),
    )
    .await;
    assert_eq!(clients["data"]["count"], 3);
    assert_eq!(clients["data"]["users"], 3);

    let status: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/sse/status/bob")
            .to_request(),
    )
    .await;
    assert_eq!(status["data"]["connected"], true);
    assert_eq!(status["data"]["connection_count"], 1);
    assert_eq!(status["data"]["devices"][0]["identity"]["user_id"], "bob");
    assert_eq!(status["data"]["devices"][0]["state"], "open");

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/sse/broadcast")
            .set_json(json!({"event": "announcement", "data": "maintenance"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp["data"]["delivered"], 3);

    supervisor.shutdown();
    for stream in streams {
        assert_eq!(
            body_text(stream).await,
            format!(
                "{}event: announcement\ndata: maintenance\n\n{}",
                OPEN_FRAME, DISCONNECT_FRAME
            )
        );
    }
}

#[actix_rt::test]
async fn test_client_disconnect_removes_connection() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);
    let identity = ClientIdentity::device("alice", "phone");

    let stream = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/sse/connection?user_id=alice&device_id=phone")
            .to_request(),
    )
    .await;
    wait_registered(&supervisor, &identity).await;

    drop(stream);

    while supervisor.registry().exists(&identity).await {
        tokio::task::yield_now().await;
    }
    assert!(supervisor.registry().is_empty().await);
}

#[actix_rt::test]
async fn test_connect_rejected_during_shutdown() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);
    supervisor.shutdown();

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/sse/connection?user_id=alice")
            .to_request(),
    )
    .await;

    assert_eq!(resp.status().as_u16(), 503);
}

#[actix_rt::test]
async fn test_invalid_publish_body_is_rejected() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/sse/broadcast")
            .set_json(json!({"event": "missing data"}))
            .to_request(),
    )
    .await;

    assert!(resp.status().is_client_error());
}

#[actix_rt::test]
async fn test_line_break_in_event_name_is_rejected() {
    let (supervisor, publisher) = services(quiet_config());
    let app = init_app!(supervisor, publisher);
    let identity = ClientIdentity::user("alice");

    let stream = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/sse/connection?user_id=alice")
            .to_request(),
    )
    .await;
    wait_registered(&supervisor, &identity).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/sse/broadcast")
            .set_json(json!({"event": "x\n\ndata: forged", "data": "y"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);

    supervisor.shutdown();
    assert_eq!(
        body_text(stream).await,
        format!("{}{}", OPEN_FRAME, DISCONNECT_FRAME)
    );
}
