//! Typed request facade: bodies, envelopes and normalized failures.

use hrms_api::client::{ApiResponse, ErrorKind, FormData, FormValue, Page};
use hrms_api::{ApiClient, NormalizedError, RequestMethod, RequestOptions};
use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{config, envelope};

#[derive(Debug, Deserialize)]
struct Employee {
    id: i64,
    full_name: String,
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(config(server)).unwrap()
}

#[tokio::test]
async fn test_paged_envelope_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/employees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "items": [
                { "id": 1, "full_name": "Tran Lan" },
                { "id": 2, "full_name": "Le Minh" }
            ],
            "pagination": { "page": 1, "limit": 2, "total": 5, "total_pages": 3 }
        }))))
        .mount(&server)
        .await;

    let page: ApiResponse<Page<Employee>> = client(&server)
        .get("/employees", RequestOptions::new().query("limit", 2))
        .await
        .unwrap();
    assert!(page.is_success);
    assert_eq!(page.data.items.len(), 2);
    assert_eq!(page.data.items[1].full_name, "Le Minh");
    assert_eq!(page.data.items[0].id, 1);
    assert!(page.data.pagination.has_next());
}

#[tokio::test]
async fn test_form_data_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/employees"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .respond_with(ResponseTemplate::new(201).set_body_json(envelope(json!({ "id": 9 }))))
        .expect(1)
        .mount(&server)
        .await;

    let _: Value = client(&server)
        .post(
            "/employees",
            &json!({
                "full_name": "Pham Hoa",
                "skills": ["payroll", "audit"],
                "manager_id": null,
                "active": true
            }),
            RequestOptions::new().form_data(),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert_eq!(body.matches("name=\"skills[]\"").count(), 2);
    assert!(body.contains("name=\"full_name\""));
    assert!(body.contains("true"));
    assert!(!body.contains("manager_id"));
}

#[tokio::test]
async fn test_multipart_upload_with_file() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/employees/3/avatar"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "ok": true }))))
        .expect(1)
        .mount(&server)
        .await;

    let form = FormData::new()
        .with("caption", "badge photo")
        .with(
            "avatar",
            FormValue::file("me.png", Some("image/png"), vec![0x89, b'P', b'N', b'G']),
        );
    let _: Value = client(&server)
        .request_multipart(
            RequestMethod::Put,
            "/employees/:id/avatar",
            form,
            RequestOptions::new().path_param("id", 3),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(body.contains("filename=\"me.png\""));
    assert!(body.contains("badge photo"));
}

#[tokio::test]
async fn test_failure_shapes_normalize() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/structured"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "is_success": false,
            "error": { "code": "NOT_FOUND", "message": "Employee not found" },
            "message": "ignored"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/text"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": "Start date is after end date"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/gateway"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let client = client(&server);
    let message = |err: hrms_api::client::Error| err.normalized().message;

    let err = client.get::<Value>("/structured", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Backend { status: 404, .. }));
    assert_eq!(message(err), "Employee not found");

    let err = client.get::<Value>("/text", RequestOptions::new()).await.unwrap_err();
    assert_eq!(message(err), "Start date is after end date");

    let err = client.get::<Value>("/gateway", RequestOptions::new()).await.unwrap_err();
    assert_eq!(message(err), "Something went wrong");
}

#[tokio::test]
async fn test_unreachable_backend_normalizes_to_connectivity() {
    let config = hrms_api::ClientConfig::builder()
        .with_api_url("http://127.0.0.1:1/api/v1")
        .build();
    let client = ApiClient::new(config).unwrap();

    let err = client
        .get::<Value>("/employees", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Connectivity { .. }));

    let normalized: NormalizedError = err.normalized();
    assert_eq!(
        serde_json::to_value(&normalized).unwrap(),
        json!({
            "message": "Connection error. Please check your network.",
            "data": null,
            "is_success": false
        })
    );
}
