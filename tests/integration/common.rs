use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hrms_api::auth::{ApiClient, FileStore, KeyValueStore, ManualNavigator, SessionConfig};
use hrms_api::client::RetryConfig;
use hrms_api::ClientConfig;
use serde_json::{json, Value};
use wiremock::MockServer;

/// Success envelope around `data`.
pub fn envelope(data: Value) -> Value {
    json!({ "data": data, "is_success": true, "message": "OK" })
}

/// Client config pointed at the mock backend with short timeouts.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .with_api_url(format!("{}/api/v1", server.uri()))
        .with_timeout(Duration::from_millis(300))
        .with_retry(RetryConfig::default().with_base_delay(Duration::from_millis(10)))
        .build()
}

/// A client whose session lives in the jar at `jar`, as a separate process
/// would see it.
pub fn process(
    server: &MockServer,
    jar: &Path,
    navigator: Arc<ManualNavigator>,
) -> ApiClient {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::with_path(jar));
    ApiClient::builder(config(server))
        .with_session(SessionConfig::default())
        .with_store(store)
        .with_navigator(navigator)
        .build()
        .expect("client should build")
}
