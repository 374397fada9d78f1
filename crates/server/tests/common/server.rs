//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use photosync_core::config::AppConfig;
use photosync_metadata::models::{DeviceRow, TokenRow, UserRow};
use photosync_metadata::{MetadataStore, SqliteStore};
use photosync_server::auth::hash_token;
use photosync_server::bootstrap::ensure_admin;
use photosync_server::{AppState, create_router};
use photosync_storage::{BlobStore, FilesystemBackend};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// Raw admin token matching `AdminConfig::for_testing`.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A regular account created for a test.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TestUser {
    pub user_id: Uuid,
    pub token: String,
}

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub admin_id: Uuid,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |storage, _| storage).await
    }

    /// Create a test server whose blob store is wrapped by `layer`.
    ///
    /// The layer also receives the metadata store, so a wrapper can observe
    /// catalog state at the moment of each storage call.
    pub async fn with_storage_layer<L>(layer: L) -> Self
    where
        L: FnOnce(Arc<dyn BlobStore>, Arc<dyn MetadataStore>) -> Arc<dyn BlobStore>,
    {
        Self::build(|_| {}, layer).await
    }

    async fn build<F, L>(modifier: F, layer: L) -> Self
    where
        F: FnOnce(&mut AppConfig),
        L: FnOnce(Arc<dyn BlobStore>, Arc<dyn MetadataStore>) -> Arc<dyn BlobStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("photos");
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("catalog.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage.path = storage_path;
        config.metadata.path = db_path;
        // Tests drive sweeps explicitly
        config.scanner.auto_sweep_enabled = false;
        modifier(&mut config);

        let admin_id = ensure_admin(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin");

        let storage = layer(storage, metadata.clone());
        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            admin_id,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying blob store.
    pub fn storage(&self) -> Arc<dyn BlobStore> {
        self.state.storage.clone()
    }

    /// Insert a user and an API token directly, returning the raw token.
    pub async fn create_user(&self, username: &str) -> TestUser {
        let now = OffsetDateTime::now_utc();
        let user = UserRow {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            is_admin: false,
            created_at: now,
        };
        self.metadata()
            .create_user(&user)
            .await
            .expect("Failed to create user");

        let raw_token = format!("test-token-{}", Uuid::new_v4());
        let token = TokenRow {
            token_id: Uuid::new_v4(),
            user_id: user.user_id,
            token_hash: hash_token(&raw_token),
            created_at: now,
            last_used_at: None,
            revoked_at: None,
            description: Some("Test Token".to_string()),
        };
        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");

        TestUser {
            user_id: user.user_id,
            token: raw_token,
        }
    }

    /// Insert a device for `user_id`.
    pub async fn create_device(&self, user_id: Uuid, name: &str) -> Uuid {
        let device = DeviceRow {
            device_id: Uuid::new_v4(),
            user_id,
            device_name: name.to_string(),
            platform: Some("ios".to_string()),
            created_at: OffsetDateTime::now_utc(),
            last_seen_at: None,
        };
        self.metadata()
            .create_device(&device)
            .await
            .expect("Failed to create device");
        device.device_id
    }

    /// Upload bytes through the API and return the response body.
    pub async fn upload(&self, token: &str, query: &str, data: Bytes) -> (StatusCode, Value) {
        let uri = if query.is_empty() {
            "/photos".to_string()
        } else {
            format!("/photos?{query}")
        };
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/octet-stream")
            .body(Body::from(data))
            .unwrap();
        let (status, body) = raw_request(&self.router, request).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

/// Send a request and collect the raw response body.
#[allow(dead_code)]
pub async fn raw_request(router: &axum::Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let (status, body_bytes) = raw_request(router, builder.body(body).unwrap()).await;

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
