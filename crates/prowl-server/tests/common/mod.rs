use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};

use prowl_server::build_app;
use prowl_server::config::{AuthFileConfig, CaptureConfig, DeadlineConfig, ServerConfig};
use prowl_server::state::AppState;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    client: reqwest::Client,
    token: Option<String>,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server that requires `token` on `/api/v1`.
    pub async fn with_auth(token: &str) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                bearer_token: Some(token.to_string()),
            },
            ..ServerConfig::default()
        };
        let mut server = Self::from_config(config).await;
        server.token = Some(token.to_string());
        server
    }

    /// Start a test server whose capture engine polls fast and holds briefly.
    pub async fn fast_capture() -> Self {
        let config = ServerConfig {
            capture: CaptureConfig {
                poll_interval_ms: 10,
                capture_distance_m: 2.5,
                hold_ms: 50,
            },
            deadline: DeadlineConfig {
                check_interval_ms: 20,
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            client: reqwest::Client::new(),
            token: None,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url())
    }

    fn request(&self, method: reqwest::Method, user: &str, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("x-user-id", user);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    pub async fn get(&self, user: &str, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, user, path)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, user: &str, path: &str, body: Value) -> reqwest::Response {
        self.request(reqwest::Method::POST, user, path)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn request_delete(&self, user: &str, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::DELETE, user, path)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, user: &str, path: &str, body: Value) -> reqwest::Response {
        self.request(reqwest::Method::PUT, user, path)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create a room owned by `owner` and add `members` through its join code.
    /// Returns the room id.
    pub async fn room_with(&self, owner: &str, members: &[&str]) -> String {
        let resp = self
            .post(owner, "/rooms", json!({ "name": "Park run" }))
            .await;
        assert_eq!(resp.status(), 201);
        let room: Value = resp.json().await.unwrap();
        let code = room["join_code"].as_str().unwrap().to_string();
        for m in members {
            let resp = self.post(m, "/rooms/join", json!({ "code": code })).await;
            assert_eq!(resp.status(), 200, "member {m} should join the room");
        }
        room["id"].as_str().unwrap().to_string()
    }

    /// Create a lobby arena in `room_id` hosted by `host`, returning its id.
    pub async fn arena_in(&self, room_id: &str, host: &str) -> String {
        let resp = self
            .post(
                host,
                "/arenas",
                json!({ "room_id": room_id, "mode": "predators", "duration_minutes": 12 }),
            )
            .await;
        assert_eq!(resp.status(), 201);
        let arena: Value = resp.json().await.unwrap();
        arena["id"].as_str().unwrap().to_string()
    }

    pub async fn join_as(&self, arena_id: &str, user: &str, role: &str) {
        let resp = self
            .post(user, &format!("/arenas/{arena_id}/join"), json!({ "role": role }))
            .await;
        assert_eq!(resp.status(), 200, "{user} should join as {role}");
    }

    pub async fn report(&self, arena_id: &str, user: &str, latitude: f64, longitude: f64) {
        let resp = self
            .post(
                user,
                &format!("/arenas/{arena_id}/location"),
                json!({ "latitude": latitude, "longitude": longitude }),
            )
            .await;
        assert_eq!(resp.status(), 200, "location for {user} should be accepted");
    }
}

/// Read the `error.code` field of an error response.
pub async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

/// Degrees of latitude spanning `meters` along a meridian.
pub fn meters_to_lat(meters: f64) -> f64 {
    (meters / prowl_core::geo::EARTH_RADIUS_M).to_degrees()
}
