use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use deaddrop_lookup::{Authority, DualRead, Fallback, RemoteResolver};
use deaddrop_shared::constants::MAX_MESSAGE_SIZE;
use deaddrop_shared::envelope::{Message, Signed, SignedWithProof};
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, Resolver};
use deaddrop_shared::protocol::{AddressResponse, HealthResponse, NameResponse};
use deaddrop_store::{KeyRegistry, MessageStore, StoreError};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ServerConfig, UpstreamMode};
use crate::error::ServerError;
use crate::registrar::Registrar;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub registrar: Arc<Registrar>,
    /// Local registry. Lookup endpoints answer from here only, so two relays
    /// that name each other as upstream cannot forward a query in a loop.
    pub registry: Arc<KeyRegistry>,
}

impl AppState {
    pub fn new(
        registry: Arc<KeyRegistry>,
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn Resolver>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            relay: Arc::new(Relay::new(store, resolver, config.proof_policy())),
            registrar: Arc::new(Registrar::new(registry.clone(), config.pow_difficulty)),
            registry,
        }
    }

    /// Open the registry and mailbox store named by `config` and assemble the
    /// resolution chain around them.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(KeyRegistry::open(&config.registry_db_path)?);
        let store = deaddrop_store::mailbox::open(
            config.store_backend,
            &config.store_path,
            config.message_max_age,
        )?;
        let resolver = build_resolver(registry.clone(), config)?;
        Ok(Self::new(registry, store, resolver, config))
    }
}

fn build_resolver(
    local: Arc<KeyRegistry>,
    config: &ServerConfig,
) -> anyhow::Result<Arc<dyn Resolver>> {
    let local: Arc<dyn Resolver> = local;
    let Some(url) = &config.upstream_lookup_url else {
        return Ok(local);
    };

    let upstream: Arc<dyn Resolver> = Arc::new(RemoteResolver::new(url)?);
    info!(upstream = %url, mode = ?config.upstream_mode, "Upstream registry configured");

    let resolver: Arc<dyn Resolver> = match config.upstream_mode {
        UpstreamMode::Fallback => Arc::new(Fallback::new(local, upstream)),
        UpstreamMode::DualRead => {
            Arc::new(DualRead::new(local, upstream).with_authority(Authority::Legacy))
        }
    };
    Ok(resolver)
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/keys", post(register_key))
        .route("/keys/relationships", post(register_key_relationship))
        .route("/keys/disable", post(disable_key))
        .route("/keys/{key_hex}", get(lookup_key))
        .route("/names", post(register_name))
        .route("/names/{name}", get(lookup_name))
        .route("/names/{name}/addresses/{protocol}", get(lookup_address))
        .route("/addresses", post(register_address))
        .route("/messages", post(send_message))
        .route("/messages/receive", post(receive_message))
        // Message content travels hex-encoded inside JSON.
        .layer(DefaultBodyLimit::max(2 * MAX_MESSAGE_SIZE + 64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    /// Canonical content hash, hex.
    pub hash: String,
    pub receiver_key: PublicKey,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn on_registry<T, F>(state: &AppState, f: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&KeyRegistry) -> Result<T, StoreError> + Send + 'static,
{
    let registry = state.registry.clone();
    Ok(tokio::task::spawn_blocking(move || f(&registry)).await??)
}

// ─── Lookups ───

async fn lookup_key(
    State(state): State<AppState>,
    Path(key_hex): Path<String>,
) -> Result<Json<KeyInfo>, ServerError> {
    let key = PublicKey::from_hex(&key_hex)?;
    let info = on_registry(&state, move |r| r.key_info(&key)).await?;
    Ok(Json(info))
}

async fn lookup_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<NameResponse>, ServerError> {
    let name = name.to_ascii_lowercase();
    let lookup = name.clone();
    let key = on_registry(&state, move |r| r.name_key(&lookup)).await?;
    Ok(Json(NameResponse { name, key }))
}

async fn lookup_address(
    State(state): State<AppState>,
    Path((name, protocol)): Path<(String, String)>,
) -> Result<Json<AddressResponse>, ServerError> {
    let name = name.to_ascii_lowercase();
    let protocol = protocol.to_ascii_lowercase();
    let (n, p) = (name.clone(), protocol.clone());
    let address = on_registry(&state, move |r| r.address(&n, &p)).await?;
    Ok(Json(AddressResponse {
        name,
        protocol,
        address,
    }))
}

// ─── Registry mutations ───

async fn register_key(
    State(state): State<AppState>,
    Json(req): Json<SignedWithProof>,
) -> Result<(StatusCode, Json<KeyInfo>), ServerError> {
    let key = req.key.clone();
    let info = state.registrar.register_key(req).await?;
    info!(key = %key.address().short(), "Key registered");
    Ok((StatusCode::CREATED, Json(info)))
}

async fn register_key_relationship(
    State(state): State<AppState>,
    Json(req): Json<SignedWithProof>,
) -> Result<StatusCode, ServerError> {
    state.registrar.register_key_relationship(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disable_key(
    State(state): State<AppState>,
    Json(req): Json<SignedWithProof>,
) -> Result<Json<KeyInfo>, ServerError> {
    let info = state.registrar.disable_key(req).await?;
    Ok(Json(info))
}

async fn register_name(
    State(state): State<AppState>,
    Json(req): Json<SignedWithProof>,
) -> Result<StatusCode, ServerError> {
    state.registrar.register_name(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_address(
    State(state): State<AppState>,
    Json(req): Json<SignedWithProof>,
) -> Result<StatusCode, ServerError> {
    state.registrar.register_address(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Relay ───

async fn send_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<(StatusCode, Json<SendResponse>), ServerError> {
    let hash = message.content_hash_hex();
    let receiver_key = state.relay.send(message).await?;
    Ok((StatusCode::CREATED, Json(SendResponse { hash, receiver_key })))
}

async fn receive_message(
    State(state): State<AppState>,
    Json(proof): Json<Signed>,
) -> Result<Json<Message>, ServerError> {
    let message = state.relay.receive(&proof).await?;
    Ok(Json(message))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP API server");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deaddrop_shared::auth::identity_proof;
    use deaddrop_shared::envelope::{create_message, decrypt_message};
    use deaddrop_shared::identity::{Curve, KeyPair};
    use deaddrop_shared::protocol::{
        disable_key_request, register_address_request, register_key_request,
        register_name_request, register_parent_request,
    };
    use deaddrop_store::StoreBackend;
    use serde_json::Value;

    const DIFFICULTY: u32 = 10;

    struct TestServer {
        base: String,
        http: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn start(upstream: Option<(&str, UpstreamMode)>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                store_backend: StoreBackend::Sqlite,
                store_path: dir.path().join("mailbox.db"),
                registry_db_path: dir.path().join("registry.db"),
                pow_difficulty: DIFFICULTY,
                upstream_lookup_url: upstream.map(|(url, _)| url.to_string()),
                upstream_mode: upstream.map(|(_, mode)| mode).unwrap_or_default(),
                ..ServerConfig::default()
            };
            let state = AppState::from_config(&config).unwrap();

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            tokio::spawn(serve_on(state, listener));

            Self {
                base,
                http: reqwest::Client::new(),
                _dir: dir,
            }
        }

        async fn post<T: Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
            self.http
                .post(format!("{}{}", self.base, path))
                .json(body)
                .send()
                .await
                .unwrap()
        }

        async fn get(&self, path: &str) -> reqwest::Response {
            self.http
                .get(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap()
        }

        async fn register(&self, key: &KeyPair) {
            let resp = self
                .post("/keys", &register_key_request(key, DIFFICULTY).unwrap())
                .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        /// Register `key`, a fresh parent for it, and bind `name` through the parent.
        async fn enroll(&self, key: &KeyPair, name: &str) -> KeyPair {
            let parent = KeyPair::generate(key.curve());
            self.register(key).await;
            self.register(&parent).await;
            let resp = self
                .post(
                    "/keys/relationships",
                    &register_parent_request(key, parent.public_key(), DIFFICULTY).unwrap(),
                )
                .await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
            let resp = self
                .post(
                    "/names",
                    &register_name_request(&parent, key.public_key(), name, DIFFICULTY).unwrap(),
                )
                .await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
            parent
        }

        fn remote(&self) -> RemoteResolver {
            RemoteResolver::new(&self.base).unwrap()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start(None).await;
        let resp = server.get("/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: HealthResponse = resp.json().await.unwrap();
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_alice_to_bob_over_http() {
        let server = TestServer::start(None).await;
        let alice = KeyPair::generate(Curve::P256);
        let bob = KeyPair::generate(Curve::P256);
        server.enroll(&alice, "alice").await;
        server.enroll(&bob, "bob").await;

        let resolver = server.remote();
        let bob_key = resolver.lookup_name("bob").await.unwrap();
        assert_eq!(&bob_key, bob.public_key());

        let msg = create_message(&alice, b"meet at dawn", "alice", "bob", &bob_key).unwrap();
        let resp = server.post("/messages", &msg).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let sent: SendResponse = resp.json().await.unwrap();
        assert_eq!(sent.hash, msg.content_hash_hex());
        assert_eq!(&sent.receiver_key, bob.public_key());

        let proof = identity_proof(&bob, Utc::now()).unwrap();
        let resp = server.post("/messages/receive", &proof).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let received: Message = resp.json().await.unwrap();
        assert_eq!(received, msg);

        let plaintext = decrypt_message(&resolver, &bob, &received).await.unwrap();
        assert_eq!(plaintext, b"meet at dawn");

        let resp = server.post("/messages/receive", &proof).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_lookup_endpoints() {
        let server = TestServer::start(None).await;
        let carol = KeyPair::generate(Curve::Secp256k1);
        let parent = server.enroll(&carol, "Carol").await;

        let resp = server
            .post(
                "/addresses",
                &register_address_request(
                    &carol,
                    carol.public_key(),
                    "carol",
                    "https",
                    "https://carol.example",
                    DIFFICULTY,
                )
                .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = server.get("/names/CAROL").await;
        let body: NameResponse = resp.json().await.unwrap();
        assert_eq!(body.name, "carol");
        assert_eq!(&body.key, carol.public_key());

        let resp = server.get("/names/carol/addresses/https").await;
        let body: AddressResponse = resp.json().await.unwrap();
        assert_eq!(body.address, "https://carol.example");

        let resp = server
            .get(&format!("/keys/{}", carol.public_key().to_hex()))
            .await;
        let info: KeyInfo = resp.json().await.unwrap();
        assert_eq!(info.parent_keys, vec![parent.public_key().clone()]);

        assert_eq!(server.get("/names/nobody").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(server.get("/keys/zz").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mutation_errors_map_to_statuses() {
        let server = TestServer::start(None).await;
        let key = KeyPair::generate(Curve::P256);
        let req = register_key_request(&key, DIFFICULTY).unwrap();

        assert_eq!(server.post("/keys", &req).await.status(), StatusCode::CREATED);
        assert_eq!(server.post("/keys", &req).await.status(), StatusCode::CONFLICT);

        let mut tampered = req.clone();
        tampered.content[1] ^= 0x01;
        assert_eq!(
            server.post("/keys", &tampered).await.status(),
            StatusCode::UNAUTHORIZED
        );

        // Self-naming is reserved for parents.
        let resp = server
            .post(
                "/names",
                &register_name_request(&key, key.public_key(), "me", DIFFICULTY).unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_disabled_receiver_stops_resolving() {
        let server = TestServer::start(None).await;
        let alice = KeyPair::generate(Curve::P256);
        let bob = KeyPair::generate(Curve::P256);
        server.enroll(&alice, "alice").await;
        let bob_parent = server.enroll(&bob, "bob").await;

        let resp = server
            .post(
                "/keys/disable",
                &disable_key_request(&bob_parent, bob.public_key(), DIFFICULTY).unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let info: KeyInfo = resp.json().await.unwrap();
        assert!(info.disabled);

        assert_eq!(server.get("/names/bob").await.status(), StatusCode::NOT_FOUND);
        let msg = create_message(&alice, b"hi", "alice", "bob", bob.public_key()).unwrap();
        assert_eq!(
            server.post("/messages", &msg).await.status(),
            StatusCode::NOT_FOUND
        );

        let proof = identity_proof(&bob, Utc::now()).unwrap();
        assert_eq!(
            server.post("/messages/receive", &proof).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_upstream_fallback_resolves_remote_identities() {
        let home = TestServer::start(None).await;
        let edge = TestServer::start(Some((home.base.as_str(), UpstreamMode::Fallback))).await;

        let alice = KeyPair::generate(Curve::P256);
        let bob = KeyPair::generate(Curve::P256);
        home.enroll(&alice, "alice").await;
        home.enroll(&bob, "bob").await;

        // The edge relay knows neither party locally.
        assert_eq!(edge.get("/names/bob").await.status(), StatusCode::NOT_FOUND);

        let msg = create_message(&alice, b"via edge", "alice", "bob", bob.public_key()).unwrap();
        assert_eq!(edge.post("/messages", &msg).await.status(), StatusCode::CREATED);

        let proof = identity_proof(&bob, Utc::now()).unwrap();
        let resp = edge.post("/messages/receive", &proof).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let received: Message = resp.json().await.unwrap();
        let plaintext = decrypt_message(&home.remote(), &bob, &received)
            .await
            .unwrap();
        assert_eq!(plaintext, b"via edge");
    }

    #[tokio::test]
    async fn test_dual_read_upstream_answers_when_local_misses() {
        let home = TestServer::start(None).await;
        let edge = TestServer::start(Some((home.base.as_str(), UpstreamMode::DualRead))).await;

        let alice = KeyPair::generate(Curve::P256);
        let bob = KeyPair::generate(Curve::P256);
        home.enroll(&bob, "bob").await;

        let msg = create_message(&alice, b"dual", "alice", "bob", bob.public_key()).unwrap();
        let resp = edge.post("/messages", &msg).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let sent: SendResponse = resp.json().await.unwrap();
        assert_eq!(&sent.receiver_key, bob.public_key());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_service_unavailable() {
        let edge = TestServer::start(Some(("http://127.0.0.1:9", UpstreamMode::Fallback))).await;
        let alice = KeyPair::generate(Curve::P256);
        let ghost = KeyPair::generate(Curve::P256);
        let msg = create_message(&alice, b"hi", "alice", "ghost", ghost.public_key()).unwrap();
        assert_eq!(
            edge.post("/messages", &msg).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
