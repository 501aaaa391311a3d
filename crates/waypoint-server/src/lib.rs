//! HTTP server wiring for Waypoint.
//!
//! Combines the JSON API from `waypoint-api` with optional Basic auth,
//! request tracing and the configuration/reference-data loading used by the
//! `waypoint` binary.

pub mod auth;

use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::Context as _;
use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use waypoint_core::{Engine, reference::ReferenceData, store::ProgressStore};

use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `WAYPOINT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// JSON or TOML file with reference data. Built-in defaults when absent.
  #[serde(default)]
  pub reference_path:     Option<PathBuf>,
  #[serde(default)]
  pub auth_username:      Option<String>,
  #[serde(default)]
  pub auth_password_hash: Option<String>,
}

impl ServerConfig {
  pub const DEFAULT_HOST: &'static str = "127.0.0.1";
  pub const DEFAULT_PORT: u16 = 8080;
  pub const DEFAULT_STORE_PATH: &'static str = "~/.local/share/waypoint/waypoint.db";

  /// Auth settings, if configured. Setting only one of the two fields is an
  /// error rather than silently running without auth.
  pub fn auth(&self) -> anyhow::Result<Option<AuthConfig>> {
    match (&self.auth_username, &self.auth_password_hash) {
      (Some(username), Some(password_hash)) => Ok(Some(AuthConfig {
        username:      username.clone(),
        password_hash: password_hash.clone(),
      })),
      (None, None) => Ok(None),
      _ => anyhow::bail!("auth_username and auth_password_hash must be set together"),
    }
  }
}

/// Load reference data from `path`, or the built-in defaults.
///
/// The format follows the file extension (`.json`, `.toml`, ...). The data
/// is not validated here; `Engine::new` does that.
pub fn load_reference(path: Option<&Path>) -> anyhow::Result<ReferenceData> {
  let Some(path) = path else {
    return Ok(ReferenceData::default());
  };

  config::Config::builder()
    .add_source(config::File::from(path))
    .build()
    .with_context(|| format!("failed to read reference data from {path:?}"))?
    .try_deserialize()
    .with_context(|| format!("malformed reference data in {path:?}"))
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application: `/health` plus the API under `/api`,
/// guarded by Basic auth when `auth` is set.
pub fn app<S>(engine: Arc<Engine<S>>, auth: Option<AuthConfig>) -> Router
where
  S: ProgressStore + 'static,
{
  let mut api = waypoint_api::api_router(engine);
  if let Some(auth) = auth {
    api = api.layer(middleware::from_fn_with_state(Arc::new(auth), auth::require_auth));
  }

  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use rand_core::OsRng;
  use tower::ServiceExt as _;
  use uuid::Uuid;
  use waypoint_store_sqlite::SqliteStore;

  use super::*;

  async fn make_app(password: Option<&str>) -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let engine = Engine::new(store, ReferenceData::default()).unwrap();
    let auth = password.map(|p| {
      let salt = SaltString::generate(&mut OsRng);
      AuthConfig {
        username:      "admin".to_string(),
        password_hash: Argon2::default()
          .hash_password(p.as_bytes(), &salt)
          .unwrap()
          .to_string(),
      }
    });
    app(Arc::new(engine), auth)
  }

  fn get_req(uri: &str, auth: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some((user, pass)) = auth {
      builder = builder.header(
        header::AUTHORIZATION,
        format!("Basic {}", B64.encode(format!("{user}:{pass}"))),
      );
    }
    builder.body(Body::empty()).unwrap()
  }

  #[tokio::test]
  async fn health_is_open() {
    let app = make_app(Some("secret")).await;
    let resp = app.oneshot(get_req("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_requires_credentials_when_configured() {
    let app = make_app(Some("secret")).await;
    let uri = format!("/api/users/{}/level", Uuid::new_v4());

    let resp = app.clone().oneshot(get_req(&uri, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
      .clone()
      .oneshot(get_req(&uri, Some(("admin", "wrong"))))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.oneshot(get_req(&uri, Some(("admin", "secret")))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_is_open_without_auth_config() {
    let app = make_app(None).await;
    let resp = app.oneshot(get_req("/api/reference", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["version"], ReferenceData::default().version().unwrap());
  }

  #[test]
  fn half_configured_auth_is_rejected() {
    let cfg = ServerConfig {
      host:               ServerConfig::DEFAULT_HOST.to_string(),
      port:               ServerConfig::DEFAULT_PORT,
      store_path:         PathBuf::from(":memory:"),
      reference_path:     None,
      auth_username:      Some("admin".to_string()),
      auth_password_hash: None,
    };
    assert!(cfg.auth().is_err());
  }

  #[test]
  fn reference_loads_from_json_file() {
    let path = std::env::temp_dir().join(format!("waypoint-ref-{}.json", Uuid::new_v4()));
    std::fs::write(
      &path,
      r#"{
        "rewards": { "lesson_completion": 40, "course_completion": 300 },
        "achievements": [],
        "skill_tree": [
          { "id": "intro" },
          { "id": "next", "prerequisites": ["intro"] }
        ]
      }"#,
    )
    .unwrap();

    let data = load_reference(Some(&path)).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(data.rewards.lesson_completion, 40);
    assert_eq!(data.skill_tree.len(), 2);
    assert_eq!(data.skill_tree[1].prerequisites, ["intro"]);
    assert_eq!(data.levels, ReferenceData::default().levels);
  }

  #[test]
  fn missing_reference_path_uses_defaults() {
    assert_eq!(load_reference(None).unwrap(), ReferenceData::default());
  }
}
