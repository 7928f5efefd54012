use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{join_remote, Config};
use crate::error::{AppError, AppResult, StoreResult};
use crate::infrastructure::{list_dir, with_store, RemoteStore, RetryPolicy, StoreConnector};
use crate::models::analysis::ANALYSIS_SUFFIX;

pub const SERVICE_NAME: &str = "BORA Analysis API";

#[derive(Clone)]
pub struct ApiState {
    pub connector: Arc<dyn StoreConnector>,
    pub policy: RetryPolicy,
    pub raw_path: String,
    pub analyzed_path: String,
    pub default_limit: usize,
}

impl ApiState {
    pub fn new(config: &Config, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            policy: config.retry_policy(),
            raw_path: config.raw_path(),
            analyzed_path: config.analyzed_path(),
            default_limit: config.api_default_limit,
        }
    }

    /// 在阻塞线程上打开一次性会话
    async fn with_store<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RemoteStore) -> StoreResult<T> + Send + 'static,
    {
        let connector = self.connector.clone();
        let policy = self.policy.clone();
        let result =
            tokio::task::spawn_blocking(move || with_store(connector.as_ref(), &policy, "", op))
                .await?;
        Ok(result?)
    }
}

/// 处理器错误统一返回 500 `{error}`
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("⚠️ API 请求失败: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/stats", get(stats))
        .route("/api/medidas", get(medidas))
        .route("/api/patrones", post(patrones))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: ApiState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    info!("🚀 {} 监听于 http://{}", SERVICE_NAME, addr);
    axum::serve(listener, router(state))
        .await
        .context("服务器异常退出")?;
    Ok(())
}

pub async fn home() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "endpoints_disponibles": ["/api/stats", "/api/medidas", "/api/patrones"],
    }))
}

pub async fn stats(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let raw_dir = state.raw_path.clone();
    let analyzed_dir = state.analyzed_path.clone();
    let (raw, analyzed) = state
        .with_store(move |store| {
            let raw = list_dir(store, &raw_dir, ".json")?.len();
            let analyzed = list_dir(store, &analyzed_dir, ANALYSIS_SUFFIX)?.len();
            Ok((raw, analyzed))
        })
        .await?;

    Ok(Json(json!({
        "total_medidas_raw": raw,
        "total_medidas_analizadas": analyzed,
        "medidas_pendientes_analisis": raw.saturating_sub(analyzed),
    })))
}

#[derive(Debug, Deserialize)]
pub struct MedidasQuery {
    pub limit: Option<usize>,
}

pub async fn medidas(
    State(state): State<ApiState>,
    Query(query): Query<MedidasQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(state.default_limit);
    let dir = state.analyzed_path.clone();
    let medidas = state
        .with_store(move |store| {
            let mut names = list_dir(store, &dir, ANALYSIS_SUFFIX)?;
            names.sort_unstable_by(|a, b| b.cmp(a));
            names.truncate(limit);

            let mut medidas = Vec::with_capacity(names.len());
            for name in names {
                let parsed = store
                    .retrieve(&join_remote(&dir, &name))
                    .map_err(|e| e.to_string())
                    .and_then(|data| {
                        serde_json::from_slice::<Value>(&data).map_err(|e| e.to_string())
                    });
                match parsed {
                    Ok(value) => medidas.push(value),
                    Err(e) => warn!("⚠️ 跳过无法读取的分析文件 {}: {}", name, e),
                }
            }
            Ok(medidas)
        })
        .await?;

    Ok(Json(json!({
        "total_encontrado": medidas.len(),
        "medidas": medidas,
    })))
}

pub async fn patrones() -> Json<Value> {
    Json(json!({
        "status": "endpoint_en_desarrollo",
        "descripcion": "Este endpoint activará el análisis de patrones con IA en el futuro.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryConnector;

    fn state(connector: &MemoryConnector) -> ApiState {
        ApiState {
            connector: Arc::new(connector.clone()),
            policy: RetryPolicy::immediate(1),
            raw_path: "data/raw".to_string(),
            analyzed_path: "data/analyzed".to_string(),
            default_limit: 50,
        }
    }

    #[tokio::test]
    async fn home_lists_endpoints() {
        let Json(body) = home().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["endpoints_disponibles"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stats_counts_raw_and_analyzed() {
        let connector = MemoryConnector::new();
        connector.put("data/raw/medida_1_20240102.json", "{}");
        connector.put("data/raw/medida_2_20240102.json", "{}");
        connector.put("data/raw/medida_3_20240102.json", "{}");
        connector.put("data/analyzed/medida_1_20240102_analysis_agnostic.json", "{}");
        connector.put("data/analyzed/batch_analysis_summary_agnostic.json", "{}");

        let Json(body) = stats(State(state(&connector))).await.ok().unwrap();

        assert_eq!(body["total_medidas_raw"], 3);
        assert_eq!(body["total_medidas_analizadas"], 1);
        assert_eq!(body["medidas_pendientes_analisis"], 2);
    }

    #[tokio::test]
    async fn stats_failure_is_500() {
        let connector = MemoryConnector::new();
        connector.refuse_next_connects(5);

        let response = stats(State(state(&connector))).await.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn medidas_are_newest_first_and_skip_unreadable() {
        let connector = MemoryConnector::new();
        for n in 1..=3 {
            connector.put(
                &format!("data/analyzed/medida_{}_20240102_analysis_agnostic.json", n),
                format!(r#"{{"numero_medida": "{}"}}"#, n),
            );
        }
        connector.put("data/analyzed/medida_4_20240102_analysis_agnostic.json", "{roto");

        let Json(body) = medidas(
            State(state(&connector)),
            Query(MedidasQuery { limit: Some(3) }),
        )
        .await
        .ok()
        .unwrap();

        // medida_4 排在最前但无法解析，被跳过
        assert_eq!(body["total_encontrado"], 2);
        assert_eq!(body["medidas"][0]["numero_medida"], "3");
        assert_eq!(body["medidas"][1]["numero_medida"], "2");
    }

    #[tokio::test]
    async fn patrones_is_a_placeholder() {
        let Json(body) = patrones().await;
        assert_eq!(body["status"], "endpoint_en_desarrollo");
    }
}
