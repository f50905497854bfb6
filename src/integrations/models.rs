//! Gemini model catalog.
//!
//! Resolution order: the `GEMINI_MODELS_OVERRIDE` list, a fresh cached
//! fetch, the hardcoded defaults when no `GOOGLE_API_KEY` is set, and
//! finally a live fetch from the Generative Language API.

use crate::integrations::HTTP_CLIENT;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

pub const OVERRIDE_ENV: &str = "GEMINI_MODELS_OVERRIDE";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// How long a fetched list is served before refetching.
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Served when there is no API key or the fetch fails.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-3-pro-preview",
    "gemini-3-flash-preview",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

const GENERATE_CONTENT: &str = "generateContent";

static CATALOG: Lazy<ModelCatalog> = Lazy::new(ModelCatalog::default);

/// Models usable for a new Gemini session, read from the process environment.
pub async fn get_available_models() -> Vec<String> {
    if let Some(models) = std::env::var(OVERRIDE_ENV)
        .ok()
        .and_then(|raw| models_from_override(&raw))
    {
        tracing::debug!("Using {} models from {}", models.len(), OVERRIDE_ENV);
        return models;
    }

    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty());
    CATALOG.models(api_key.as_deref()).await
}

pub fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

/// Split a comma-separated override into a sorted, de-duplicated list.
///
/// Returns `None` when nothing usable is left, so the caller falls through
/// to the other sources.
pub fn models_from_override(raw: &str) -> Option<Vec<String>> {
    let mut models: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if models.is_empty() {
        return None;
    }
    models.sort();
    models.dedup();
    Some(models)
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Extract chat-capable model ids from a `v1beta/models` response body.
pub fn parse_model_list(body: &str) -> Result<Vec<String>> {
    let list: ModelList = serde_json::from_str(body).context("Failed to parse model list")?;

    let mut models: Vec<String> = list
        .models
        .into_iter()
        .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_CONTENT))
        .map(|m| {
            m.name
                .strip_prefix("models/")
                .map(str::to_string)
                .unwrap_or(m.name)
        })
        .collect();
    models.sort();
    models.dedup();
    Ok(models)
}

// =============================================================================
// Cached catalog
// =============================================================================

#[derive(Debug)]
struct CachedModels {
    models: Vec<String>,
    fetched_at: Instant,
}

/// Time-bounded cache around the model endpoint.
///
/// One lock guards the cache and is held across the fetch, so callers
/// arriving during a miss wait and then read what the first caller stored.
#[derive(Debug)]
pub struct ModelCatalog {
    endpoint: String,
    ttl: Duration,
    state: Mutex<Option<CachedModels>>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(GEMINI_API_URL, MODEL_CACHE_TTL)
    }
}

impl ModelCatalog {
    pub fn new(endpoint: impl Into<String>, ttl: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Cached list, defaults without a key, otherwise a live fetch.
    pub async fn models(&self, api_key: Option<&str>) -> Vec<String> {
        self.models_with(api_key, |key| fetch_models(&self.endpoint, key))
            .await
    }

    /// Same as [`models`](Self::models) with a caller-supplied fetcher.
    pub async fn models_with<F, Fut>(&self, api_key: Option<&str>, fetch: F) -> Vec<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        let mut guard = self.state.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl && !cached.models.is_empty() {
                return cached.models.clone();
            }
        }

        let Some(key) = api_key else {
            return default_models();
        };

        match fetch(key.to_string()).await {
            Ok(models) if !models.is_empty() => {
                tracing::debug!("Fetched {} Gemini models", models.len());
                *guard = Some(CachedModels {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                });
                models
            }
            Ok(_) => {
                tracing::warn!("Model catalog returned no usable models, using defaults");
                default_models()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch Gemini models, using defaults: {:#}", e);
                default_models()
            }
        }
    }
}

async fn fetch_models(endpoint: &str, api_key: String) -> Result<Vec<String>> {
    let url = format!(
        "{}/v1beta/models?key={}",
        endpoint.trim_end_matches('/'),
        urlencoding::encode(&api_key)
    );

    let response = HTTP_CLIENT
        .get(&url)
        .send()
        .await
        .context("Failed to reach model catalog")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Model catalog returned {}", status);
    }

    let body = response
        .text()
        .await
        .context("Failed to read model catalog response")?;
    parse_model_list(&body)
}
