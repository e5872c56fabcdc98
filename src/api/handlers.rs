use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::response::{AlertDiscovery, AlertInfo, Envelope, RuleDiscovery, RuleGroupInfo};
use super::tenant::Tenant;
use crate::limits::{check_rule_groups, check_rules_per_group, LimitError, Limits};
use crate::manager::RuleManager;
use crate::policy::{FederationPolicy, PolicyError};
use crate::rulefmt::{parse_group, render_namespaces, FormatError, RuleGroupDesc};
use crate::rules::{Rule, RuleGroup};
use crate::store::{with_timeout, RuleStore, StoreError, StoredGroup};

const YAML_CONTENT_TYPE: &str = "application/yaml";

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn RuleStore>,
    pub limits: Arc<dyn Limits>,
    pub policy: FederationPolicy,
    pub manager: Arc<RuleManager>,
    /// Deadline for each store call made while serving a request
    pub store_timeout: Duration,
}

impl AppState {
    async fn list_groups(
        &self,
        tenant: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<StoredGroup>, StoreError> {
        with_timeout(
            self.store_timeout,
            self.store.list_rule_groups(tenant, namespace),
        )
        .await
    }

    /// Refresh the manager's view of a tenant after a write
    async fn resync(&self, tenant: &str) {
        if let Err(e) = self.manager.sync_tenant(tenant).await {
            tracing::warn!(tenant = %tenant, error = %e, "Failed to reload rule groups after write");
        }
    }
}

fn accepted() -> Response {
    (StatusCode::ACCEPTED, Json(Envelope::<()>::success(None))).into_response()
}

fn yaml(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, YAML_CONTENT_TYPE)], body).into_response()
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Rule Group Configuration
// ============================================================================

/// Create or replace a rule group in `namespace`.
///
/// Checks run in order: definition validation, federation policy, rules per
/// group, then the tenant's group count against the store. Nothing is written
/// unless all of them pass.
pub async fn create_rule_group(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(namespace): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    let group = parse_group(&body)?;
    group.validate()?;
    state.policy.check(state.limits.as_ref(), tenant.as_str(), &group)?;
    check_rules_per_group(state.limits.as_ref(), tenant.as_str(), group.rules.len())?;

    let existing = state.list_groups(tenant.as_str(), None).await?;
    check_rule_groups(
        state.limits.as_ref(),
        tenant.as_str(),
        &existing,
        &namespace,
        &group.name,
    )?;

    let name = group.name.clone();
    with_timeout(
        state.store_timeout,
        state.store.set_rule_group(tenant.as_str(), &namespace, group),
    )
    .await?;

    tracing::info!(tenant = %tenant.as_str(), namespace = %namespace, group = %name, "Rule group stored");
    state.resync(tenant.as_str()).await;
    Ok(accepted())
}

pub async fn get_rule_group(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path((namespace, group)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let desc = with_timeout(
        state.store_timeout,
        state.store.get_rule_group(tenant.as_str(), &namespace, &group),
    )
    .await?;
    Ok(yaml(desc.to_yaml()))
}

fn by_namespace(groups: Vec<StoredGroup>) -> BTreeMap<String, Vec<RuleGroupDesc>> {
    let mut namespaces: BTreeMap<String, Vec<RuleGroupDesc>> = BTreeMap::new();
    for stored in groups {
        namespaces
            .entry(stored.namespace)
            .or_default()
            .push(stored.group);
    }
    namespaces
}

pub async fn list_rule_groups(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
) -> Result<Response, ApiError> {
    let groups = state.list_groups(tenant.as_str(), None).await?;
    if groups.is_empty() {
        return Err(ApiError::NotFound("no rule groups found".to_string()));
    }
    Ok(yaml(render_namespaces(&by_namespace(groups))))
}

pub async fn list_namespace(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(namespace): Path<String>,
) -> Result<Response, ApiError> {
    let groups = state.list_groups(tenant.as_str(), Some(&namespace)).await?;
    if groups.is_empty() {
        return Err(ApiError::NotFound("no rule groups found".to_string()));
    }
    Ok(yaml(render_namespaces(&by_namespace(groups))))
}

pub async fn delete_rule_group(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path((namespace, group)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    with_timeout(
        state.store_timeout,
        state.store.delete_rule_group(tenant.as_str(), &namespace, &group),
    )
    .await?;

    tracing::info!(tenant = %tenant.as_str(), namespace = %namespace, group = %group, "Rule group deleted");
    state.resync(tenant.as_str()).await;
    Ok(accepted())
}

/// Delete every group in `namespace`, one store call per group.
///
/// The first failing deletion stops the operation and is reported as a
/// server error; groups deleted before it stay deleted.
pub async fn delete_namespace(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(namespace): Path<String>,
) -> Result<Response, ApiError> {
    let groups = state.list_groups(tenant.as_str(), Some(&namespace)).await?;
    if groups.is_empty() {
        return Err(StoreError::NamespaceNotFound.into());
    }

    for stored in &groups {
        let deleted = with_timeout(
            state.store_timeout,
            state
                .store
                .delete_rule_group(tenant.as_str(), &namespace, &stored.group.name),
        )
        .await;

        if let Err(e) = deleted {
            tracing::error!(
                tenant = %tenant.as_str(),
                namespace = %namespace,
                group = %stored.group.name,
                error = %e,
                "Failed to delete rule group"
            );
            state.resync(tenant.as_str()).await;
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::<()>::error("server_error", e.to_string())),
            )
                .into_response());
        }
    }

    tracing::info!(tenant = %tenant.as_str(), namespace = %namespace, groups = groups.len(), "Namespace deleted");
    state.resync(tenant.as_str()).await;
    Ok(accepted())
}

// ============================================================================
// Prometheus-compatible Listing
// ============================================================================

fn sorted_groups(state: &AppState, tenant: &str) -> Vec<Arc<RuleGroup>> {
    let mut groups = state.manager.rule_groups(tenant);
    groups.sort_by(|a, b| (a.namespace(), a.name()).cmp(&(b.namespace(), b.name())));
    groups
}

pub async fn prometheus_rules(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
) -> Json<Envelope<RuleDiscovery>> {
    let groups = sorted_groups(&state, tenant.as_str())
        .iter()
        .map(|g| RuleGroupInfo::from(g.as_ref()))
        .collect();
    Json(Envelope::success(Some(RuleDiscovery { groups })))
}

pub async fn prometheus_alerts(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
) -> Json<Envelope<AlertDiscovery>> {
    let alerts = sorted_groups(&state, tenant.as_str())
        .iter()
        .flat_map(|g| g.rules().to_vec())
        .filter_map(|rule| match rule {
            Rule::Alerting(a) => Some(a.firing_alerts()),
            Rule::Recording(_) => None,
        })
        .flatten()
        .map(|alert| AlertInfo::from(&alert))
        .collect();
    Json(Envelope::success(Some(AlertDiscovery { alerts })))
}

// ============================================================================
// Error Handling
// ============================================================================

/// Request failures. Every variant renders as its message plus a newline,
/// in plain text.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no org id")]
    Unauthorized,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_not_found() {
            ApiError::NotFound(e.to_string())
        } else {
            ApiError::Store(e)
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Format(_) | ApiError::Policy(_) | ApiError::Limit(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, format!("{}\n", self)).into_response()
    }
}
