//! Identity moderation for administrators.
//!
//! These routes sit behind the session guard and an admin-only role gate.
//! Role changes reach the affected user's access token at their next
//! refresh; until then the old role stays in effect.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use jobboard_core::{IdentityId, Role};
use serde::{Deserialize, Serialize};

use super::{IdentityResponse, json_body};
use crate::auth::{AuthError, CurrentIdentity, Identity, PublicIdentity};
use crate::server::GatewayState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Query parameters for listing identities.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    page: Option<usize>,
    limit: Option<usize>,
    role: Option<String>,
    search: Option<String>,
}

/// Page of identities.
#[derive(Debug, Serialize)]
pub struct UserPage {
    /// Identities on this page, newest first.
    pub data: Vec<PublicIdentity>,
    /// Paging metadata.
    pub pagination: Pagination,
}

/// Paging metadata.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
    /// Matching identities across all pages.
    pub total: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// Changes an administrator may make to an identity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    /// New role.
    #[serde(default)]
    pub role: Option<String>,
    /// Enable or disable.
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn matches(identity: &Identity, role: Option<Role>, search: Option<&str>) -> bool {
    if role.is_some_and(|role| identity.role != role) {
        return false;
    }

    search.is_none_or(|needle| {
        identity.name.to_lowercase().contains(needle) || identity.email.contains(needle)
    })
}

fn paginate(identities: Vec<Identity>, params: &ListParams, role: Option<Role>) -> UserPage {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let search = params
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let filtered: Vec<Identity> = identities
        .into_iter()
        .filter(|identity| matches(identity, role, search.as_deref()))
        .collect();

    let total = filtered.len();
    let data = filtered
        .iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(Identity::to_public)
        .collect();

    UserPage {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    }
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<UserPage>, AuthError> {
    let role = params
        .role
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(str::parse::<Role>)
        .transpose()?;

    let identities = state.store.list().await?;
    Ok(Json(paginate(identities, &params, role)))
}

/// `PATCH /api/admin/users/{id}`
pub async fn update_user(
    State(state): State<Arc<GatewayState>>,
    CurrentIdentity(admin): CurrentIdentity,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<IdentityResponse>, AuthError> {
    let body = json_body(payload)?;
    let id = IdentityId::new(id);

    if id == admin.id {
        return Err(AuthError::Validation(
            "Cannot modify your own account".to_string(),
        ));
    }

    let role = body.role.as_deref().map(str::parse::<Role>).transpose()?;

    let mut identity = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AuthError::NotFound("user".to_string()))?;

    if let Some(role) = role {
        identity.set_role(role);
    }
    if let Some(active) = body.is_active {
        identity.set_active(active);
    }
    state.store.update(&identity).await?;

    tracing::info!(
        admin = %admin.id,
        identity = %identity.id,
        role = %identity.role,
        active = identity.active,
        "Identity updated by admin"
    );

    Ok(Json(IdentityResponse {
        user: identity.to_public(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn identity(n: i64, name: &str, role: Role) -> Identity {
        let created = Utc::now() - Duration::minutes(n);
        Identity {
            id: IdentityId::new(format!("user_{n}")),
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            secret_hash: None,
            role,
            active: true,
            created_at: created,
            updated_at: created,
            last_login: None,
            version: 0,
        }
    }

    fn sample() -> Vec<Identity> {
        vec![
            identity(1, "Ada", Role::Seeker),
            identity(2, "Boss", Role::Employer),
            identity(3, "Carol", Role::Seeker),
            identity(4, "Root", Role::Admin),
            identity(5, "Dana", Role::Employer),
        ]
    }

    #[test]
    fn test_paginate_defaults() {
        let page = paginate(sample(), &ListParams::default(), None);
        assert_eq!(page.data.len(), 5);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 20,
                total: 5,
                total_pages: 1
            }
        );
    }

    #[test]
    fn test_paginate_pages_and_clamps() {
        let params = ListParams {
            page: Some(2),
            limit: Some(2),
            ..ListParams::default()
        };
        let page = paginate(sample(), &params, None);
        let names: Vec<_> = page.data.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Carol", "Root"]);
        assert_eq!(page.pagination.total_pages, 3);

        let params = ListParams {
            page: Some(0),
            limit: Some(1000),
            ..ListParams::default()
        };
        let page = paginate(sample(), &params, None);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_filter_by_role_and_search() {
        let page = paginate(sample(), &ListParams::default(), Some(Role::Employer));
        assert_eq!(page.pagination.total, 2);

        let params = ListParams {
            search: Some("  CAR ".to_string()),
            ..ListParams::default()
        };
        let page = paginate(sample(), &params, None);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Carol");
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let params = ListParams {
            page: Some(9),
            ..ListParams::default()
        };
        let page = paginate(sample(), &params, None);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 5);
    }
}
