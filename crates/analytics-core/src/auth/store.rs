//! Persistence for API keys, kept alongside the auth module rather than in
//! `store/` since nothing outside authentication ever queries it directly.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::api_key::{ApiKey, Permission};
use crate::error::AppError;
use crate::store::schema::api_keys;

/// Partial update applied by `PUT /auth/keys/:id`. `None` fields are left
/// unchanged; `is_active: Some(false)` revokes the key, `Some(true)`
/// un-revokes it.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyUpdate {
    pub name: Option<String>,
    pub permissions: Option<Vec<Permission>>,
    pub is_active: Option<bool>,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert(&self, key: ApiKey) -> Result<(), AppError>;
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;
    async fn find_by_id(&self, org_id: &str, id: Uuid) -> Result<Option<ApiKey>, AppError>;
    async fn list(&self, org_id: &str) -> Result<Vec<ApiKey>, AppError>;
    async fn update(&self, org_id: &str, id: Uuid, update: ApiKeyUpdate) -> Result<ApiKey, AppError>;
    async fn delete(&self, org_id: &str, id: Uuid) -> Result<(), AppError>;
    /// Bumps `last_used_at` to now after a successful authentication.
    async fn mark_used(&self, id: Uuid) -> Result<(), AppError>;
}

fn apply_update(key: &mut ApiKey, update: ApiKeyUpdate) {
    if let Some(name) = update.name {
        key.name = name;
    }
    if let Some(permissions) = update.permissions {
        key.permissions = permissions;
    }
    if let Some(is_active) = update.is_active {
        key.revoked_at = if is_active { None } else { Some(Utc::now()) };
    }
}

#[derive(Default)]
pub struct InMemoryApiKeyStore {
    keys: Mutex<HashMap<Uuid, ApiKey>>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn insert(&self, key: ApiKey) -> Result<(), AppError> {
        let mut keys = self.keys.lock().await;
        if keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(AppError::conflict("an api key with this hash already exists"));
        }
        keys.insert(key.id, key);
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(self.keys.lock().await.values().find(|k| k.key_hash == key_hash).cloned())
    }

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        Ok(self.keys.lock().await.get(&id).filter(|k| k.org_id == org_id).cloned())
    }

    async fn list(&self, org_id: &str) -> Result<Vec<ApiKey>, AppError> {
        Ok(self.keys.lock().await.values().filter(|k| k.org_id == org_id).cloned().collect())
    }

    async fn update(&self, org_id: &str, id: Uuid, update: ApiKeyUpdate) -> Result<ApiKey, AppError> {
        let mut keys = self.keys.lock().await;
        let key = keys
            .get_mut(&id)
            .filter(|k| k.org_id == org_id)
            .ok_or_else(|| AppError::not_found("api key not found"))?;
        apply_update(key, update);
        Ok(key.clone())
    }

    async fn delete(&self, org_id: &str, id: Uuid) -> Result<(), AppError> {
        let mut keys = self.keys.lock().await;
        if keys.get(&id).map(|k| k.org_id == org_id).unwrap_or(false) {
            keys.remove(&id);
        }
        Ok(())
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(key) = self.keys.lock().await.get_mut(&id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Queryable, Insertable, AsChangeset)]
#[diesel(table_name = api_keys)]
struct ApiKeyRow {
    id: Uuid,
    org_id: String,
    project_id: Option<String>,
    name: String,
    key_hash: String,
    permissions: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ApiKeyRow {
    fn from_domain(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            org_id: key.org_id.clone(),
            project_id: key.project_id.clone(),
            name: key.name.clone(),
            key_hash: key.key_hash.clone(),
            permissions: serde_json::to_value(&key.permissions).unwrap_or(serde_json::Value::Array(vec![])),
            created_at: key.created_at,
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
        }
    }

    fn into_domain(self) -> ApiKey {
        let permissions: Vec<Permission> = serde_json::from_value(self.permissions).unwrap_or_default();
        ApiKey {
            id: self.id,
            org_id: self.org_id,
            project_id: self.project_id,
            name: self.name,
            key_hash: self.key_hash,
            permissions,
            created_at: self.created_at,
            revoked_at: self.revoked_at,
            last_used_at: self.last_used_at,
        }
    }
}

pub struct PostgresApiKeyStore {
    pool: DbPool,
}

impl PostgresApiKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyStore for PostgresApiKeyStore {
    async fn insert(&self, key: ApiKey) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;
        let row = ApiKeyRow::from_domain(&key);
        tokio::task::spawn_blocking(move || {
            diesel::insert_into(api_keys::table).values(&row).execute(&mut conn).map_err(|err| match err {
                diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                    AppError::conflict("an api key with this hash already exists")
                }
                other => AppError::from(other),
            })
        })
        .await??;
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let mut conn = self.pool.get()?;
        let key_hash = key_hash.to_string();
        let row: Option<ApiKeyRow> = tokio::task::spawn_blocking(move || {
            api_keys::table.filter(api_keys::key_hash.eq(key_hash)).first(&mut conn).optional()
        })
        .await??;
        Ok(row.map(ApiKeyRow::into_domain))
    }

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        let row: Option<ApiKeyRow> = tokio::task::spawn_blocking(move || {
            api_keys::table
                .filter(api_keys::id.eq(id))
                .filter(api_keys::org_id.eq(org_id))
                .first(&mut conn)
                .optional()
        })
        .await??;
        Ok(row.map(ApiKeyRow::into_domain))
    }

    async fn list(&self, org_id: &str) -> Result<Vec<ApiKey>, AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        let rows: Vec<ApiKeyRow> = tokio::task::spawn_blocking(move || {
            api_keys::table.filter(api_keys::org_id.eq(org_id)).load(&mut conn)
        })
        .await??;
        Ok(rows.into_iter().map(ApiKeyRow::into_domain).collect())
    }

    async fn update(&self, org_id: &str, id: Uuid, update: ApiKeyUpdate) -> Result<ApiKey, AppError> {
        let mut key = self
            .find_by_id(org_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("api key not found"))?;
        apply_update(&mut key, update);
        let row = ApiKeyRow::from_domain(&key);

        let mut conn = self.pool.get()?;
        tokio::task::spawn_blocking(move || {
            diesel::update(api_keys::table.find(id)).set(&row).execute(&mut conn).map_err(AppError::from)
        })
        .await??;
        Ok(key)
    }

    async fn delete(&self, org_id: &str, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        tokio::task::spawn_blocking(move || {
            diesel::delete(api_keys::table.filter(api_keys::id.eq(id)).filter(api_keys::org_id.eq(org_id)))
                .execute(&mut conn)
                .map_err(AppError::from)
        })
        .await??;
        Ok(())
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;
        tokio::task::spawn_blocking(move || {
            diesel::update(api_keys::table.find(id))
                .set(api_keys::last_used_at.eq(Some(Utc::now())))
                .execute(&mut conn)
                .map_err(AppError::from)
        })
        .await??;
        Ok(())
    }
}
