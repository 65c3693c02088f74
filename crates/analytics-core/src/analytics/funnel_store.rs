//! Persistence for funnel definitions. Kept separate from the funnel
//! computation (`funnel.rs`) the same way `auth::store` separates API key
//! persistence from auth middleware.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::funnel::{validate_steps, Funnel, FunnelStep};
use crate::error::AppError;
use crate::store::schema::funnels;

/// Partial update applied by `PUT /funnels/:id`. `None` fields are left
/// unchanged. Mirrors `auth::store::ApiKeyUpdate`.
#[derive(Debug, Clone, Default)]
pub struct FunnelUpdate {
    pub name: Option<String>,
    pub steps: Option<Vec<FunnelStep>>,
}

#[async_trait]
pub trait FunnelStore: Send + Sync {
    async fn create(&self, funnel: Funnel) -> Result<Funnel, AppError>;
    async fn get(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<Option<Funnel>, AppError>;
    async fn list(&self, org_id: &str, project_id: &str) -> Result<Vec<Funnel>, AppError>;
    async fn update(
        &self,
        org_id: &str,
        project_id: &str,
        id: Uuid,
        update: FunnelUpdate,
    ) -> Result<Funnel, AppError>;
    async fn delete(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<(), AppError>;
}

fn apply_update(funnel: &mut Funnel, update: FunnelUpdate) -> Result<(), AppError> {
    if let Some(steps) = update.steps {
        validate_steps(&steps)?;
        funnel.steps = steps;
    }
    if let Some(name) = update.name {
        funnel.name = name;
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryFunnelStore {
    funnels: Mutex<HashMap<Uuid, Funnel>>,
}

impl InMemoryFunnelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FunnelStore for InMemoryFunnelStore {
    async fn create(&self, funnel: Funnel) -> Result<Funnel, AppError> {
        let mut funnels = self.funnels.lock().await;
        let name_taken = funnels
            .values()
            .any(|f| f.org_id == funnel.org_id && f.project_id == funnel.project_id && f.name == funnel.name);
        if name_taken {
            return Err(AppError::conflict(format!("a funnel named '{}' already exists", funnel.name)));
        }
        funnels.insert(funnel.id, funnel.clone());
        Ok(funnel)
    }

    async fn get(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<Option<Funnel>, AppError> {
        Ok(self
            .funnels
            .lock()
            .await
            .get(&id)
            .filter(|f| f.org_id == org_id && f.project_id == project_id)
            .cloned())
    }

    async fn list(&self, org_id: &str, project_id: &str) -> Result<Vec<Funnel>, AppError> {
        Ok(self
            .funnels
            .lock()
            .await
            .values()
            .filter(|f| f.org_id == org_id && f.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        org_id: &str,
        project_id: &str,
        id: Uuid,
        update: FunnelUpdate,
    ) -> Result<Funnel, AppError> {
        let mut funnels = self.funnels.lock().await;
        let renamed_to = update.name.clone();
        if let Some(new_name) = &renamed_to {
            let name_taken = funnels
                .values()
                .any(|f| f.id != id && f.org_id == org_id && f.project_id == project_id && &f.name == new_name);
            if name_taken {
                return Err(AppError::conflict(format!("a funnel named '{new_name}' already exists")));
            }
        }
        let funnel = funnels
            .get_mut(&id)
            .filter(|f| f.org_id == org_id && f.project_id == project_id)
            .ok_or_else(|| AppError::not_found("funnel not found"))?;
        apply_update(funnel, update)?;
        Ok(funnel.clone())
    }

    async fn delete(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<(), AppError> {
        let mut funnels = self.funnels.lock().await;
        if let Some(f) = funnels.get(&id) {
            if f.org_id == org_id && f.project_id == project_id {
                funnels.remove(&id);
            }
        }
        Ok(())
    }
}

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Queryable, Insertable)]
#[diesel(table_name = funnels)]
struct FunnelRow {
    id: Uuid,
    org_id: String,
    project_id: String,
    name: String,
    steps: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl FunnelRow {
    fn from_domain(funnel: &Funnel) -> Self {
        Self {
            id: funnel.id,
            org_id: funnel.org_id.clone(),
            project_id: funnel.project_id.clone(),
            name: funnel.name.clone(),
            steps: serde_json::to_value(&funnel.steps).unwrap_or(serde_json::Value::Array(vec![])),
            created_at: funnel.created_at,
        }
    }

    fn into_domain(self) -> Funnel {
        let steps: Vec<FunnelStep> = serde_json::from_value(self.steps).unwrap_or_default();
        Funnel {
            id: self.id,
            org_id: self.org_id,
            project_id: self.project_id,
            name: self.name,
            steps,
            created_at: self.created_at,
        }
    }
}

pub struct PostgresFunnelStore {
    pool: DbPool,
}

impl PostgresFunnelStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FunnelStore for PostgresFunnelStore {
    async fn create(&self, funnel: Funnel) -> Result<Funnel, AppError> {
        let mut conn = self.pool.get()?;
        let row = FunnelRow::from_domain(&funnel);
        let funnel_name = funnel.name.clone();

        tokio::task::spawn_blocking(move || {
            diesel::insert_into(funnels::table).values(&row).execute(&mut conn).map_err(|err| match err {
                diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                    AppError::conflict(format!("a funnel named '{funnel_name}' already exists"))
                }
                other => AppError::from(other),
            })
        })
        .await??;
        Ok(funnel)
    }

    async fn get(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<Option<Funnel>, AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        let project_id = project_id.to_string();

        let row: Option<FunnelRow> = tokio::task::spawn_blocking(move || {
            funnels::table
                .filter(funnels::id.eq(id))
                .filter(funnels::org_id.eq(org_id))
                .filter(funnels::project_id.eq(project_id))
                .first(&mut conn)
                .optional()
        })
        .await??;
        Ok(row.map(FunnelRow::into_domain))
    }

    async fn list(&self, org_id: &str, project_id: &str) -> Result<Vec<Funnel>, AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        let project_id = project_id.to_string();

        let rows: Vec<FunnelRow> = tokio::task::spawn_blocking(move || {
            funnels::table
                .filter(funnels::org_id.eq(org_id))
                .filter(funnels::project_id.eq(project_id))
                .load(&mut conn)
        })
        .await??;
        Ok(rows.into_iter().map(FunnelRow::into_domain).collect())
    }

    async fn update(
        &self,
        org_id: &str,
        project_id: &str,
        id: Uuid,
        update: FunnelUpdate,
    ) -> Result<Funnel, AppError> {
        let mut funnel = self
            .get(org_id, project_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("funnel not found"))?;
        apply_update(&mut funnel, update)?;

        let mut conn = self.pool.get()?;
        let row = FunnelRow::from_domain(&funnel);
        let funnel_name = funnel.name.clone();

        tokio::task::spawn_blocking(move || {
            diesel::update(funnels::table.find(id))
                .set((funnels::name.eq(&row.name), funnels::steps.eq(&row.steps)))
                .execute(&mut conn)
                .map_err(|err| match err {
                    diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                        AppError::conflict(format!("a funnel named '{funnel_name}' already exists"))
                    }
                    other => AppError::from(other),
                })
        })
        .await??;
        Ok(funnel)
    }

    async fn delete(&self, org_id: &str, project_id: &str, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;
        let org_id = org_id.to_string();
        let project_id = project_id.to_string();

        tokio::task::spawn_blocking(move || {
            diesel::delete(
                funnels::table
                    .filter(funnels::id.eq(id))
                    .filter(funnels::org_id.eq(org_id))
                    .filter(funnels::project_id.eq(project_id)),
            )
            .execute(&mut conn)
            .map_err(AppError::from)
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::funnel::{FunnelStep, NewFunnel};
    use crate::domain::Tenant;

    fn funnel(org: &str, name: &str) -> Funnel {
        Funnel::new(
            org,
            "proj-1",
            NewFunnel {
                name: name.to_string(),
                steps: vec![
                    FunnelStep { event_name: "signup".to_string(), filter: None, time_window_secs: 0 },
                    FunnelStep { event_name: "purchase".to_string(), filter: None, time_window_secs: 0 },
                ],
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = InMemoryFunnelStore::new();
        let funnel = store.create(funnel("org-1", "checkout")).await.unwrap();
        let fetched = store.get("org-1", "proj-1", funnel.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "checkout");
    }

    #[tokio::test]
    async fn duplicate_name_in_same_tenant_conflicts() {
        let store = InMemoryFunnelStore::new();
        store.create(funnel("org-1", "checkout")).await.unwrap();
        let err = store.create(funnel("org-1", "checkout")).await.unwrap_err();
        assert_eq!(err.error_code(), "conflict");
    }

    #[tokio::test]
    async fn get_is_scoped_to_tenant() {
        let store = InMemoryFunnelStore::new();
        let funnel = store.create(funnel("org-1", "checkout")).await.unwrap();
        let tenant = Tenant::new("org-2", "proj-1");
        assert!(store.get(&tenant.org_id, &tenant.project_id, funnel.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_renames_and_replaces_steps() {
        let store = InMemoryFunnelStore::new();
        let funnel = store.create(funnel("org-1", "checkout")).await.unwrap();

        let updated = store
            .update(
                "org-1",
                "proj-1",
                funnel.id,
                FunnelUpdate {
                    name: Some("activation".to_string()),
                    steps: Some(vec![
                        FunnelStep { event_name: "visit".to_string(), filter: None, time_window_secs: 0 },
                        FunnelStep { event_name: "signup".to_string(), filter: None, time_window_secs: 0 },
                    ]),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "activation");
        assert_eq!(updated.steps.len(), 2);
        assert_eq!(updated.steps[0].event_name, "visit");
    }

    #[tokio::test]
    async fn update_rejects_a_single_step() {
        let store = InMemoryFunnelStore::new();
        let funnel = store.create(funnel("org-1", "checkout")).await.unwrap();

        let err = store
            .update(
                "org-1",
                "proj-1",
                funnel.id,
                FunnelUpdate {
                    name: None,
                    steps: Some(vec![FunnelStep {
                        event_name: "visit".to_string(),
                        filter: None,
                        time_window_secs: 0,
                    }]),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_input");
    }
}
