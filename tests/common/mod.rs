#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use hauth_api::app::{self, AppState, Ports};
use hauth_api::audit::{AuditEntry, AuditFilter, AuditLog, AuditSink, Paging};
use hauth_api::auth::AccountStore;
use hauth_api::codec::CompositeId;
use hauth_api::config::AppConfig;
use hauth_api::database::{DatabaseError, HealthCheck};
use hauth_api::org::{NewOrgUnit, OrgRepository, OrgUnit, OrgUpdate};
use hauth_api::permission::{AccessLevel, GrantStore};
use hauth_api::role::{NewRole, Role, RoleRepository, RoleUpdate};

#[derive(Default)]
pub struct Grants {
    api: HashSet<(String, String)>,
    levels: HashMap<(String, String), AccessLevel>,
    delay: Option<Duration>,
}

impl Grants {
    /// Every lookup sleeps for `delay` first
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn api(mut self, user_id: &str, path: &str) -> Self {
        self.api.insert((user_id.to_string(), path.to_string()));
        self
    }

    pub fn domain(mut self, user_id: &str, domain_id: &str, level: AccessLevel) -> Self {
        self.levels.insert((user_id.to_string(), domain_id.to_string()), level);
        self
    }
}

#[async_trait]
impl GrantStore for Grants {
    async fn count_api_grants(&self, user_id: &str, api_path: &str) -> Result<i64, DatabaseError> {
        self.pause().await;
        Ok(i64::from(self.api.contains(&(user_id.to_string(), api_path.to_string()))))
    }

    async fn domain_level(&self, user_id: &str, domain_id: &str) -> Result<AccessLevel, DatabaseError> {
        self.pause().await;
        Ok(self
            .levels
            .get(&(user_id.to_string(), domain_id.to_string()))
            .copied()
            .unwrap_or(AccessLevel::None))
    }
}

#[derive(Default)]
pub struct Orgs {
    units: Mutex<Vec<OrgUnit>>,
}

impl Orgs {
    pub fn with(units: &[(&str, Option<&str>)]) -> Self {
        let now = Utc::now();
        let units = units
            .iter()
            .map(|(id, parent)| OrgUnit {
                id: CompositeId::parse(id).unwrap(),
                description: format!("unit {}", id),
                parent: parent.map(|p| CompositeId::parse(p).unwrap()),
                create_user: "admin".to_string(),
                create_date: now,
                maintain_user: "admin".to_string(),
                maintain_date: now,
            })
            .collect();
        Self { units: Mutex::new(units) }
    }

    pub fn ids(&self) -> Vec<String> {
        self.units.lock().unwrap().iter().map(|u| u.id.to_string()).collect()
    }

    fn stamp(unit: &NewOrgUnit, user_id: &str) -> OrgUnit {
        let now = Utc::now();
        OrgUnit {
            id: unit.id.clone(),
            description: unit.description.clone(),
            parent: unit.parent.clone(),
            create_user: user_id.to_string(),
            create_date: now,
            maintain_user: user_id.to_string(),
            maintain_date: now,
        }
    }
}

#[async_trait]
impl OrgRepository for Orgs {
    async fn list(&self, domain_id: &str) -> Result<Vec<OrgUnit>, DatabaseError> {
        let units = self.units.lock().unwrap();
        Ok(units.iter().filter(|u| u.domain_id() == domain_id).cloned().collect())
    }

    async fn insert(&self, unit: &NewOrgUnit, user_id: &str) -> Result<(), DatabaseError> {
        let mut units = self.units.lock().unwrap();
        if units.iter().any(|u| u.id == unit.id) {
            return Err(DatabaseError::Conflict(unit.id.to_string()));
        }
        units.push(Self::stamp(unit, user_id));
        Ok(())
    }

    async fn update(&self, update: &OrgUpdate, user_id: &str) -> Result<(), DatabaseError> {
        let mut units = self.units.lock().unwrap();
        let unit = units
            .iter_mut()
            .find(|u| u.id == update.id)
            .ok_or_else(|| DatabaseError::NotFound(update.id.to_string()))?;
        unit.description = update.description.clone();
        unit.parent = update.parent.clone();
        unit.maintain_user = user_id.to_string();
        Ok(())
    }

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError> {
        self.units.lock().unwrap().retain(|u| !ids.contains(&u.id));
        Ok(())
    }

    async fn insert_batch(&self, batch: &[NewOrgUnit], user_id: &str) -> Result<(), DatabaseError> {
        let mut units = self.units.lock().unwrap();
        let mut keys: HashSet<CompositeId> = units.iter().map(|u| u.id.clone()).collect();
        for unit in batch {
            if !keys.insert(unit.id.clone()) {
                return Err(DatabaseError::Conflict(unit.id.to_string()));
            }
        }
        units.extend(batch.iter().map(|u| Self::stamp(u, user_id)));
        Ok(())
    }
}

#[derive(Default)]
pub struct Roles {
    roles: Mutex<Vec<Role>>,
}

impl Roles {
    pub fn ids(&self) -> Vec<String> {
        self.roles.lock().unwrap().iter().map(|r| r.id.to_string()).collect()
    }
}

#[async_trait]
impl RoleRepository for Roles {
    async fn list(&self, domain_id: &str) -> Result<Vec<Role>, DatabaseError> {
        let roles = self.roles.lock().unwrap();
        Ok(roles.iter().filter(|r| r.domain_id() == domain_id).cloned().collect())
    }

    async fn insert(&self, role: &NewRole, user_id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now();
        self.roles.lock().unwrap().push(Role {
            id: role.id.clone(),
            name: role.name.clone(),
            status: role.status.clone(),
            create_user: user_id.to_string(),
            create_date: now,
            maintain_user: user_id.to_string(),
            maintain_date: now,
        });
        Ok(())
    }

    async fn update(&self, update: &RoleUpdate, _user_id: &str) -> Result<u64, DatabaseError> {
        let mut roles = self.roles.lock().unwrap();
        match roles.iter_mut().find(|r| r.id == update.id) {
            Some(role) => {
                role.name = update.name.clone();
                role.status = update.status.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError> {
        self.roles.lock().unwrap().retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}

/// user id -> (domain, default org, password)
#[derive(Default)]
pub struct Accounts {
    users: HashMap<String, (Option<String>, Option<String>, String)>,
}

impl Accounts {
    pub fn user(mut self, user_id: &str, domain: Option<&str>, org: Option<&str>, password: &str) -> Self {
        self.users.insert(
            user_id.to_string(),
            (domain.map(str::to_string), org.map(str::to_string), password.to_string()),
        );
        self
    }
}

#[async_trait]
impl AccountStore for Accounts {
    async fn domain_of(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.users.get(user_id).and_then(|(domain, _, _)| domain.clone()))
    }

    async fn default_org(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.users.get(user_id).and_then(|(_, org, _)| org.clone()))
    }

    async fn check_password(&self, user_id: &str, password: &str) -> Result<bool, DatabaseError> {
        Ok(self.users.get(user_id).map(|(_, _, p)| p == password).unwrap_or(false))
    }
}

/// Audit entries in memory; serves both the write and the read side
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<AuditEntry>>,
}

impl Journal {
    pub fn with(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Poll until `n` entries have been written by the audit worker
    pub async fn wait_for(&self, n: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = self.entries();
            if entries.len() >= n {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.entries()
    }

    fn scoped(&self, domain_id: &str) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = self
            .entries()
            .into_iter()
            .filter(|e| e.domain_id == domain_id)
            .collect();
        entries.sort_by(|a, b| b.handled_at.cmp(&a.handled_at));
        entries
    }
}

#[async_trait]
impl AuditSink for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLog for Journal {
    async fn page(&self, domain_id: &str, paging: Paging) -> Result<(Vec<AuditEntry>, i64), DatabaseError> {
        let entries = self.scoped(domain_id);
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(paging.offset as usize)
            .take(paging.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn search(&self, domain_id: &str, filter: &AuditFilter) -> Result<Vec<AuditEntry>, DatabaseError> {
        Ok(self.scoped(domain_id).into_iter().filter(|e| filter.matches(e)).collect())
    }
}

pub struct Health(pub bool);

#[async_trait]
impl HealthCheck for Health {
    async fn ping(&self) -> Result<(), DatabaseError> {
        if self.0 {
            Ok(())
        } else {
            Err(DatabaseError::QueryError("connection refused".to_string()))
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub orgs: Arc<Orgs>,
    pub roles: Arc<Roles>,
    pub journal: Arc<Journal>,
}

/// Knobs on top of the development configuration
#[derive(Default)]
pub struct Options {
    pub unhealthy: bool,
    pub query_timeout_ms: Option<u64>,
    /// Turn the audit worker on, writing into the journal
    pub audit: bool,
    pub journal: Journal,
}

pub fn build(grants: Grants, orgs: Orgs, accounts: Accounts, healthy: bool) -> TestApp {
    build_with(
        grants,
        orgs,
        accounts,
        Options {
            unhealthy: !healthy,
            ..Options::default()
        },
    )
}

/// Must run inside a tokio runtime when `options.audit` is set
pub fn build_with(grants: Grants, orgs: Orgs, accounts: Accounts, options: Options) -> TestApp {
    let orgs = Arc::new(orgs);
    let roles = Arc::new(Roles::default());
    let journal = Arc::new(options.journal);

    let mut config = AppConfig::development();
    config.audit.enabled = options.audit;
    if let Some(ms) = options.query_timeout_ms {
        config.database.query_timeout_ms = ms;
    }

    let ports = Ports {
        grants: Arc::new(grants),
        orgs: orgs.clone(),
        roles: roles.clone(),
        accounts: Arc::new(accounts),
        health: Arc::new(Health(!options.unhealthy)),
        audit_sink: Some(journal.clone()),
        audit_log: journal.clone(),
    };

    let state = AppState::compose(config, ports).unwrap();
    let registry = app::default_registry().unwrap();
    let router = app::router(state.clone(), &registry);
    TestApp {
        router,
        state,
        orgs,
        roles,
        journal,
    }
}

impl TestApp {
    /// Cookie header value carrying a fresh token for `user_id` in `domain_id`
    pub fn cookie(&self, user_id: &str, domain_id: &str) -> String {
        let token = self
            .state
            .tokens
            .issue(user_id, domain_id, &format!("{}_join_root", domain_id), 3600)
            .unwrap();
        format!("{}={}", self.state.config.security.cookie_name, token)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body, set_cookie)
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn form(method: &str, uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
