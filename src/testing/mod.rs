//! In-memory port implementations for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::audit::{AuditEntry, AuditFilter, AuditLog, AuditSink, Paging};
use crate::auth::TokenService;
use crate::codec::CompositeId;
use crate::database::DatabaseError;
use crate::org::{NewOrgUnit, OrgRepository, OrgUnit, OrgUpdate};
use crate::permission::{AccessLevel, GrantStore};
use crate::role::{NewRole, Role, RoleRepository, RoleUpdate};

/// Token service with the development key and `admin` as super user
pub fn test_tokens() -> Arc<TokenService> {
    Arc::new(TokenService::new("hc", "hc", vec!["admin".to_string()]).unwrap())
}

/// Grants held in maps; the ancestor walk follows `parents`
#[derive(Default)]
pub struct MemoryGrantStore {
    api: HashSet<(String, String)>,
    levels: HashMap<(String, String), AccessLevel>,
    parents: HashMap<String, String>,
    delay: Option<Duration>,
    queries: AtomicUsize,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_grant(mut self, user_id: &str, path: &str) -> Self {
        self.api.insert((user_id.to_string(), path.to_string()));
        self
    }

    pub fn with_domain_grant(mut self, user_id: &str, domain_id: &str, level: AccessLevel) -> Self {
        self.levels.insert((user_id.to_string(), domain_id.to_string()), level);
        self
    }

    pub fn with_parent_domain(mut self, domain_id: &str, parent: &str) -> Self {
        self.parents.insert(domain_id.to_string(), parent.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn tick(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn count_api_grants(&self, user_id: &str, api_path: &str) -> Result<i64, DatabaseError> {
        self.tick().await;
        let key = (user_id.to_string(), api_path.to_string());
        Ok(i64::from(self.api.contains(&key)))
    }

    async fn domain_level(&self, user_id: &str, domain_id: &str) -> Result<AccessLevel, DatabaseError> {
        self.tick().await;

        let mut best = AccessLevel::None;
        let mut seen = HashSet::new();
        let mut cursor = Some(domain_id.to_string());
        while let Some(domain) = cursor {
            if !seen.insert(domain.clone()) {
                break;
            }
            if let Some(level) = self.levels.get(&(user_id.to_string(), domain.clone())) {
                best = best.max(*level);
            }
            cursor = self.parents.get(&domain).cloned();
        }
        Ok(best)
    }
}

/// Org units in a vector. `writes` counts rows actually persisted.
#[derive(Default)]
pub struct MemoryOrgRepository {
    units: Mutex<Vec<OrgUnit>>,
    calls: AtomicUsize,
    writes: AtomicUsize,
    parked: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MemoryOrgRepository {
    pub fn with_units(units: Vec<(&str, Option<&str>)>) -> Self {
        let now = Utc::now();
        let units = units
            .into_iter()
            .map(|(id, parent)| OrgUnit {
                id: CompositeId::parse(id).unwrap(),
                description: String::new(),
                parent: parent.map(|p| CompositeId::parse(p).unwrap()),
                create_user: "admin".to_string(),
                create_date: now,
                maintain_user: "admin".to_string(),
                maintain_date: now,
            })
            .collect();
        Self {
            units: Mutex::new(units),
            ..Self::default()
        }
    }

    /// `insert_batch` parks on `gate` until notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn units(&self) -> Vec<OrgUnit> {
        self.units.lock().unwrap().clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.lock().unwrap().iter().any(|u| u.id.to_string() == id)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    fn to_unit(unit: &NewOrgUnit, user_id: &str) -> OrgUnit {
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
impl OrgRepository for MemoryOrgRepository {
    async fn list(&self, domain_id: &str) -> Result<Vec<OrgUnit>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .units
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.domain_id() == domain_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, unit: &NewOrgUnit, user_id: &str) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = self.units.lock().unwrap();
        if units.iter().any(|u| u.id == unit.id) {
            return Err(DatabaseError::Conflict(unit.id.to_string()));
        }
        units.push(Self::to_unit(unit, user_id));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, update: &OrgUpdate, user_id: &str) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = self.units.lock().unwrap();
        let unit = units
            .iter_mut()
            .find(|u| u.id == update.id)
            .ok_or_else(|| DatabaseError::NotFound(update.id.to_string()))?;
        unit.description = update.description.clone();
        unit.parent = update.parent.clone();
        unit.maintain_user = user_id.to_string();
        unit.maintain_date = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = self.units.lock().unwrap();
        let before = units.len();
        units.retain(|u| !ids.contains(&u.id));
        self.writes.fetch_add(before - units.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn insert_batch(&self, batch: &[NewOrgUnit], user_id: &str) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            self.parked.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        }

        let mut units = self.units.lock().unwrap();
        let mut keys: HashSet<&CompositeId> = units.iter().map(|u| &u.id).collect();
        for unit in batch {
            if !keys.insert(&unit.id) {
                return Err(DatabaseError::Conflict(unit.id.to_string()));
            }
        }

        let staged: Vec<OrgUnit> = batch.iter().map(|u| Self::to_unit(u, user_id)).collect();
        units.extend(staged);
        self.writes.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRoleRepository {
    roles: Mutex<Vec<Role>>,
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn list(&self, domain_id: &str) -> Result<Vec<Role>, DatabaseError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.domain_id() == domain_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, role: &NewRole, user_id: &str) -> Result<(), DatabaseError> {
        let mut roles = self.roles.lock().unwrap();
        if roles.iter().any(|r| r.id == role.id) {
            return Err(DatabaseError::Conflict(role.id.to_string()));
        }
        let now = Utc::now();
        roles.push(Role {
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

    async fn update(&self, update: &RoleUpdate, user_id: &str) -> Result<u64, DatabaseError> {
        let mut roles = self.roles.lock().unwrap();
        match roles.iter_mut().find(|r| r.id == update.id) {
            Some(role) => {
                role.name = update.name.clone();
                role.status = update.status.clone();
                role.maintain_user = user_id.to_string();
                role.maintain_date = Utc::now();
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

/// Keeps recorded entries; can park on a gate or fail its first write
#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    gate: Option<Arc<Notify>>,
    pending: AtomicUsize,
    fail_next: AtomicBool,
    read_delay: Option<Duration>,
}

impl RecordingAuditSink {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn failing_first() -> Self {
        Self {
            fail_next: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn with_entries(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Reads sleep for `delay` before answering
    pub fn slow_reads(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        if let Some(gate) = &self.gate {
            self.pending.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("sink unavailable".to_string()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

impl RecordingAuditSink {
    async fn scoped(&self, domain_id: &str) -> Vec<AuditEntry> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        let mut entries: Vec<AuditEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.domain_id == domain_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.handled_at.cmp(&a.handled_at));
        entries
    }
}

#[async_trait]
impl AuditLog for RecordingAuditSink {
    async fn page(&self, domain_id: &str, paging: Paging) -> Result<(Vec<AuditEntry>, i64), DatabaseError> {
        let entries = self.scoped(domain_id).await;
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(paging.offset as usize)
            .take(paging.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn search(&self, domain_id: &str, filter: &AuditFilter) -> Result<Vec<AuditEntry>, DatabaseError> {
        Ok(self
            .scoped(domain_id)
            .await
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }
}
