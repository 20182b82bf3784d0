//! Request audit log. Handlers never wait on persistence: entries go
//! through a bounded queue drained by one background worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::OverflowPolicy;
use crate::database::{with_deadline, DatabaseError};

/// Default page size when the caller sends no `limit`
pub const DEFAULT_PAGE_SIZE: i64 = 20;
/// Larger `limit` values are clamped to this
pub const MAX_PAGE_SIZE: i64 = 500;

pub const EXPORT_HEADER: [&str; 6] = ["User", "Handle time", "Client IP", "Method", "URL", "Status code"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: String,
    pub domain_id: String,
    pub client_ip: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub handled_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        domain_id: impl Into<String>,
        client_ip: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            domain_id: domain_id.into(),
            client_ip: client_ip.into(),
            method: method.into(),
            url: url.into(),
            status_code,
            handled_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn record(&self, entry: &AuditEntry) -> Result<(), DatabaseError>;
}

pub struct AuditService {
    tx: mpsc::Sender<AuditEntry>,
    overflow_policy: OverflowPolicy,
}

impl AuditService {
    /// Spawns the worker; must be called inside a tokio runtime
    pub fn new(sink: Arc<dyn AuditSink>, queue_capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(Self::background_task(rx, sink));
        Self { tx, overflow_policy }
    }

    async fn background_task(mut rx: mpsc::Receiver<AuditEntry>, sink: Arc<dyn AuditSink>) {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = sink.record(&entry).await {
                warn!("Audit sink '{}' failed to record {} {}: {}", sink.name(), entry.method, entry.url, e);
            }
        }
        debug!("Audit queue closed, worker exiting");
    }

    /// Queue an entry. Returns `false` if it was dropped.
    pub async fn log(&self, entry: AuditEntry) -> bool {
        match self.overflow_policy {
            OverflowPolicy::Block => self.tx.send(entry).await.is_ok(),
            OverflowPolicy::DropNewest => match self.tx.try_send(entry) {
                Ok(()) => true,
                Err(TrySendError::Full(entry)) => {
                    warn!("Audit queue full, dropped entry for {} {}", entry.method, entry.url);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        }
    }
}

/// Read side of the audit log. Every query is scoped to one domain and
/// returns newest entries first.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// One page plus the total number of entries in the domain
    async fn page(&self, domain_id: &str, paging: Paging) -> Result<(Vec<AuditEntry>, i64), DatabaseError>;

    async fn search(&self, domain_id: &str, filter: &AuditFilter) -> Result<Vec<AuditEntry>, DatabaseError>;
}

#[derive(Debug, Error)]
pub enum AuditQueryError {
    #[error("invalid paging value '{0}'")]
    InvalidPaging(String),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl AuditQueryError {
    pub fn message_key(&self, fallback: &'static str) -> &'static str {
        match self {
            AuditQueryError::Persistence(DatabaseError::Timeout(_)) => "error_query_timeout",
            _ => fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: i64,
    pub limit: i64,
}

impl Paging {
    /// Empty values fall back to the first page of `DEFAULT_PAGE_SIZE`
    pub fn parse(offset: &str, limit: &str) -> Result<Self, AuditQueryError> {
        let offset = parse_count(offset, 0)?;
        let limit = parse_count(limit, DEFAULT_PAGE_SIZE)?;
        if limit == 0 {
            return Err(AuditQueryError::InvalidPaging("0".to_string()));
        }
        Ok(Self {
            offset,
            limit: limit.min(MAX_PAGE_SIZE),
        })
    }
}

fn parse_count(raw: &str, default: i64) -> Result<i64, AuditQueryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(AuditQueryError::InvalidPaging(raw.to_string())),
    }
}

/// Search criteria; `until` is exclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Build from form values. Dates are whole UTC days and the end day is
    /// included; empty values leave that side open.
    pub fn parse(user_id: &str, start: &str, end: &str) -> Result<Self, AuditQueryError> {
        let start = parse_day(start)?;
        let end = parse_day(end)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AuditQueryError::InvertedRange { start, end });
            }
        }

        let user_id = user_id.trim();
        Ok(Self {
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
            from: start.map(start_of_day),
            until: end.and_then(|d| d.checked_add_days(Days::new(1))).map(start_of_day),
        })
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.user_id.as_deref().map_or(true, |u| entry.user_id == u)
            && self.from.map_or(true, |from| entry.handled_at >= from)
            && self.until.map_or(true, |until| entry.handled_at < until)
    }
}

fn parse_day(raw: &str) -> Result<Option<NaiveDate>, AuditQueryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AuditQueryError::InvalidDate(raw.to_string()))
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Header plus one row per entry
pub fn export_rows(entries: &[AuditEntry]) -> Vec<Vec<String>> {
    std::iter::once(EXPORT_HEADER.iter().map(|h| h.to_string()).collect())
        .chain(entries.iter().map(|e| {
            vec![
                e.user_id.clone(),
                e.handled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.client_ip.clone(),
                e.method.clone(),
                e.url.clone(),
                e.status_code.to_string(),
            ]
        }))
        .collect()
}

pub struct AuditLogService {
    log: Arc<dyn AuditLog>,
    query_timeout: Duration,
}

impl AuditLogService {
    pub fn new(log: Arc<dyn AuditLog>, query_timeout: Duration) -> Self {
        Self { log, query_timeout }
    }

    pub async fn page(&self, domain_id: &str, paging: Paging) -> Result<(Vec<AuditEntry>, i64), AuditQueryError> {
        let page = with_deadline(self.query_timeout, self.log.page(domain_id, paging))
            .await
            .map_err(|e| {
                error!("Failed to page audit log of domain '{}': {}", domain_id, e);
                e
            })?;
        Ok(page)
    }

    pub async fn search(&self, domain_id: &str, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditQueryError> {
        let entries = with_deadline(self.query_timeout, self.log.search(domain_id, filter))
            .await
            .map_err(|e| {
                error!("Failed to search audit log of domain '{}': {}", domain_id, e);
                e
            })?;
        Ok(entries)
    }

    pub async fn export(&self, domain_id: &str) -> Result<Vec<Vec<String>>, AuditQueryError> {
        let entries = self.search(domain_id, &AuditFilter::default()).await?;
        Ok(export_rows(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAuditSink;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn entry(url: &str) -> AuditEntry {
        AuditEntry::new("bob", "D1", "127.0.0.1", "GET", url, 200)
    }

    async fn wait_for(sink: &RecordingAuditSink, n: usize) {
        for _ in 0..100 {
            if sink.entries().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn entries_reach_the_sink_in_order() {
        let sink = Arc::new(RecordingAuditSink::default());
        let service = AuditService::new(sink.clone(), 16, OverflowPolicy::DropNewest);

        assert!(service.log(entry("/a")).await);
        assert!(service.log(entry("/b")).await);
        wait_for(&sink, 2).await;

        let urls: Vec<String> = sink.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn full_queue_drops_newest() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingAuditSink::gated(gate.clone()));
        let service = AuditService::new(sink.clone(), 1, OverflowPolicy::DropNewest);

        // first entry is taken by the worker and parks on the gate
        assert!(service.log(entry("/first")).await);
        wait_for_pending(&sink).await;
        // second fills the single slot, third is dropped
        assert!(service.log(entry("/second")).await);
        assert!(!service.log(entry("/third")).await);

        gate.notify_one();
        gate.notify_one();
        wait_for(&sink, 2).await;
        let urls: Vec<String> = sink.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["/first", "/second"]);
    }

    async fn wait_for_pending(sink: &RecordingAuditSink) {
        for _ in 0..100 {
            if sink.pending() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let sink = Arc::new(RecordingAuditSink::failing_first());
        let service = AuditService::new(sink.clone(), 4, OverflowPolicy::Block);

        assert!(service.log(entry("/lost")).await);
        assert!(service.log(entry("/kept")).await);
        wait_for(&sink, 1).await;

        let urls: Vec<String> = sink.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["/kept"]);
    }

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(Paging::parse("", "").unwrap(), Paging { offset: 0, limit: DEFAULT_PAGE_SIZE });
        assert_eq!(Paging::parse(" 40 ", "10").unwrap(), Paging { offset: 40, limit: 10 });
        assert_eq!(Paging::parse("0", "100000").unwrap().limit, MAX_PAGE_SIZE);

        assert!(matches!(Paging::parse("-1", "10"), Err(AuditQueryError::InvalidPaging(_))));
        assert!(matches!(Paging::parse("0", "0"), Err(AuditQueryError::InvalidPaging(_))));
        assert!(matches!(Paging::parse("x", "10"), Err(AuditQueryError::InvalidPaging(_))));
    }

    #[test]
    fn filter_end_day_is_inclusive() {
        let filter = AuditFilter::parse(" bob ", "2024-03-01", "2024-03-02").unwrap();
        assert_eq!(filter.user_id.as_deref(), Some("bob"));

        let mut late = entry("/late");
        late.handled_at = "2024-03-02T23:59:59Z".parse().unwrap();
        let mut next_day = entry("/next");
        next_day.handled_at = "2024-03-03T00:00:00Z".parse().unwrap();
        assert!(filter.matches(&late));
        assert!(!filter.matches(&next_day));

        let open = AuditFilter::parse("", "", "").unwrap();
        assert_eq!(open, AuditFilter::default());
        assert!(open.matches(&next_day));
    }

    #[test]
    fn filter_rejects_bad_dates() {
        assert!(matches!(AuditFilter::parse("", "03/01/2024", ""), Err(AuditQueryError::InvalidDate(_))));
        assert!(matches!(
            AuditFilter::parse("", "2024-03-05", "2024-03-01"),
            Err(AuditQueryError::InvertedRange { .. })
        ));
    }

    #[tokio::test]
    async fn slow_log_read_is_a_timeout() {
        let sink = Arc::new(RecordingAuditSink::with_entries(vec![entry("/a")]).slow_reads(Duration::from_secs(2)));
        let service = AuditLogService::new(sink, Duration::from_millis(20));

        let err = service.page("D1", Paging { offset: 0, limit: 10 }).await.unwrap_err();
        assert!(matches!(err, AuditQueryError::Persistence(DatabaseError::Timeout(_))));
        assert_eq!(err.message_key("error_handle_logs_query_failed"), "error_query_timeout");
    }

    #[tokio::test]
    async fn export_starts_with_header_and_stays_in_domain() {
        let mut other = entry("/other");
        other.domain_id = "D2".to_string();
        let sink = Arc::new(RecordingAuditSink::with_entries(vec![entry("/a"), other]));
        let service = AuditLogService::new(sink, Duration::from_secs(1));

        let rows = service.export("D1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], EXPORT_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        assert_eq!(rows[1][4], "/a");
        assert_eq!(rows[1][5], "200");
    }
}
