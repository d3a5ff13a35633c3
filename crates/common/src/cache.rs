// crates/common/src/cache.rs
//! Keyed store of job results with cursor-paginated reports.
//!
//! Entries are grouped per cache kind. Each kind keeps its rows in a
//! `BTreeMap` keyed by a global insertion sequence, which is the pagination
//! order: a row keeps its sequence when it is overwritten, so a scan never
//! sees the same key twice and never skips a key that existed before it began.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{read_lock, write_lock, CacheError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Success,
    Error,
}

/// The result of a job, stored under `(kind, dataset, config, split)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: String,
    pub dataset: String,
    pub config: Option<String>,
    pub split: Option<String>,
    pub status: CacheStatus,
    pub http_status: u16,
    pub error_code: Option<String>,
    pub content: Value,
    pub details: Option<Value>,
    pub job_runner_version: Option<u32>,
    pub dataset_git_revision: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn success(kind: impl Into<String>, dataset: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            dataset: dataset.into(),
            config: None,
            split: None,
            status: CacheStatus::Success,
            http_status: 200,
            error_code: None,
            content,
            details: None,
            job_runner_version: None,
            dataset_git_revision: None,
            completed_at: Utc::now(),
        }
    }

    /// An error result. The content carries the message under `error`.
    pub fn error(
        kind: impl Into<String>,
        dataset: impl Into<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
        http_status: u16,
    ) -> Self {
        Self {
            status: CacheStatus::Error,
            http_status,
            error_code: Some(error_code.into()),
            content: json!({ "error": message.into() }),
            ..Self::success(kind, dataset, Value::Null)
        }
    }

    pub fn with_scope(mut self, config: Option<String>, split: Option<String>) -> Self {
        self.config = config;
        self.split = split;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_job_runner_version(mut self, version: u32) -> Self {
        self.job_runner_version = Some(version);
        self
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.dataset_git_revision = revision;
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }

    pub fn to_report(&self) -> CacheReport {
        CacheReport {
            kind: self.kind.clone(),
            dataset: self.dataset.clone(),
            config: self.config.clone(),
            split: self.split.clone(),
            status: self.status,
            http_status: self.http_status,
            error_code: self.error_code.clone(),
            details: self.details.clone(),
            job_runner_version: self.job_runner_version,
            dataset_git_revision: self.dataset_git_revision.clone(),
            updated_at: self.completed_at,
        }
    }

    pub fn to_report_with_content(&self) -> CacheReportWithContent {
        CacheReportWithContent {
            report: self.to_report(),
            content: self.content.clone(),
        }
    }
}

/// Metadata of one cache entry, without its content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub kind: String,
    pub dataset: String,
    pub config: Option<String>,
    pub split: Option<String>,
    pub status: CacheStatus,
    pub http_status: u16,
    pub error_code: Option<String>,
    pub details: Option<Value>,
    pub job_runner_version: Option<u32>,
    pub dataset_git_revision: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReportWithContent {
    #[serde(flatten)]
    pub report: CacheReport,
    pub content: Value,
}

/// One page of a report listing. An empty `next_cursor` means the scan is done.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReportsPage<T> {
    pub reports: Vec<T>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored entry completed later; the write was dropped.
    Stale,
}

type EntryKey = (String, Option<String>, Option<String>);

#[derive(Debug, Default)]
struct KindCache {
    rows: BTreeMap<u64, CacheEntry>,
    index: HashMap<EntryKey, u64>,
}

impl KindCache {
    fn page<T>(&self, after: Option<u64>, page_size: usize, view: impl Fn(&CacheEntry) -> T) -> CacheReportsPage<T> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let mut rows = self.rows.range((lower, Bound::Unbounded));
        let mut reports = Vec::with_capacity(page_size);
        let mut last = None;
        for (seq, entry) in rows.by_ref().take(page_size) {
            reports.push(view(entry));
            last = Some(*seq);
        }
        let next_cursor = match (last, rows.next()) {
            (Some(seq), Some(_)) => encode_cursor(seq),
            _ => String::new(),
        };
        CacheReportsPage {
            reports,
            next_cursor,
        }
    }
}

#[derive(Default)]
pub struct CacheStore {
    kinds: DashMap<String, Arc<RwLock<KindCache>>>,
    sequence: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for its key.
    ///
    /// An existing entry is only replaced by one with a strictly later
    /// `completed_at`, so a delayed write from an older run never clobbers
    /// a newer result.
    pub fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, CacheError> {
        let handle = self.kind_or_insert(&entry.kind);
        let mut cache = write_lock(&handle)?;
        let key = (entry.dataset.clone(), entry.config.clone(), entry.split.clone());

        if let Some(&seq) = cache.index.get(&key) {
            let Some(current) = cache.rows.get_mut(&seq) else {
                return Ok(UpsertOutcome::Stale);
            };
            if entry.completed_at <= current.completed_at {
                tracing::debug!(
                    kind = %entry.kind,
                    dataset = %entry.dataset,
                    "Ignoring cache write older than the stored entry"
                );
                return Ok(UpsertOutcome::Stale);
            }
            *current = entry;
            return Ok(UpsertOutcome::Updated);
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        cache.index.insert(key, seq);
        cache.rows.insert(seq, entry);
        Ok(UpsertOutcome::Inserted)
    }

    pub fn get(
        &self,
        kind: &str,
        dataset: &str,
        config: Option<&str>,
        split: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let Some(cache) = self.kind(kind) else {
            return Ok(None);
        };
        let cache = read_lock(&cache)?;
        let key = (
            dataset.to_string(),
            config.map(str::to_string),
            split.map(str::to_string),
        );
        Ok(cache
            .index
            .get(&key)
            .and_then(|seq| cache.rows.get(seq))
            .cloned())
    }

    /// A page of entry metadata for `kind`, resuming after `cursor`.
    ///
    /// `None` or an empty cursor starts from the beginning. A kind with no
    /// entries yields an empty page.
    pub fn list_reports(
        &self,
        kind: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CacheReportsPage<CacheReport>, CacheError> {
        self.list(kind, cursor, page_size, CacheEntry::to_report)
    }

    /// Like [`CacheStore::list_reports`], with each entry's content.
    pub fn list_reports_with_content(
        &self,
        kind: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CacheReportsPage<CacheReportWithContent>, CacheError> {
        self.list(kind, cursor, page_size, CacheEntry::to_report_with_content)
    }

    /// Every entry of `kind` for one dataset, in insertion order.
    pub fn dataset_entries(&self, kind: &str, dataset: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let Some(cache) = self.kind(kind) else {
            return Ok(Vec::new());
        };
        let cache = read_lock(&cache)?;
        Ok(cache
            .rows
            .values()
            .filter(|entry| entry.dataset == dataset)
            .cloned()
            .collect())
    }

    /// Remove every entry of a dataset across all kinds. Returns the number removed.
    pub fn delete_dataset(&self, dataset: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for kind in self.kind_handles() {
            let mut cache = write_lock(&kind)?;
            let KindCache { rows, index } = &mut *cache;
            index.retain(|(d, _, _), seq| {
                if d == dataset {
                    rows.remove(&*seq);
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        if removed > 0 {
            tracing::info!(dataset, removed, "Deleted cached responses");
        }
        Ok(removed)
    }

    fn list<T>(
        &self,
        kind: &str,
        cursor: Option<&str>,
        page_size: usize,
        view: impl Fn(&CacheEntry) -> T,
    ) -> Result<CacheReportsPage<T>, CacheError> {
        let after = match cursor {
            None | Some("") => None,
            Some(cursor) => Some(decode_cursor(cursor)?),
        };
        let Some(cache) = self.kind(kind) else {
            return Ok(CacheReportsPage {
                reports: Vec::new(),
                next_cursor: String::new(),
            });
        };
        let cache = read_lock(&cache)?;
        Ok(cache.page(after, page_size.max(1), view))
    }

    // The Arc is cloned out so the DashMap shard lock is never held across
    // the per-kind RwLock.
    fn kind(&self, kind: &str) -> Option<Arc<RwLock<KindCache>>> {
        self.kinds.get(kind).map(|entry| Arc::clone(entry.value()))
    }

    fn kind_or_insert(&self, kind: &str) -> Arc<RwLock<KindCache>> {
        if let Some(existing) = self.kind(kind) {
            return existing;
        }
        Arc::clone(self.kinds.entry(kind.to_string()).or_default().value())
    }

    fn kind_handles(&self) -> Vec<Arc<RwLock<KindCache>>> {
        self.kinds.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

fn encode_cursor(seq: u64) -> String {
    URL_SAFE_NO_PAD.encode(seq.to_be_bytes())
}

fn decode_cursor(cursor: &str) -> Result<u64, CacheError> {
    let invalid = || CacheError::InvalidCursor(cursor.to_string());
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| invalid())?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn entry(dataset: &str) -> CacheEntry {
        CacheEntry::success("dataset-config-names", dataset, json!({ "config_names": [] }))
    }

    #[test]
    fn test_upsert_and_get() {
        let store = CacheStore::new();
        let e = entry("ds").with_job_runner_version(1);
        assert_eq!(store.upsert(e.clone()).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(
            store.get("dataset-config-names", "ds", None, None).unwrap(),
            Some(e)
        );
        assert_eq!(store.get("dataset-config-names", "other", None, None).unwrap(), None);
        assert_eq!(store.get("unknown-kind", "ds", None, None).unwrap(), None);
    }

    #[test]
    fn test_scope_is_part_of_the_key() {
        let store = CacheStore::new();
        let config = |c: &str| {
            CacheEntry::success("config-size", "ds", json!({})).with_scope(Some(c.into()), None)
        };
        store.upsert(config("a")).unwrap();
        store.upsert(config("b")).unwrap();
        assert!(store.get("config-size", "ds", Some("a"), None).unwrap().is_some());
        assert!(store.get("config-size", "ds", None, None).unwrap().is_none());
        assert_eq!(store.dataset_entries("config-size", "ds").unwrap().len(), 2);
    }

    #[test]
    fn test_later_completion_wins_in_either_order() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);
        let older = entry("ds").completed_at(t1).with_job_runner_version(1);
        let newer = entry("ds").completed_at(t2).with_job_runner_version(2);

        let store = CacheStore::new();
        assert_eq!(store.upsert(older.clone()).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(newer.clone()).unwrap(), UpsertOutcome::Updated);
        assert_eq!(
            store.get("dataset-config-names", "ds", None, None).unwrap(),
            Some(newer.clone())
        );

        let store = CacheStore::new();
        store.upsert(newer.clone()).unwrap();
        assert_eq!(store.upsert(older).unwrap(), UpsertOutcome::Stale);
        assert_eq!(
            store.get("dataset-config-names", "ds", None, None).unwrap(),
            Some(newer)
        );
    }

    #[test]
    fn test_error_entry() {
        let e = CacheEntry::error("config-size", "ds", "UnexpectedError", "boom", 500);
        assert_eq!(e.status, CacheStatus::Error);
        assert_eq!(e.http_status, 500);
        assert_eq!(e.error_code.as_deref(), Some("UnexpectedError"));
        assert_eq!(e.content, json!({ "error": "boom" }));
    }

    #[test]
    fn test_pagination_visits_every_entry_once() {
        let store = CacheStore::new();
        for i in 0..7 {
            store.upsert(entry(&format!("ds-{i}"))).unwrap();
        }
        // other kinds do not leak into the listing
        store
            .upsert(CacheEntry::success("config-size", "ds-x", json!({})))
            .unwrap();

        let mut seen = Vec::new();
        let mut cursor = String::new();
        let mut pages = 0;
        loop {
            let page = store
                .list_reports("dataset-config-names", Some(&cursor), 3)
                .unwrap();
            pages += 1;
            seen.extend(page.reports.into_iter().map(|r| r.dataset));
            if page.next_cursor.is_empty() {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(pages, 3);
        assert_eq!(
            seen,
            (0..7).map(|i| format!("ds-{i}")).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_exact_page_has_no_next_cursor() {
        let store = CacheStore::new();
        for i in 0..3 {
            store.upsert(entry(&format!("ds-{i}"))).unwrap();
        }
        let page = store.list_reports("dataset-config-names", None, 3).unwrap();
        assert_eq!(page.reports.len(), 3);
        assert_eq!(page.next_cursor, "");
    }

    #[test]
    fn test_overwrite_keeps_position_during_scan() {
        let store = CacheStore::new();
        for i in 0..4 {
            store.upsert(entry(&format!("ds-{i}"))).unwrap();
        }
        let first = store.list_reports("dataset-config-names", None, 2).unwrap();
        store
            .upsert(entry("ds-0").completed_at(Utc::now() + Duration::seconds(10)))
            .unwrap();
        store.upsert(entry("ds-new")).unwrap();
        let second = store
            .list_reports("dataset-config-names", Some(&first.next_cursor), 10)
            .unwrap();
        let datasets: Vec<_> = second.reports.iter().map(|r| r.dataset.as_str()).collect();
        assert_eq!(datasets, vec!["ds-2", "ds-3", "ds-new"]);
    }

    #[test]
    fn test_none_and_empty_cursor_both_start_from_beginning() {
        let store = CacheStore::new();
        store.upsert(entry("ds")).unwrap();
        let a = store.list_reports("dataset-config-names", None, 10).unwrap();
        let b = store.list_reports("dataset-config-names", Some(""), 10).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.reports.len(), 1);
    }

    #[test]
    fn test_unknown_kind_is_an_empty_page() {
        let page = CacheStore::new().list_reports("nothing", None, 10).unwrap();
        assert!(page.reports.is_empty());
        assert_eq!(page.next_cursor, "");
    }

    #[test]
    fn test_invalid_cursor() {
        let store = CacheStore::new();
        for cursor in ["not base64!", "AAAA"] {
            let err = store
                .list_reports("dataset-config-names", Some(cursor), 10)
                .unwrap_err();
            assert_eq!(err, CacheError::InvalidCursor(cursor.to_string()));
        }
    }

    #[test]
    fn test_reports_with_content_flatten() {
        let store = CacheStore::new();
        store
            .upsert(entry("ds").with_revision(Some("abc".into())))
            .unwrap();
        let page = store
            .list_reports_with_content("dataset-config-names", None, 10)
            .unwrap();
        let json = serde_json::to_value(&page.reports[0]).unwrap();
        assert_eq!(json["dataset"], "ds");
        assert_eq!(json["status"], "success");
        assert_eq!(json["dataset_git_revision"], "abc");
        assert_eq!(json["content"], json!({ "config_names": [] }));
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let store = CacheStore::new();
        store.upsert(entry("a")).unwrap();
        store.upsert(entry("b")).unwrap();
        let page = store.list_reports("dataset-config-names", None, 0).unwrap();
        assert_eq!(page.reports.len(), 1);
        assert!(!page.next_cursor.is_empty());
    }

    #[test]
    fn test_delete_dataset() {
        let store = CacheStore::new();
        store.upsert(entry("ds")).unwrap();
        store.upsert(entry("keep")).unwrap();
        store
            .upsert(CacheEntry::success("config-size", "ds", json!({})).with_scope(Some("c".into()), None))
            .unwrap();

        assert_eq!(store.delete_dataset("ds").unwrap(), 2);
        assert!(store.get("dataset-config-names", "ds", None, None).unwrap().is_none());
        assert!(store.get("dataset-config-names", "keep", None, None).unwrap().is_some());
        assert_eq!(store.delete_dataset("ds").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_upserts_keep_latest() {
        let store = Arc::new(CacheStore::new());
        let base = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let e = entry("ds")
                        .completed_at(base + Duration::seconds(i))
                        .with_job_runner_version(i as u32);
                    store.upsert(e).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stored = store.get("dataset-config-names", "ds", None, None).unwrap().unwrap();
        assert_eq!(stored.job_runner_version, Some(7));
        assert_eq!(
            store.list_reports("dataset-config-names", None, 100).unwrap().reports.len(),
            1
        );
    }
}
