//! 통합 테스트 공용 헬퍼 -- 인메모리 데이터 스토어와 규칙 팩토리
//!
//! - [`MockStore`]: 준비한 응답을 순서대로 돌려주는 스토어 (호출 기록용)
//! - [`IndexedStore`]: 시각 범위, 제외 ID, 정렬, 페이지 크기를 실제로 적용하는 스토어

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use esguard_detector::{Checkpoint, DataStore, DetectorError, Document, ElasticRule};

/// 스토어 호출 기록
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LastTimestamp(String),
    MatchesSince { index: String, since: Checkpoint },
    InsertTimestamp { rule: String, timestamp: Checkpoint },
}

/// 인메모리 데이터 스토어
///
/// 인덱스별로 준비한 응답을 차례대로 돌려주고, 준비한 응답이 없으면 빈 결과를 줍니다.
#[derive(Default)]
pub struct MockStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    batches: Mutex<HashMap<String, VecDeque<Result<Vec<Document>, String>>>>,
    failing_checkpoint_writes: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `index` 조회에 돌려줄 문서 묶음을 추가합니다.
    pub fn push_batch(&self, index: &str, documents: Vec<Document>) {
        self.batches
            .lock()
            .unwrap()
            .entry(index.to_owned())
            .or_default()
            .push_back(Ok(documents));
    }

    /// `index` 조회가 한 번 실패하도록 합니다.
    pub fn push_failure(&self, index: &str, reason: &str) {
        self.batches
            .lock()
            .unwrap()
            .entry(index.to_owned())
            .or_default()
            .push_back(Err(reason.to_owned()));
    }

    /// 규칙의 체크포인트 쓰기가 실패하도록 합니다.
    pub fn fail_checkpoint_writes(&self, rule: &str) {
        self.failing_checkpoint_writes
            .lock()
            .unwrap()
            .push(rule.to_owned());
    }

    pub fn set_checkpoint(&self, rule: &str, checkpoint: Checkpoint) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(rule.to_owned(), checkpoint);
    }

    pub fn checkpoint(&self, rule: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().unwrap().get(rule).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inserts_for(&self, rule: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::InsertTimestamp { rule: r, .. } if r == rule))
            .count()
    }
}

impl DataStore for MockStore {
    async fn last_timestamp(&self, rule: &ElasticRule) -> Result<Option<Checkpoint>, DetectorError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::LastTimestamp(rule.name().to_owned()));
        Ok(self.checkpoint(rule.name()))
    }

    async fn matches_since(
        &self,
        index: &str,
        since: &Checkpoint,
        _query: &serde_json::Value,
    ) -> Result<Vec<Document>, DetectorError> {
        self.calls.lock().unwrap().push(Call::MatchesSince {
            index: index.to_owned(),
            since: since.clone(),
        });
        let next = self
            .batches
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(documents)) => Ok(documents),
            Some(Err(reason)) => Err(DetectorError::Fetch {
                index: index.to_owned(),
                reason,
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn insert_timestamp(
        &self,
        rule: &ElasticRule,
        timestamp: Checkpoint,
    ) -> Result<(), DetectorError> {
        self.calls.lock().unwrap().push(Call::InsertTimestamp {
            rule: rule.name().to_owned(),
            timestamp: timestamp.clone(),
        });
        if self
            .failing_checkpoint_writes
            .lock()
            .unwrap()
            .iter()
            .any(|r| r == rule.name())
        {
            return Err(DetectorError::Checkpoint {
                rule: rule.name().to_owned(),
                reason: "HTTP 503 Service Unavailable".to_owned(),
            });
        }
        self.set_checkpoint(rule.name(), timestamp);
        Ok(())
    }
}

/// 색인된 문서
struct Indexed {
    id: String,
    at: DateTime<Utc>,
    source: serde_json::Value,
}

/// 조회 조건을 실제로 적용하는 인메모리 스토어
///
/// `at >= since.timestamp()`이고 `since.seen_ids()`에 없는 문서를 `at` 오름차순
/// (같은 시각은 색인 순서)으로 최대 `page_size`개 돌려줍니다.
pub struct IndexedStore {
    page_size: usize,
    with_sort_values: bool,
    documents: Mutex<HashMap<String, Vec<Indexed>>>,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl IndexedStore {
    /// 정렬 값을 함께 돌려주는 스토어
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            with_sort_values: true,
            documents: Mutex::default(),
            checkpoints: Mutex::default(),
        }
    }

    /// 정렬 값 없이 본문만 돌려주는 스토어
    pub fn without_sort_values(page_size: usize) -> Self {
        Self {
            with_sort_values: false,
            ..Self::new(page_size)
        }
    }

    /// 문서를 색인합니다. 정렬과 범위 조건은 `at`을 기준으로 합니다.
    pub fn index(&self, index: &str, id: &str, at: DateTime<Utc>, source: serde_json::Value) {
        self.documents
            .lock()
            .unwrap()
            .entry(index.to_owned())
            .or_default()
            .push(Indexed {
                id: id.to_owned(),
                at,
                source,
            });
    }

    pub fn checkpoint(&self, rule: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().unwrap().get(rule).cloned()
    }
}

impl DataStore for IndexedStore {
    async fn last_timestamp(&self, rule: &ElasticRule) -> Result<Option<Checkpoint>, DetectorError> {
        Ok(self.checkpoint(rule.name()))
    }

    async fn matches_since(
        &self,
        index: &str,
        since: &Checkpoint,
        _query: &serde_json::Value,
    ) -> Result<Vec<Document>, DetectorError> {
        let documents = self.documents.lock().unwrap();
        let mut hits: Vec<&Indexed> = documents
            .get(index)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.at >= since.timestamp())
                    .filter(|d| !since.seen_ids().contains(&d.id))
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by_key(|d| d.at);
        hits.truncate(self.page_size);

        Ok(hits
            .into_iter()
            .map(|d| {
                let doc = Document::with_id(d.id.clone(), d.source.clone());
                if self.with_sort_values {
                    doc.sorted_at(d.at)
                } else {
                    doc
                }
            })
            .collect())
    }

    async fn insert_timestamp(
        &self,
        rule: &ElasticRule,
        timestamp: Checkpoint,
    ) -> Result<(), DetectorError> {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(rule.name().to_owned(), timestamp);
        Ok(())
    }
}

/// `{index}`를 조회하고 `source.ip`, `user.name`을 추출하는 규칙
pub fn rule(name: &str, index: &str) -> ElasticRule {
    ElasticRule::parse(
        name,
        [
            ("query", r#"{"match": {"event.action": "login_failed"}}"#.to_owned()),
            ("fields", "source.ip,user.name".to_owned()),
            ("plugin_sid", "1001".to_owned()),
            ("data_index", index.to_owned()),
            ("src_ip", "{0}".to_owned()),
            ("username", "{1}".to_owned()),
            ("userdata1", "{0}:{1}".to_owned()),
        ],
    )
    .unwrap()
}

/// 로그인 실패 문서
pub fn login_doc(ip: &str, user: &str) -> Document {
    Document::new(serde_json::json!({
        "@timestamp": "2024-05-01T10:00:00Z",
        "source": {"ip": ip},
        "user": {"name": user},
    }))
}
