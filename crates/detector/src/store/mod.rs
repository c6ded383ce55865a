//! 데이터 스토어 추상화 -- 문서 조회와 규칙별 체크포인트
//!
//! [`DataStore`] trait은 폴링 루프가 외부 스토어에 요구하는 세 가지 연산만
//! 정의합니다. 운영 환경은 [`ElasticClient`], 테스트는 인메모리 구현을 씁니다.
//!
//! ```text
//! ┌──────────┐
//! │ PollLoop │
//! └────┬─────┘
//!      ▼
//! ┌───────────┐
//! │ DataStore │ (trait)
//! └───────────┘
//!    │      │
//!    ▼      ▼
//! Elastic  Mock
//! ```

pub mod elastic;

pub use elastic::ElasticClient;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::DetectorError;
use crate::rule::ElasticRule;

/// 규칙별 재개 지점
///
/// `timestamp` 이상인 문서부터 다시 읽되, 그 시각에 이미 처리한 문서 ID는
/// `seen_ids`로 제외합니다. 같은 시각의 문서가 페이지 경계에 걸쳐도
/// 빠지거나 두 번 읽히지 않습니다.
///
/// 체크포인트가 없는 규칙은 [`Checkpoint::epoch`]부터 조회합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    seen_ids: Vec<String>,
}

impl Checkpoint {
    /// 유닉스 epoch (체크포인트 없음)
    pub fn epoch() -> Self {
        Self::from(DateTime::UNIX_EPOCH)
    }

    /// 현재 시각 (밀리초 단위로 절삭)
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// 이 시각에 이미 처리한 문서 ID를 붙입니다.
    pub fn with_seen_ids(mut self, ids: Vec<String>) -> Self {
        self.seen_ids = ids;
        self
    }

    /// 재개 시각
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 재개 시각에 이미 처리한 문서 ID
    pub fn seen_ids(&self) -> &[String] {
        &self.seen_ids
    }

    /// 스토어 쿼리용 RFC 3339 문자열 (밀리초, `Z`)
    pub fn to_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl From<DateTime<Utc>> for Checkpoint {
    /// 스토어의 날짜 정밀도에 맞춰 밀리초 아래는 버립니다.
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            timestamp: value.trunc_subsecs(3),
            seen_ids: Vec::new(),
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())?;
        if !self.seen_ids.is_empty() {
            write!(f, " (+{} seen)", self.seen_ids.len())?;
        }
        Ok(())
    }
}

/// 폴링 루프가 사용하는 데이터 스토어 연산
///
/// 타임아웃은 구현체의 책임입니다. 폴링 루프는 호출에 타임아웃을 걸지 않습니다.
pub trait DataStore: Send + Sync + 'static {
    /// 규칙의 마지막 체크포인트를 읽습니다. 없으면 `None`.
    fn last_timestamp(
        &self,
        rule: &ElasticRule,
    ) -> impl Future<Output = Result<Option<Checkpoint>, DetectorError>> + Send;

    /// `index`에서 `since` 이후의 `query` 매칭 문서를 시간순으로 가져옵니다.
    ///
    /// `since.timestamp()` 이상이면서 `since.seen_ids()`에 없는 문서만 돌려줍니다.
    fn matches_since(
        &self,
        index: &str,
        since: &Checkpoint,
        query: &serde_json::Value,
    ) -> impl Future<Output = Result<Vec<Document>, DetectorError>> + Send;

    /// 규칙의 체크포인트를 기록합니다.
    fn insert_timestamp(
        &self,
        rule: &ElasticRule,
        timestamp: Checkpoint,
    ) -> impl Future<Output = Result<(), DetectorError>> + Send;
}

impl<T: DataStore> DataStore for Arc<T> {
    fn last_timestamp(
        &self,
        rule: &ElasticRule,
    ) -> impl Future<Output = Result<Option<Checkpoint>, DetectorError>> + Send {
        (**self).last_timestamp(rule)
    }

    fn matches_since(
        &self,
        index: &str,
        since: &Checkpoint,
        query: &serde_json::Value,
    ) -> impl Future<Output = Result<Vec<Document>, DetectorError>> + Send {
        (**self).matches_since(index, since, query)
    }

    fn insert_timestamp(
        &self,
        rule: &ElasticRule,
        timestamp: Checkpoint,
    ) -> impl Future<Output = Result<(), DetectorError>> + Send {
        (**self).insert_timestamp(rule, timestamp)
    }
}
