//! Elasticsearch REST 클라이언트
//!
//! 연결 설정(URL, 인증서 검증, basic auth, 타임아웃)은 생성 시 한 번 적용되며,
//! 생성 실패는 재시도하지 않는 [`DetectorError::StartupFatal`]입니다.
//!
//! # 요청 형태
//! - 체크포인트 읽기: `GET {url}/{store_index}/_doc/{plugin}-{rule}` (404 -> 없음)
//! - 문서 조회: `POST {url}/{data_index}/_search`
//!   (`timestamp_field >= since`, 이미 본 ID 제외, 시각 오름차순)
//! - 체크포인트 쓰기: `PUT {url}/{store_index}/_doc/{plugin}-{rule}`

use chrono::DateTime;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::DetectorConfig;
use crate::document::Document;
use crate::error::DetectorError;
use crate::rule::ElasticRule;

use super::{Checkpoint, DataStore};

/// 에러 메시지에 싣는 응답 본문의 최대 길이
const MAX_ERROR_BODY_LEN: usize = 512;

/// 체크포인트 문서
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    plugin: String,
    rule: String,
    plugin_sid: String,
    #[serde(flatten)]
    checkpoint: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<CheckpointRecord>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
    /// 정렬 키 값. 날짜 필드는 epoch 밀리초로 옵니다.
    #[serde(default)]
    sort: Vec<Value>,
}

impl SearchHit {
    fn into_document(self) -> Document {
        let sorted_at = self
            .sort
            .first()
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis);
        let document = match self.id {
            Some(id) => Document::with_id(id, self.source),
            None => Document::new(self.source),
        };
        match sorted_at {
            Some(at) => document.sorted_at(at),
            None => document,
        }
    }
}

/// Elasticsearch 데이터 스토어
#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: Url,
    store_index: String,
    plugin: String,
    credentials: Option<(String, String)>,
    max_documents: usize,
    timestamp_field: String,
}

impl ElasticClient {
    /// 설정으로 클라이언트를 생성합니다.
    ///
    /// # Errors
    /// URL이 http/https가 아니거나 HTTP 클라이언트를 만들 수 없으면
    /// `StartupFatal`을 반환합니다.
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let base_url = Url::parse(&config.elastic_url).map_err(|e| {
            DetectorError::StartupFatal(format!("invalid elastic_url '{}': {e}", config.elastic_url))
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(DetectorError::StartupFatal(format!(
                "elastic_url '{}' must be an http or https URL",
                config.elastic_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_certs)
            .build()
            .map_err(|e| DetectorError::StartupFatal(format!("failed to build http client: {e}")))?;

        if !config.verify_certs {
            tracing::warn!(url = %base_url, "TLS certificate verification disabled");
        }

        Ok(Self {
            client,
            base_url,
            store_index: config.store_index.clone(),
            plugin: config.name.clone(),
            credentials: config.credentials.clone(),
            max_documents: config.max_documents,
            timestamp_field: config.timestamp_field.clone(),
        })
    }

    /// 규칙의 체크포인트 문서 ID (`{plugin}-{rule}`)
    pub fn checkpoint_id(&self, rule: &ElasticRule) -> String {
        format!("{}-{}", self.plugin, rule.name())
    }

    /// 검색 요청 본문을 만듭니다.
    ///
    /// `numeric_type: date`는 `date_nanos` 필드도 밀리초 정렬 값으로 맞춥니다.
    pub fn search_body(&self, since: &Checkpoint, query: &Value) -> Value {
        let ts = self.timestamp_field.as_str();
        let mut bool_query = json!({
            "bool": {
                "must": [query],
                "filter": [{ "range": { ts: { "gte": since.to_rfc3339() } } }]
            }
        });
        if !since.seen_ids().is_empty() {
            bool_query["bool"]["must_not"] = json!([{ "ids": { "values": since.seen_ids() } }]);
        }
        json!({
            "size": self.max_documents,
            "sort": [{ ts: { "order": "asc", "numeric_type": "date" } }],
            "query": bool_query
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| format!("'{}' cannot be a base URL", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn checkpoint_url(&self, rule: &ElasticRule) -> Result<Url, DetectorError> {
        let id = self.checkpoint_id(rule);
        self.endpoint(&[self.store_index.as_str(), "_doc", id.as_str()])
            .map_err(|reason| checkpoint_err(rule, reason))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }
}

impl DataStore for ElasticClient {
    async fn last_timestamp(&self, rule: &ElasticRule) -> Result<Option<Checkpoint>, DetectorError> {
        let url = self.checkpoint_url(rule)?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| checkpoint_err(rule, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response)
            .await
            .map_err(|reason| checkpoint_err(rule, reason))?;
        let body: GetResponse = response
            .json()
            .await
            .map_err(|e| checkpoint_err(rule, format!("invalid response: {e}")))?;

        Ok(body
            .source
            .filter(|_| body.found)
            .map(|record| record.checkpoint))
    }

    async fn matches_since(
        &self,
        index: &str,
        since: &Checkpoint,
        query: &Value,
    ) -> Result<Vec<Document>, DetectorError> {
        let fetch_err = |reason: String| DetectorError::Fetch {
            index: index.to_owned(),
            reason,
        };

        let url = self.endpoint(&[index, "_search"]).map_err(fetch_err)?;
        let body = self.search_body(since, query);

        tracing::debug!(index, since = %since, "searching for new documents");

        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let response = ensure_success(response).await.map_err(fetch_err)?;
        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| fetch_err(format!("invalid response: {e}")))?;

        Ok(result
            .hits
            .hits
            .into_iter()
            .map(SearchHit::into_document)
            .collect())
    }

    async fn insert_timestamp(
        &self,
        rule: &ElasticRule,
        timestamp: Checkpoint,
    ) -> Result<(), DetectorError> {
        let url = self.checkpoint_url(rule)?;
        let record = CheckpointRecord {
            plugin: self.plugin.clone(),
            rule: rule.name().to_owned(),
            plugin_sid: rule.plugin_sid().to_owned(),
            checkpoint: timestamp,
        };

        let response = self
            .authorized(self.client.put(url))
            .json(&record)
            .send()
            .await
            .map_err(|e| checkpoint_err(rule, e))?;
        ensure_success(response)
            .await
            .map_err(|reason| checkpoint_err(rule, reason))?;

        tracing::debug!(rule = %rule.name(), checkpoint = %record.checkpoint, "checkpoint stored");
        Ok(())
    }
}

/// 2xx가 아닌 응답을 상태 코드와 본문 일부로 바꿉니다.
async fn ensure_success(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_owned());
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(format!("HTTP {status}: {body}"))
}

fn checkpoint_err(rule: &ElasticRule, reason: impl ToString) -> DetectorError {
    DetectorError::Checkpoint {
        rule: rule.name().to_owned(),
        reason: reason.to_string(),
    }
}
