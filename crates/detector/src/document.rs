//! 매칭 문서 -- 데이터 스토어가 돌려준 반구조화 문서의 읽기 전용 뷰
//!
//! 필드는 이름으로 먼저 찾고, 없으면 점(`.`) 경로로 중첩 객체와
//! 배열 인덱스를 따라 내려갑니다. 조회 실패는 에러가 아니라 `None`입니다.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;

/// 진단 메시지에 싣는 문서 본문의 최대 길이
const DISPLAY_MAX_LEN: usize = 256;

/// 검색 결과 문서 하나
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: Option<String>,
    source: Value,
    sorted_at: Option<DateTime<Utc>>,
}

impl Document {
    /// 문서 본문으로 문서를 만듭니다.
    pub fn new(source: Value) -> Self {
        Self {
            id: None,
            source,
            sorted_at: None,
        }
    }

    /// 스토어 문서 ID와 함께 문서를 만듭니다.
    pub fn with_id(id: impl Into<String>, source: Value) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(source)
        }
    }

    /// 스토어가 정렬에 쓴 시각을 붙입니다.
    pub fn sorted_at(mut self, at: DateTime<Utc>) -> Self {
        self.sorted_at = Some(at.trunc_subsecs(3));
        self
    }

    /// 스토어 문서 ID
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 이 문서 다음부터 읽기 위한 시각
    ///
    /// 스토어가 준 정렬 시각을 우선 쓰고, 없으면 본문의 `timestamp_field`를
    /// RFC 3339 문자열이나 epoch 밀리초 정수로 읽습니다.
    pub fn resume_instant(&self, timestamp_field: &str) -> Option<DateTime<Utc>> {
        if let Some(at) = self.sorted_at {
            return Some(at);
        }
        let at = match self.lookup(timestamp_field)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()?
                .with_timezone(&Utc),
            Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?)?,
            _ => return None,
        };
        Some(at.trunc_subsecs(3))
    }

    /// 필드 값을 찾습니다.
    ///
    /// 1. 최상위 키가 `path`와 정확히 같으면 그 값
    /// 2. 아니면 `.`으로 나눈 경로를 따라 객체 키/배열 인덱스로 탐색
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.source.get(path) {
            return Some(value);
        }
        if !path.contains('.') {
            return None;
        }

        path.split('.').try_fold(&self.source, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

impl From<Value> for Document {
    fn from(source: Value) -> Self {
        Self::new(source)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.id {
            return write!(f, "doc:{id}");
        }
        let body = self.source.to_string();
        if body.len() <= DISPLAY_MAX_LEN {
            f.write_str(&body)
        } else {
            let mut end = DISPLAY_MAX_LEN;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            write!(f, "{}...", &body[..end])
        }
    }
}

/// JSON 값을 이벤트 필드용 문자열로 바꿉니다.
///
/// 문자열은 그대로, 숫자/불리언은 텍스트로, `null`은 빈 문자열로,
/// 배열/객체는 한 줄 JSON으로 변환합니다.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn text(doc: &Document, path: &str) -> Option<String> {
        doc.lookup(path).map(value_to_string)
    }

    fn sample() -> Document {
        Document::new(json!({
            "source": {"ip": "10.0.0.5", "port": 22},
            "user.name": "root",
            "tags": ["ssh", "auth"],
            "event": {"outcome": null, "success": false},
            "hosts": [{"name": "web-1"}, {"name": "web-2"}]
        }))
    }

    #[test]
    fn exact_key_wins_over_path() {
        let doc = sample();
        assert_eq!(text(&doc, "user.name").as_deref(), Some("root"));
    }

    #[test]
    fn dot_path_descends_objects() {
        let doc = sample();
        assert_eq!(text(&doc, "source.ip").as_deref(), Some("10.0.0.5"));
        assert_eq!(text(&doc, "source.port").as_deref(), Some("22"));
    }

    #[test]
    fn dot_path_indexes_arrays() {
        let doc = sample();
        assert_eq!(text(&doc, "tags.1").as_deref(), Some("auth"));
        assert_eq!(text(&doc, "hosts.0.name").as_deref(), Some("web-1"));
        assert!(doc.lookup("tags.9").is_none());
        assert!(doc.lookup("tags.x").is_none());
    }

    #[test]
    fn missing_path_is_none() {
        let doc = sample();
        assert!(doc.lookup("destination.ip").is_none());
        assert!(doc.lookup("source.ip.octet").is_none());
        assert!(doc.lookup("nothing").is_none());
    }

    #[test]
    fn coercion_rules() {
        let doc = sample();
        assert_eq!(text(&doc, "event.outcome").as_deref(), Some(""));
        assert_eq!(text(&doc, "event.success").as_deref(), Some("false"));
        assert_eq!(
            text(&doc, "tags").as_deref(),
            Some(r#"["ssh","auth"]"#)
        );
        assert_eq!(
            text(&doc, "source").as_deref(),
            Some(r#"{"ip":"10.0.0.5","port":22}"#)
        );
    }

    #[test]
    fn non_object_document_has_no_fields() {
        let doc = Document::from(json!("plain"));
        assert!(doc.lookup("a").is_none());
        assert!(doc.lookup("a.b").is_none());
    }

    #[test]
    fn display_prefers_id_and_truncates_body() {
        let doc = Document::with_id("abc123", json!({}));
        assert_eq!(doc.to_string(), "doc:abc123");

        let long = Document::new(json!({"msg": "x".repeat(1000)}));
        let shown = long.to_string();
        assert!(shown.ends_with("..."));
        assert!(shown.len() <= DISPLAY_MAX_LEN + 3);
    }

    #[test]
    fn resume_instant_prefers_store_sort_value() {
        let sorted = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let doc = Document::with_id("a", json!({"@timestamp": "garbage"})).sorted_at(sorted);
        assert_eq!(doc.resume_instant("@timestamp"), Some(sorted));
    }

    #[test]
    fn resume_instant_reads_rfc3339_or_epoch_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let text_ts = Document::new(json!({"@timestamp": "2024-05-01T12:00:00+02:00"}));
        let millis_ts = Document::new(json!({"event": {"created": 1_714_557_600_000_i64}}));
        assert_eq!(text_ts.resume_instant("@timestamp"), Some(expected));
        assert_eq!(millis_ts.resume_instant("event.created"), Some(expected));
    }

    #[test]
    fn resume_instant_is_none_without_usable_timestamp() {
        assert!(sample().resume_instant("@timestamp").is_none());
        let doc = Document::new(json!({"@timestamp": "yesterday"}));
        assert!(doc.resume_instant("@timestamp").is_none());
        let doc = Document::new(json!({"@timestamp": true}));
        assert!(doc.resume_instant("@timestamp").is_none());
    }
}
