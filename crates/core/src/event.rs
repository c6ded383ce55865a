//! 이벤트 시스템 — 탐지기와 하위 싱크 사이의 전달 단위
//!
//! [`SecurityEvent`]는 탐지 규칙이 문서 하나로부터 합성한 정규화 이벤트이며,
//! [`EventMetadata`]는 생성 시각, 모듈명, 추적 ID를 담습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// Elasticsearch 탐지기 모듈명
pub const MODULE_ELASTIC_DETECTOR: &str = "elastic-detector";

/// 플러그인 ID 필드명 (하위 에이전트 프로토콜 키)
pub const FIELD_PLUGIN_ID: &str = "plugin_id";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 분산 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// 규칙이 매칭 문서 하나로부터 합성한 정규화 보안 이벤트
///
/// `fields`는 출력 키 -> 최종 문자열 값 매핑입니다. 키가 하나도 없어도
/// 유효한 이벤트이며 그대로 싱크에 전달됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 이벤트를 만든 규칙 이름
    pub rule_name: String,
    /// 출력 필드
    pub fields: BTreeMap<String, String>,
}

impl SecurityEvent {
    /// 새로운 trace를 시작하는 보안 이벤트를 생성합니다.
    pub fn new(rule_name: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_ELASTIC_DETECTOR),
            rule_name: rule_name.into(),
            fields,
        }
    }

    /// 필드 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// 필드 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 필드가 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 키가 비어 있을 때만 기본값을 채웁니다.
    ///
    /// 규칙 템플릿이 이미 값을 지정했다면 그 값을 유지합니다.
    pub fn set_default(&mut self, key: &str, value: &str) {
        if !self.fields.contains_key(key) {
            self.fields.insert(key.to_owned(), value.to_owned());
        }
    }
}

/// 에이전트 전송 형식: `event key="value" key="value"`
impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("event")?;
        for (key, value) in &self.fields {
            write!(f, " {}=\"{}\"", key, escape_value(value))?;
        }
        Ok(())
    }
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}
