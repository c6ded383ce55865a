//! 탐지 규칙 데이터 타입
//!
//! 규칙 파일의 섹션 하나(규칙 이름 -> 키/값 매핑)에서 만들어지는
//! [`ElasticRule`]을 정의합니다. 규칙은 시작 시 한 번 만들어지고
//! 실행 중에는 바뀌지 않으므로 필드는 읽기 전용 접근자로만 노출합니다.

use std::fmt;

use serde::Serialize;

use crate::error::DetectorError;

/// 템플릿 확장에서 제외되는 규칙 메타데이터 키
pub const SKIP_RULE_FIELDS: [&str; 3] = ["query", "fields", "data_index"];

/// `fields` 문자열의 구분자
pub const FIELD_DELIMITER: char = ',';

const KEY_QUERY: &str = "query";
const KEY_FIELDS: &str = "fields";
const KEY_PLUGIN_SID: &str = "plugin_sid";
const KEY_DATA_INDEX: &str = "data_index";

/// 규칙 이름 최대 길이
const MAX_RULE_NAME_LEN: usize = 256;

/// 탐지 규칙 -- 규칙 파일의 섹션 하나에 대응합니다.
///
/// # 규칙 스키마
/// ```yaml
/// ssh_bruteforce:
///   query: '{"match": {"event.action": "ssh_login_failed"}}'
///   fields: "source.ip,user.name"
///   plugin_sid: "1001"
///   data_index: "auth-*"
///   src_ip: "{0}"
///   username: "{1}"
/// ```
///
/// `query`, `fields`, `data_index`를 제외한 모든 키(`plugin_sid` 포함)는
/// 출력 이벤트 템플릿으로 쓰입니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElasticRule {
    name: String,
    query: serde_json::Value,
    fields: Vec<String>,
    plugin_sid: String,
    data_index: String,
    original_mapping: Vec<(String, String)>,
}

impl ElasticRule {
    /// 원시 키/값 매핑에서 규칙을 만듭니다.
    ///
    /// 매핑 순서는 유지되며, 같은 키가 두 번 나오면 뒤의 값이 이깁니다.
    ///
    /// # Errors
    /// - 필수 키(`query`, `fields`, `plugin_sid`, `data_index`) 누락
    /// - `query`가 JSON 객체가 아님
    /// - `fields`에 필드 이름이 하나도 없거나 빈 이름이 있음
    /// - 키가 비었거나 공백, `=`, `"`, 제어 문자를 포함함 (`event k="v"` 줄을 깨뜨림)
    pub fn parse<K, V>(
        name: &str,
        raw: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, DetectorError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        if name.is_empty() {
            return Err(parse_err("(empty)", "rule name must not be empty"));
        }
        if name.len() > MAX_RULE_NAME_LEN {
            return Err(parse_err(
                name,
                format!("rule name must not exceed {MAX_RULE_NAME_LEN} characters"),
            ));
        }

        let mut original_mapping: Vec<(String, String)> = Vec::new();
        for (key, value) in raw {
            let key = key.into();
            let value = value.into();
            if let Some(reason) = invalid_key_reason(&key) {
                return Err(parse_err(name, format!("invalid key {key:?}: {reason}")));
            }
            match original_mapping.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => original_mapping.push((key, value)),
            }
        }

        let lookup = |key: &str| -> Result<&str, DetectorError> {
            original_mapping
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| parse_err(name, format!("missing required key '{key}'")))
        };

        let query = Self::parse_query(name, lookup(KEY_QUERY)?)?;
        let fields = Self::split_fields(name, lookup(KEY_FIELDS)?)?;
        let plugin_sid = lookup(KEY_PLUGIN_SID)?.to_owned();
        let data_index = lookup(KEY_DATA_INDEX)?.to_owned();

        if data_index.is_empty() {
            return Err(parse_err(name, "data_index must not be empty"));
        }

        Ok(Self {
            name: name.to_owned(),
            query,
            fields,
            plugin_sid,
            data_index,
            original_mapping,
        })
    }

    fn parse_query(name: &str, raw: &str) -> Result<serde_json::Value, DetectorError> {
        let query: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| parse_err(name, format!("query is not valid JSON: {e}")))?;
        if !query.is_object() {
            return Err(parse_err(name, "query must be a JSON object"));
        }
        Ok(query)
    }

    fn split_fields(name: &str, raw: &str) -> Result<Vec<String>, DetectorError> {
        let fields: Vec<String> = raw
            .split(FIELD_DELIMITER)
            .map(|f| f.trim().to_owned())
            .collect();
        if fields.iter().any(String::is_empty) {
            return Err(parse_err(
                name,
                format!("fields '{raw}' contains an empty field name"),
            ));
        }
        Ok(fields)
    }

    /// 규칙 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 데이터 스토어로 그대로 전달되는 검색 쿼리
    pub fn query(&self) -> &serde_json::Value {
        &self.query
    }

    /// 추출할 필드 이름 (순서가 템플릿 인덱스가 됨)
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// 시그니처 ID
    pub fn plugin_sid(&self) -> &str {
        &self.plugin_sid
    }

    /// 검색 대상 인덱스
    pub fn data_index(&self) -> &str {
        &self.data_index
    }

    /// 규칙 섹션의 모든 키/값 (원래 순서)
    pub fn original_mapping(&self) -> &[(String, String)] {
        &self.original_mapping
    }

    /// 템플릿 확장 대상 키/값 (메타데이터 키 제외)
    pub fn template_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.original_mapping
            .iter()
            .filter(|(key, _)| !SKIP_RULE_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl fmt::Display for ElasticRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}][{}][{}] -> {}",
            self.name, self.data_index, self.plugin_sid, self.query
        )
    }
}

/// 이벤트 줄의 키로 쓸 수 없는 이유
fn invalid_key_reason(key: &str) -> Option<&'static str> {
    if key.is_empty() {
        return Some("key must not be empty");
    }
    key.chars().find_map(|c| match c {
        '=' => Some("key must not contain '='"),
        '"' => Some("key must not contain '\"'"),
        c if c.is_whitespace() => Some("key must not contain whitespace"),
        c if c.is_control() => Some("key must not contain control characters"),
        _ => None,
    })
}

fn parse_err(rule: &str, reason: impl Into<String>) -> DetectorError {
    DetectorError::RuleParse {
        rule: rule.to_owned(),
        reason: reason.into(),
    }
}
