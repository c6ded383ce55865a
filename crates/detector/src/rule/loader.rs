//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 최상위는 규칙 이름 -> 키/값 매핑이어야 합니다. 최상위 구조가 깨진 경우는
//! 전체 로딩을 중단하고, 개별 규칙의 검증 실패는 경고 로그를 남기고 건너뜁니다.

use std::path::Path;

use serde_yaml::Value;

use crate::error::DetectorError;

use super::RuleSet;
use super::types::ElasticRule;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로딩 결과
#[derive(Debug)]
pub struct RuleLoadOutcome {
    /// 검증을 통과한 규칙 (파일 순서)
    pub rules: RuleSet,
    /// 검증에 실패해 건너뛴 규칙의 에러
    pub rejected: Vec<DetectorError>,
}

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// YAML 규칙 파일을 로드합니다.
    ///
    /// # Errors
    /// - 파일을 읽을 수 없거나 너무 큰 경우
    /// - 최상위가 매핑이 아닌 경우 (전체 로딩 중단)
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleLoadOutcome, DetectorError> {
        let path = path.as_ref();

        // 파일 크기 검증
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DetectorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(DetectorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| DetectorError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let outcome = Self::parse_yaml(&content, &path.display().to_string())?;

        tracing::info!(
            path = %path.display(),
            loaded = outcome.rules.len(),
            rejected = outcome.rejected.len(),
            "loaded detection rules"
        );

        Ok(outcome)
    }

    /// YAML 문자열을 파싱하여 규칙 집합을 만듭니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleLoadOutcome, DetectorError> {
        let load_err = |reason: String| DetectorError::RuleLoad {
            path: source.to_owned(),
            reason,
        };

        let document: Value = serde_yaml::from_str(yaml_str)
            .map_err(|e| load_err(format!("YAML parse error: {e}")))?;

        let sections = match document {
            Value::Mapping(map) => map,
            // 빈 파일
            Value::Null => serde_yaml::Mapping::new(),
            other => {
                return Err(load_err(format!(
                    "expected a mapping of rule name to rule, found {}",
                    value_kind(&other)
                )));
            }
        };

        if sections.len() > MAX_RULES_COUNT {
            return Err(load_err(format!("too many rules: max {MAX_RULES_COUNT}")));
        }

        let mut rules = Vec::new();
        let mut rejected = Vec::new();

        for (name, body) in &sections {
            match Self::parse_section(name, body) {
                Ok(rule) => {
                    tracing::debug!(rule = %rule, "parsed rule");
                    rules.push(rule);
                }
                Err(e) => {
                    tracing::warn!(
                        source,
                        error = %e,
                        "failed to parse rule, skipping"
                    );
                    rejected.push(e);
                }
            }
        }

        Ok(RuleLoadOutcome {
            rules: RuleSet::new(rules)?,
            rejected,
        })
    }

    fn parse_section(name: &Value, body: &Value) -> Result<ElasticRule, DetectorError> {
        let name = scalar_to_string(name).map_err(|reason| DetectorError::RuleParse {
            rule: format!("{name:?}"),
            reason: format!("rule name must be a scalar: {reason}"),
        })?;

        let Value::Mapping(body) = body else {
            return Err(DetectorError::RuleParse {
                rule: name,
                reason: format!("rule body must be a mapping, found {}", value_kind(body)),
            });
        };

        let mut raw = Vec::with_capacity(body.len());
        for (key, value) in body {
            let key = scalar_to_string(key).map_err(|reason| DetectorError::RuleParse {
                rule: name.clone(),
                reason: format!("invalid key: {reason}"),
            })?;
            let value = value_to_string(value).map_err(|reason| DetectorError::RuleParse {
                rule: name.clone(),
                reason: format!("invalid value for '{key}': {reason}"),
            })?;
            raw.push((key, value));
        }

        ElasticRule::parse(&name, raw)
    }
}

fn scalar_to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar, found {}", value_kind(other))),
    }
}

/// 규칙 값을 문자열로 바꿉니다.
///
/// 인라인 매핑/시퀀스(예: YAML로 쓴 query)는 JSON 문자열이 됩니다.
fn value_to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Mapping(_) | Value::Sequence(_) => {
            serde_json::to_string(value).map_err(|e| e.to_string())
        }
        Value::Tagged(tagged) => value_to_string(&tagged.value),
        scalar => scalar_to_string(scalar),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES_YAML: &str = r#"
ssh_bruteforce:
  query: '{"match": {"event.action": "ssh_login_failed"}}'
  fields: "source.ip,user.name"
  plugin_sid: 1001
  data_index: "auth-*"
  src_ip: "{0}"
  username: "{1}"

web_scan:
  query:
    bool:
      must:
        - match: { "http.response.status_code": 404 }
  fields: "client.ip"
  plugin_sid: "2001"
  data_index: "nginx-*"
  src_ip: "{0}"
"#;

    #[test]
    fn parse_valid_yaml_in_file_order() {
        let outcome = RuleLoader::parse_yaml(RULES_YAML, "rules.yml").unwrap();
        assert!(outcome.rejected.is_empty());
        let names: Vec<&str> = outcome.rules.iter().map(ElasticRule::name).collect();
        assert_eq!(names, ["ssh_bruteforce", "web_scan"]);
    }

    #[test]
    fn numeric_values_become_strings() {
        let outcome = RuleLoader::parse_yaml(RULES_YAML, "rules.yml").unwrap();
        let rule = outcome.rules.get("ssh_bruteforce").unwrap();
        assert_eq!(rule.plugin_sid(), "1001");
    }

    #[test]
    fn inline_yaml_query_becomes_json_object() {
        let outcome = RuleLoader::parse_yaml(RULES_YAML, "rules.yml").unwrap();
        let rule = outcome.rules.get("web_scan").unwrap();
        assert!(rule.query()["bool"]["must"].is_array());
    }

    #[test]
    fn bad_rule_is_skipped_others_load() {
        let yaml = r#"
good:
  query: '{"match_all": {}}'
  fields: "host.name"
  plugin_sid: "1"
  data_index: "logs-*"
missing_query:
  fields: "host.name"
  plugin_sid: "2"
  data_index: "logs-*"
not_a_mapping: "oops"
"#;
        let outcome = RuleLoader::parse_yaml(yaml, "rules.yml").unwrap();
        assert_eq!(outcome.rules.len(), 1);
        assert!(outcome.rules.get("good").is_some());
        assert_eq!(outcome.rejected.len(), 2);
        assert!(
            outcome
                .rejected
                .iter()
                .any(|e| e.to_string().contains("missing_query"))
        );
    }

    #[test]
    fn top_level_sequence_aborts_loading() {
        let err = RuleLoader::parse_yaml("- a\n- b\n", "rules.yml").unwrap_err();
        assert!(matches!(err, DetectorError::RuleLoad { .. }));
    }

    #[test]
    fn invalid_yaml_aborts_loading() {
        let result = RuleLoader::parse_yaml("not: [valid: yaml: {{{", "bad.yml");
        assert!(matches!(result, Err(DetectorError::RuleLoad { .. })));
    }

    #[test]
    fn empty_file_yields_empty_rule_set() {
        let outcome = RuleLoader::parse_yaml("", "empty.yml").unwrap();
        assert!(outcome.rules.is_empty());
        assert!(outcome.rejected.is_empty());
    }

    #[tokio::test]
    async fn load_nonexistent_file_returns_error() {
        let result = RuleLoader::load_file("/nonexistent/path/rules.yml").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        tokio::fs::write(&path, RULES_YAML).await.unwrap();

        let outcome = RuleLoader::load_file(&path).await.unwrap();
        assert_eq!(outcome.rules.len(), 2);
    }
}
