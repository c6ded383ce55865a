//! 탐지 규칙 -- 규칙 파일 로딩과 불변 규칙 집합
//!
//! 규칙 파일은 규칙 이름 -> 키/값 매핑의 YAML 문서입니다.
//!
//! # 규칙 형식
//! ```yaml
//! ssh_bruteforce:
//!   query: '{"match": {"event.action": "ssh_login_failed"}}'
//!   fields: "source.ip,user.name"
//!   plugin_sid: "1001"
//!   data_index: "auth-*"
//!   src_ip: "{0}"
//!   username: "{1}"
//! ```
//!
//! # 아키텍처
//! - [`RuleSet`]: 시작 시 한 번 만들어지는 순서 있는 불변 규칙 집합
//! - [`loader`]: YAML 파일 로딩 및 규칙별 검증
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod types;

pub use loader::{RuleLoadOutcome, RuleLoader};
pub use types::{ElasticRule, FIELD_DELIMITER, SKIP_RULE_FIELDS};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::DetectorError;

/// 순서 있는 불변 규칙 집합
///
/// 내부 저장소는 `Arc<[ElasticRule]>`이므로 복제 비용이 낮고,
/// 생성 이후에는 읽기만 하므로 동기화가 필요 없습니다.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Arc<[ElasticRule]>,
}

impl RuleSet {
    /// 규칙 목록으로 집합을 만듭니다. 순서가 곧 폴링 순서입니다.
    ///
    /// # Errors
    /// 같은 이름의 규칙이 두 번 나오면 실패합니다.
    pub fn new(rules: Vec<ElasticRule>) -> Result<Self, DetectorError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name()) {
                return Err(DetectorError::RuleParse {
                    rule: rule.name().to_owned(),
                    reason: "duplicate rule name".to_owned(),
                });
            }
        }
        Ok(Self {
            rules: rules.into(),
        })
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 규칙을 순서대로 순회합니다.
    pub fn iter(&self) -> std::slice::Iter<'_, ElasticRule> {
        self.rules.iter()
    }

    /// 이름으로 규칙을 찾습니다.
    pub fn get(&self, name: &str) -> Option<&ElasticRule> {
        self.rules.iter().find(|rule| rule.name() == name)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a ElasticRule;
    type IntoIter = std::slice::Iter<'a, ElasticRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> ElasticRule {
        ElasticRule::parse(
            name,
            [
                ("query", r#"{"match_all": {}}"#),
                ("fields", "host.name"),
                ("plugin_sid", "1"),
                ("data_index", "logs-*"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rule_set_preserves_order() {
        let set = RuleSet::new(vec![rule("b"), rule("a"), rule("c")]).unwrap();
        let names: Vec<&str> = set.iter().map(ElasticRule::name).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn rule_set_rejects_duplicates() {
        let err = RuleSet::new(vec![rule("a"), rule("a")]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rule_set_lookup_by_name() {
        let set = RuleSet::new(vec![rule("a"), rule("b")]).unwrap();
        assert!(set.get("b").is_some());
        assert!(set.get("zzz").is_none());
    }

    #[test]
    fn empty_rule_set() {
        let set = RuleSet::default();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn clones_share_storage() {
        let set = RuleSet::new(vec![rule("a")]).unwrap();
        let clone = set.clone();
        assert!(Arc::ptr_eq(&set.rules, &clone.rules));
    }
}
