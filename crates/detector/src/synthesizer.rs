//! 이벤트 합성기 -- 규칙 템플릿과 추출 값으로 정규화 이벤트를 만듭니다.

use std::collections::BTreeMap;

use esguard_core::event::SecurityEvent;

use crate::rule::ElasticRule;
use crate::template::TemplateExpander;

/// 이벤트 합성기
///
/// 규칙의 템플릿 키(`query`, `fields`, `data_index` 제외)를 하나씩 확장해
/// 값이 있는 키만 이벤트에 담습니다. 키가 하나도 없어도 이벤트는 만들어집니다.
#[derive(Debug, Clone)]
pub struct EventSynthesizer<T> {
    expander: T,
}

impl<T: TemplateExpander> EventSynthesizer<T> {
    /// 템플릿 확장기로 합성기를 생성합니다.
    pub fn new(expander: T) -> Self {
        Self { expander }
    }

    /// 추출 값으로 규칙 템플릿을 확장해 이벤트를 만듭니다.
    pub fn synthesize(&self, values: &[String], rule: &ElasticRule) -> SecurityEvent {
        let mut fields = BTreeMap::new();

        for (key, template) in rule.template_entries() {
            match self.expander.expand(template, values) {
                Some(value) => {
                    fields.insert(key.to_owned(), value);
                }
                None => {
                    tracing::debug!(
                        rule = %rule.name(),
                        key,
                        template,
                        "template expanded to no value, key omitted"
                    );
                }
            }
        }

        SecurityEvent::new(rule.name(), fields)
    }
}
