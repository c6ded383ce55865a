//! 필드 추출기 -- 문서에서 규칙이 지정한 필드를 순서대로 꺼냅니다.
//!
//! 없는 필드는 빈 문자열이 되고, 필드 하나당 경고 로그 한 번과
//! 누락 카운터 증가로 보고됩니다. 결과 길이는 항상 요청 필드 수와 같습니다.

use metrics::counter;

use esguard_core::metrics as m;

use crate::document::{Document, value_to_string};

/// 문서 하나에서 추출한 값 묶음
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedGroup {
    /// 요청 필드 순서대로의 값 (누락 시 `""`)
    pub values: Vec<String>,
    /// 문서에 없던 필드 이름
    pub missing: Vec<String>,
}

impl ExtractedGroup {
    /// 값 개수
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 값이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 필드 추출기
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    /// 새 추출기를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// `fields` 순서대로 값을 추출합니다.
    pub fn extract(&self, document: &Document, fields: &[String]) -> ExtractedGroup {
        let mut group = ExtractedGroup {
            values: Vec::with_capacity(fields.len()),
            missing: Vec::new(),
        };

        for field in fields {
            match document.lookup(field) {
                Some(value) => group.values.push(value_to_string(value)),
                None => {
                    tracing::warn!(
                        field = %field,
                        document = %document,
                        "field not found in document"
                    );
                    counter!(m::DETECTOR_FIELDS_MISSING_TOTAL).increment(1);
                    group.values.push(String::new());
                    group.missing.push(field.clone());
                }
            }
        }

        group
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use serde_json::json;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    /// WARN 이벤트의 `field` 값을 모으는 레이어
    #[derive(Clone, Default)]
    struct WarnedFields(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for WarnedFields {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != Level::WARN {
                return;
            }
            let mut visitor = FieldVisitor(None);
            event.record(&mut visitor);
            if let Some(field) = visitor.0 {
                self.0.lock().unwrap().push(field);
            }
        }
    }

    struct FieldVisitor(Option<String>);

    impl Visit for FieldVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "field" {
                self.0 = Some(format!("{value:?}"));
            }
        }
    }

    fn extract_capturing_warnings(doc: &Document, names: &[&str]) -> (ExtractedGroup, Vec<String>) {
        let warned = WarnedFields::default();
        let subscriber = tracing_subscriber::registry().with(warned.clone());
        let group = tracing::subscriber::with_default(subscriber, || {
            FieldExtractor::new().extract(doc, &fields(names))
        });
        let warned = warned.0.lock().unwrap().clone();
        (group, warned)
    }

    #[test]
    fn extracts_in_requested_order() {
        let doc = Document::new(json!({"a": "1", "b": {"c": 2}}));
        let group = FieldExtractor::new().extract(&doc, &fields(&["b.c", "a"]));
        assert_eq!(group.values, ["2", "1"]);
        assert!(group.missing.is_empty());
    }

    #[test]
    fn missing_field_yields_empty_string_and_one_diagnostic() {
        let doc = Document::new(json!({"a": "x"}));
        let (group, warned) = extract_capturing_warnings(&doc, &["a", "b"]);
        assert_eq!(group.values, ["x", ""]);
        assert_eq!(group.missing, ["b"]);
        assert_eq!(warned, ["b"]);
    }

    #[test]
    fn present_fields_log_no_warning() {
        let doc = Document::new(json!({"a": "x", "b": {"c": null}}));
        let (group, warned) = extract_capturing_warnings(&doc, &["a", "b.c"]);
        assert_eq!(group.values, ["x", ""]);
        assert!(group.missing.is_empty());
        assert!(warned.is_empty());
    }

    #[test]
    fn repeated_field_is_extracted_twice() {
        let doc = Document::new(json!({"ip": "1.2.3.4"}));
        let group = FieldExtractor::new().extract(&doc, &fields(&["ip", "ip"]));
        assert_eq!(group.values, ["1.2.3.4", "1.2.3.4"]);
    }

    proptest! {
        #[test]
        fn output_length_matches_field_count(
            names in proptest::collection::vec("[a-z]{1,6}(\\.[a-z]{1,6}){0,2}", 0..12),
            present in proptest::collection::vec("[a-z]{1,6}", 0..6),
        ) {
            let source: serde_json::Map<String, serde_json::Value> = present
                .iter()
                .map(|k| (k.clone(), json!("v")))
                .collect();
            let doc = Document::new(serde_json::Value::Object(source));
            let group = FieldExtractor::new().extract(&doc, &names);
            prop_assert_eq!(group.len(), names.len());
            prop_assert!(group.missing.len() <= names.len());
        }
    }
}
