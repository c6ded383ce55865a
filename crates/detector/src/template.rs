//! 출력 템플릿 확장
//!
//! [`TemplateExpander`]는 합성기가 의존하는 좁은 인터페이스이고,
//! [`PositionalTemplate`]은 기본 구현입니다.
//!
//! # 위치 자리표시자 문법
//! - `{N}`: 추출 값 N번째(0부터)로 치환
//! - 중괄호 안이 숫자가 아니면 그대로 둠 (`{host}` -> `{host}`)
//! - 템플릿이 비었거나 범위 밖 인덱스가 하나라도 있으면 값 없음(`None`)

use regex::Regex;

use crate::error::DetectorError;

const PLACEHOLDER_PATTERN: &str = r"\{(\d+)\}";

/// 템플릿 확장 인터페이스
pub trait TemplateExpander: Send + Sync {
    /// `template`을 `values`로 확장합니다. 값이 없으면 `None`입니다.
    fn expand(&self, template: &str, values: &[String]) -> Option<String>;
}

/// `{N}` 위치 자리표시자 템플릿
#[derive(Debug, Clone)]
pub struct PositionalTemplate {
    placeholder: Regex,
}

impl PositionalTemplate {
    /// 자리표시자 패턴을 컴파일합니다.
    pub fn new() -> Result<Self, DetectorError> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN).map_err(|e| DetectorError::Config {
            field: "template".to_owned(),
            reason: format!("invalid placeholder pattern: {e}"),
        })?;
        Ok(Self { placeholder })
    }
}

impl TemplateExpander for PositionalTemplate {
    fn expand(&self, template: &str, values: &[String]) -> Option<String> {
        if template.is_empty() {
            return None;
        }

        let mut expanded = String::with_capacity(template.len());
        let mut last = 0;
        for caps in self.placeholder.captures_iter(template) {
            let whole = caps.get(0)?;
            let value = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| values.get(index))?;
            expanded.push_str(&template[last..whole.start()]);
            expanded.push_str(value);
            last = whole.end();
        }
        expanded.push_str(&template[last..]);

        Some(expanded)
    }
}
