//! 탐지기 에러 타입
//!
//! [`DetectorError`]는 탐지기 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<DetectorError> for EsguardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 누락된 필드와 값이 없는 템플릿은 에러가 아닙니다. 각각 빈 문자열과
//! 키 생략으로 처리되며 이 타입에는 나타나지 않습니다.

use esguard_core::error::{ConfigError, DetectionError, EsguardError, PipelineError, StorageError};

/// 탐지기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 규칙 하나의 필수 키 누락 또는 잘못된 값
    #[error("rule parse error: rule '{rule}': {reason}")]
    RuleParse {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 파일 전체를 읽거나 해석할 수 없음
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 데이터 스토어 클라이언트를 만들 수 없음 (재시도하지 않음)
    #[error("startup failed: {0}")]
    StartupFatal(String),

    /// 문서 조회 실패
    #[error("fetch from '{index}' failed: {reason}")]
    Fetch {
        /// 조회 대상 인덱스
        index: String,
        /// 실패 사유
        reason: String,
    },

    /// 체크포인트 읽기/쓰기 실패
    #[error("checkpoint for rule '{rule}' failed: {reason}")]
    Checkpoint {
        /// 규칙 이름
        rule: String,
        /// 실패 사유
        reason: String,
    },

    /// 이미 시작된 탐지기를 다시 시작하려 함
    #[error("detector already started")]
    AlreadyStarted,
}

impl From<DetectorError> for EsguardError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::Config { field, reason } => {
                EsguardError::Config(ConfigError::InvalidValue { field, reason })
            }
            DetectorError::RuleParse { .. } | DetectorError::RuleLoad { .. } => {
                EsguardError::Detection(DetectionError::Rule(err.to_string()))
            }
            DetectorError::Fetch { .. } | DetectorError::Checkpoint { .. } => {
                EsguardError::Storage(StorageError::Query(err.to_string()))
            }
            DetectorError::StartupFatal(reason) => {
                EsguardError::Storage(StorageError::Connection(reason))
            }
            DetectorError::AlreadyStarted => EsguardError::Pipeline(PipelineError::AlreadyRunning),
        }
    }
}
