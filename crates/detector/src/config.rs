//! 탐지기 설정
//!
//! [`DetectorConfig`]는 core의 [`DetectorSection`](esguard_core::config::DetectorSection)을
//! 기반으로 탐지기 내부에서 쓰는 형태(인증 정보 쌍, `Duration`)로 정리한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use esguard_core::config::EsguardConfig;
//! use esguard_detector::config::DetectorConfig;
//!
//! let core_config = EsguardConfig::default();
//! let config = DetectorConfig::from_core(&core_config.detector);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// 탐지기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// 플러그인 ID (이벤트 `plugin_id` 기본값)
    pub plugin_id: String,
    /// 플러그인 표시 이름
    pub name: String,
    /// Elasticsearch 엔드포인트 URL
    pub elastic_url: String,
    /// 체크포인트 저장 인덱스
    pub store_index: String,
    /// TLS 인증서 검증 여부
    pub verify_certs: bool,
    /// (사용자, 비밀번호). 둘 다 있을 때만 `Some`
    #[serde(skip_serializing)]
    pub credentials: Option<(String, String)>,
    /// 규칙 파일 경로
    pub rules_path: String,
    /// 규칙 하나를 처리한 뒤 쉬는 시간 (초)
    pub sleep_secs: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 한 번의 조회에서 가져올 최대 문서 수
    pub max_documents: usize,
    /// 문서 타임스탬프 필드명
    pub timestamp_field: String,
    /// 정지 대기 타임아웃 (초)
    pub stop_timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_core(&esguard_core::config::DetectorSection::default())
    }
}

impl DetectorConfig {
    /// core의 `DetectorSection`에서 탐지기 설정을 생성합니다.
    pub fn from_core(core: &esguard_core::config::DetectorSection) -> Self {
        Self {
            plugin_id: core.plugin_id.clone(),
            name: core.name.clone(),
            elastic_url: core.elastic_url.trim_end_matches('/').to_owned(),
            store_index: core.store_index.clone(),
            verify_certs: core.verify_certs,
            credentials: core
                .credentials()
                .map(|(user, password)| (user.to_owned(), password.to_owned())),
            rules_path: core.rules_path.clone(),
            sleep_secs: core.sleep_secs,
            request_timeout_secs: core.request_timeout_secs,
            max_documents: core.max_documents,
            timestamp_field: core.timestamp_field.clone(),
            stop_timeout_secs: core.stop_timeout_secs,
        }
    }

    /// 규칙 사이 대기 시간
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 정지 대기 타임아웃
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DetectorError> {
        const MAX_SLEEP_SECS: u64 = 3600;
        const MAX_DOCUMENTS: usize = 10_000;

        if self.plugin_id.is_empty() {
            return Err(config_err("plugin_id", "must not be empty"));
        }
        if self.name.is_empty() {
            return Err(config_err("name", "must not be empty"));
        }
        if self.elastic_url.is_empty() {
            return Err(config_err("elastic_url", "must not be empty"));
        }
        if self.store_index.is_empty() {
            return Err(config_err("store_index", "must not be empty"));
        }
        if self.sleep_secs == 0 || self.sleep_secs > MAX_SLEEP_SECS {
            return Err(config_err(
                "sleep_secs",
                format!("must be 1-{MAX_SLEEP_SECS}"),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_err("request_timeout_secs", "must be greater than 0"));
        }
        if self.max_documents == 0 || self.max_documents > MAX_DOCUMENTS {
            return Err(config_err(
                "max_documents",
                format!("must be 1-{MAX_DOCUMENTS}"),
            ));
        }
        if self.timestamp_field.is_empty() {
            return Err(config_err("timestamp_field", "must not be empty"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> DetectorError {
    DetectorError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 탐지기 설정 빌더
#[derive(Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 플러그인 ID를 설정합니다.
    pub fn plugin_id(mut self, id: impl Into<String>) -> Self {
        self.config.plugin_id = id.into();
        self
    }

    /// 플러그인 이름을 설정합니다.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Elasticsearch URL을 설정합니다.
    pub fn elastic_url(mut self, url: impl Into<String>) -> Self {
        self.config.elastic_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    /// 체크포인트 인덱스를 설정합니다.
    pub fn store_index(mut self, index: impl Into<String>) -> Self {
        self.config.store_index = index.into();
        self
    }

    /// 인증서 검증 여부를 설정합니다.
    pub fn verify_certs(mut self, verify: bool) -> Self {
        self.config.verify_certs = verify;
        self
    }

    /// basic auth 인증 정보를 설정합니다.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((user.into(), password.into()));
        self
    }

    /// 규칙 사이 대기 시간(초)을 설정합니다.
    pub fn sleep_secs(mut self, secs: u64) -> Self {
        self.config.sleep_secs = secs;
        self
    }

    /// 요청 타임아웃(초)을 설정합니다.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// 최대 문서 수를 설정합니다.
    pub fn max_documents(mut self, max: usize) -> Self {
        self.config.max_documents = max;
        self
    }

    /// 타임스탬프 필드명을 설정합니다.
    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.config.timestamp_field = field.into();
        self
    }

    /// 설정을 검증하고 `DetectorConfig`를 생성합니다.
    pub fn build(self) -> Result<DetectorConfig, DetectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
