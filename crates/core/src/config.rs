//! 설정 관리 — esguard.toml 파싱 및 런타임 설정
//!
//! [`EsguardConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ESGUARD_DETECTOR_ELASTIC_URL=https://es:9200` 형식)
//! 3. 설정 파일 (`esguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), esguard_core::error::EsguardError> {
//! use esguard_core::config::EsguardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let mut config = EsguardConfig::from_file("esguard.toml").await?;
//! config.apply_env_overrides();
//! config.validate()?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = EsguardConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EsguardError};

/// esguard 통합 설정
///
/// `esguard.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsguardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Elasticsearch 탐지기 설정
    #[serde(default)]
    pub detector: DetectorSection,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl EsguardConfig {
    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EsguardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EsguardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EsguardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EsguardError> {
        toml::from_str(toml_str).map_err(|e| {
            EsguardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ESGUARD_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ESGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ESGUARD_GENERAL_LOG_FORMAT");

        // Detector
        let d = &mut self.detector;
        override_string(&mut d.plugin_id, "ESGUARD_DETECTOR_PLUGIN_ID");
        override_string(&mut d.name, "ESGUARD_DETECTOR_NAME");
        override_string(&mut d.elastic_url, "ESGUARD_DETECTOR_ELASTIC_URL");
        override_string(&mut d.store_index, "ESGUARD_DETECTOR_STORE_INDEX");
        override_bool(&mut d.verify_certs, "ESGUARD_DETECTOR_VERIFY_CERTS");
        override_string(&mut d.elastic_user, "ESGUARD_DETECTOR_ELASTIC_USER");
        override_string(&mut d.elastic_password, "ESGUARD_DETECTOR_ELASTIC_PASSWORD");
        override_string(&mut d.rules_path, "ESGUARD_DETECTOR_RULES_PATH");
        override_u64(&mut d.sleep_secs, "ESGUARD_DETECTOR_SLEEP_SECS");
        override_u64(
            &mut d.request_timeout_secs,
            "ESGUARD_DETECTOR_REQUEST_TIMEOUT_SECS",
        );
        override_usize(&mut d.max_documents, "ESGUARD_DETECTOR_MAX_DOCUMENTS");
        override_string(&mut d.timestamp_field, "ESGUARD_DETECTOR_TIMESTAMP_FIELD");
        override_u64(&mut d.stop_timeout_secs, "ESGUARD_DETECTOR_STOP_TIMEOUT_SECS");
        override_usize(
            &mut d.event_channel_capacity,
            "ESGUARD_DETECTOR_EVENT_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "ESGUARD_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "ESGUARD_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "ESGUARD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EsguardError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.detector.validate()?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when enabled"));
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// `[detector]` 섹션 — 플러그인 식별 정보와 데이터 스토어 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// 플러그인 ID (생성되는 이벤트의 `plugin_id`)
    pub plugin_id: String,
    /// 플러그인 표시 이름 (체크포인트 문서 키에도 사용)
    pub name: String,
    /// Elasticsearch 엔드포인트 URL
    pub elastic_url: String,
    /// 체크포인트 저장 인덱스
    pub store_index: String,
    /// TLS 인증서 검증 여부
    pub verify_certs: bool,
    /// 인증 사용자 (비어 있으면 인증 없음)
    pub elastic_user: String,
    /// 인증 비밀번호 (비어 있으면 인증 없음)
    pub elastic_password: String,
    /// 규칙 파일 경로 (YAML)
    pub rules_path: String,
    /// 규칙 하나를 처리한 뒤 쉬는 시간 (초)
    pub sleep_secs: u64,
    /// 데이터 스토어 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 한 번의 조회에서 가져올 최대 문서 수
    pub max_documents: usize,
    /// 문서 타임스탬프 필드명
    pub timestamp_field: String,
    /// 정지 대기 기본 타임아웃 (초)
    pub stop_timeout_secs: u64,
    /// 이벤트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            plugin_id: "1830".to_owned(),
            name: "elastic-detector".to_owned(),
            elastic_url: "http://localhost:9200".to_owned(),
            store_index: "esguard-checkpoints".to_owned(),
            verify_certs: true,
            elastic_user: String::new(),
            elastic_password: String::new(),
            rules_path: "/etc/esguard/rules.yml".to_owned(),
            sleep_secs: 10,
            request_timeout_secs: 30,
            max_documents: 1000,
            timestamp_field: "@timestamp".to_owned(),
            stop_timeout_secs: 1,
            event_channel_capacity: 1024,
        }
    }
}

impl DetectorSection {
    /// 인증 정보 쌍을 반환합니다.
    ///
    /// 사용자와 비밀번호가 모두 비어 있지 않을 때만 `Some`입니다.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.elastic_user.is_empty() || self.elastic_password.is_empty() {
            None
        } else {
            Some((&self.elastic_user, &self.elastic_password))
        }
    }

    /// `[detector]` 섹션을 검증합니다.
    pub fn validate(&self) -> Result<(), EsguardError> {
        const MAX_SLEEP_SECS: u64 = 3600;
        const MAX_DOCUMENTS: usize = 10_000;

        if self.plugin_id.is_empty() {
            return Err(invalid("detector.plugin_id", "must not be empty"));
        }
        if self.name.is_empty() {
            return Err(invalid("detector.name", "must not be empty"));
        }
        if self.elastic_url.is_empty() {
            return Err(invalid("detector.elastic_url", "must not be empty"));
        }
        if !(self.elastic_url.starts_with("http://") || self.elastic_url.starts_with("https://"))
        {
            return Err(invalid(
                "detector.elastic_url",
                "scheme must be http or https",
            ));
        }
        if self.store_index.is_empty() {
            return Err(invalid("detector.store_index", "must not be empty"));
        }
        if self.sleep_secs == 0 || self.sleep_secs > MAX_SLEEP_SECS {
            return Err(invalid(
                "detector.sleep_secs",
                format!("must be 1-{MAX_SLEEP_SECS}"),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid(
                "detector.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.max_documents == 0 || self.max_documents > MAX_DOCUMENTS {
            return Err(invalid(
                "detector.max_documents",
                format!("must be 1-{MAX_DOCUMENTS}"),
            ));
        }
        if self.timestamp_field.is_empty() {
            return Err(invalid("detector.timestamp_field", "must not be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid(
                "detector.event_channel_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9109,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> EsguardError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
