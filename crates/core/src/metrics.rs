//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `esguard_`
//! - 모듈명: `detector_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(esguard_core::metrics::DETECTOR_EVENTS_EMITTED_TOTAL).increment(1);
//! ```

use metrics::{describe_counter, describe_gauge};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 규칙 이름 레이블 키
pub const LABEL_RULE: &str = "rule";

// ─── Detector 메트릭 ───────────────────────────────────────────────

/// Detector: 완료된 폴링 사이클 수 (counter)
pub const DETECTOR_CYCLES_TOTAL: &str = "esguard_detector_cycles_total";

/// Detector: 데이터 스토어에서 가져온 문서 수 (counter, label: rule)
pub const DETECTOR_DOCUMENTS_FETCHED_TOTAL: &str = "esguard_detector_documents_fetched_total";

/// Detector: 싱크로 전달된 이벤트 수 (counter, label: rule)
pub const DETECTOR_EVENTS_EMITTED_TOTAL: &str = "esguard_detector_events_emitted_total";

/// Detector: 싱크에서 버려진 이벤트 수 (counter)
pub const DETECTOR_EVENTS_DROPPED_TOTAL: &str = "esguard_detector_events_dropped_total";

/// Detector: 규칙 처리 실패 수 (counter, label: rule)
pub const DETECTOR_RULE_FAILURES_TOTAL: &str = "esguard_detector_rule_failures_total";

/// Detector: 문서에 없던 추출 필드 수 (counter)
pub const DETECTOR_FIELDS_MISSING_TOTAL: &str = "esguard_detector_fields_missing_total";

/// Detector: 로드된 규칙 수 (gauge)
pub const DETECTOR_RULES_LOADED: &str = "esguard_detector_rules_loaded";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 초 (gauge)
pub const DAEMON_UPTIME_SECONDS: &str = "esguard_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "esguard_daemon_build_info";

/// Daemon: stdout 으로 기록된 이벤트 수 (counter)
pub const DAEMON_EVENTS_WRITTEN_TOTAL: &str = "esguard_daemon_events_written_total";

/// 모든 메트릭 설명을 등록합니다.
///
/// 메트릭 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    describe_counter!(DETECTOR_CYCLES_TOTAL, "Completed poll cycles over all rules");
    describe_counter!(
        DETECTOR_DOCUMENTS_FETCHED_TOTAL,
        "Documents returned by the data store"
    );
    describe_counter!(
        DETECTOR_EVENTS_EMITTED_TOTAL,
        "Normalized events handed to the downstream sink"
    );
    describe_counter!(
        DETECTOR_EVENTS_DROPPED_TOTAL,
        "Events the downstream sink could not accept"
    );
    describe_counter!(
        DETECTOR_RULE_FAILURES_TOTAL,
        "Rule fetch/checkpoint failures"
    );
    describe_counter!(
        DETECTOR_FIELDS_MISSING_TOTAL,
        "Requested fields absent from matched documents"
    );
    describe_gauge!(DETECTOR_RULES_LOADED, "Detection rules currently loaded");

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Seconds since the daemon started");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information, labeled by version");
    describe_counter!(
        DAEMON_EVENTS_WRITTEN_TOTAL,
        "Event lines written to the output stream"
    );
}
