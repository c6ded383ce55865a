#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: YAML 규칙 파일 로딩과 불변 규칙 집합
//! - [`document`]: 검색 결과 문서와 점 경로 조회
//! - [`extractor`]: 문서에서 규칙 필드를 순서대로 추출
//! - [`template`]: `{N}` 위치 자리표시자 템플릿
//! - [`synthesizer`]: 추출 값과 규칙 템플릿으로 이벤트 합성
//! - [`store`]: 데이터 스토어 trait과 Elasticsearch 클라이언트
//! - [`sink`]: 하위 이벤트 싱크
//! - [`poll`]: 규칙별 증분 조회 사이클
//! - [`detector`]: 워커 생명주기 (Pipeline trait 구현)
//! - [`config`]: 탐지기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod detector;
pub mod document;
pub mod error;
pub mod extractor;
pub mod poll;
pub mod rule;
pub mod sink;
pub mod store;
pub mod synthesizer;
pub mod template;

// --- 주요 타입 re-export ---

// 생명주기
pub use detector::{ElasticDetector, ElasticDetectorBuilder, LoopState};

// 설정
pub use config::{DetectorConfig, DetectorConfigBuilder};

// 에러
pub use error::DetectorError;

// 규칙
pub use rule::{ElasticRule, RuleLoadOutcome, RuleLoader, RuleSet};

// 추출/합성
pub use document::Document;
pub use extractor::{ExtractedGroup, FieldExtractor};
pub use synthesizer::EventSynthesizer;
pub use template::{PositionalTemplate, TemplateExpander};

// 스토어/싱크/루프
pub use poll::{CycleReport, PollLoop, RuleOutcome};
pub use sink::{ChannelSink, EventSink};
pub use store::{Checkpoint, DataStore, ElasticClient};
