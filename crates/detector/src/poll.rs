//! 폴링 루프 -- 규칙별 체크포인트 기반 증분 조회와 이벤트 생성
//!
//! 한 사이클은 규칙을 고정 순서로 하나씩 처리합니다.
//!
//! ```text
//! for rule in rules:
//!     checkpoint = store.last_timestamp(rule) or epoch
//!     docs = store.matches_since(rule.data_index, checkpoint, rule.query)
//!     next = 재개 지점(docs)              (정할 수 없으면 규칙 실패)
//!     for doc in docs: extract -> synthesize -> sink.emit
//!     store.insert_timestamp(rule, next)   (문서가 있고 오류가 없을 때만)
//!     sleep(delay)
//! ```
//!
//! # 재개 지점
//! - 페이지가 꽉 찼으면 마지막 문서 시각과 그 시각에 처리한 문서 ID
//! - 덜 찼으면 조회 직전 시각 (마지막 문서가 그보다 늦으면 그 문서 시각)
//!
//! 같은 시각의 문서가 페이지 경계에 걸쳐도 ID 제외로 빠짐없이 한 번씩 읽습니다.
//!
//! 규칙 하나의 실패는 로그와 메트릭으로만 남고 다음 규칙으로 넘어갑니다.
//! 정지 플래그는 사이클 시작 지점에서만 확인합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use esguard_core::event::FIELD_PLUGIN_ID;
use esguard_core::metrics as m;

use crate::config::DetectorConfig;
use crate::document::Document;
use crate::error::DetectorError;
use crate::extractor::FieldExtractor;
use crate::rule::{ElasticRule, RuleSet};
use crate::sink::EventSink;
use crate::store::{Checkpoint, DataStore};
use crate::synthesizer::EventSynthesizer;
use crate::template::{PositionalTemplate, TemplateExpander};

/// 한 사이클의 처리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 오류 없이 끝난 규칙 수
    pub rules_succeeded: usize,
    /// 실패한 규칙 수
    pub rules_failed: usize,
    /// 싱크로 넘긴 이벤트 수
    pub events_emitted: usize,
}

/// 규칙 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// 가져온 문서(= 만든 이벤트) 수
    pub documents: usize,
    /// 새로 기록한 체크포인트 (문서가 없으면 `None`)
    pub checkpoint: Option<Checkpoint>,
}

/// 폴링 루프
pub struct PollLoop<S, K, T = PositionalTemplate> {
    rules: RuleSet,
    store: S,
    sink: K,
    extractor: FieldExtractor,
    synthesizer: EventSynthesizer<T>,
    plugin_id: String,
    delay: Duration,
    page_size: usize,
    timestamp_field: String,
    stop: Arc<AtomicBool>,
}

impl<S, K> PollLoop<S, K, PositionalTemplate>
where
    S: DataStore,
    K: EventSink,
{
    /// 기본 위치 템플릿으로 폴링 루프를 생성합니다.
    pub fn new(
        config: &DetectorConfig,
        rules: RuleSet,
        store: S,
        sink: K,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, DetectorError> {
        Ok(Self::with_expander(
            config,
            rules,
            store,
            sink,
            PositionalTemplate::new()?,
            stop,
        ))
    }
}

impl<S, K, T> PollLoop<S, K, T>
where
    S: DataStore,
    K: EventSink,
    T: TemplateExpander,
{
    /// 템플릿 확장기를 지정해 폴링 루프를 생성합니다.
    pub fn with_expander(
        config: &DetectorConfig,
        rules: RuleSet,
        store: S,
        sink: K,
        expander: T,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rules,
            store,
            sink,
            extractor: FieldExtractor::new(),
            synthesizer: EventSynthesizer::new(expander),
            plugin_id: config.plugin_id.clone(),
            delay: config.sleep(),
            page_size: config.max_documents,
            timestamp_field: config.timestamp_field.clone(),
            stop,
        }
    }

    /// 정지 플래그가 설정될 때까지 사이클을 반복합니다.
    pub async fn run(&self) {
        tracing::info!(rules = self.rules.len(), "poll loop started");

        let mut cycles: u64 = 0;
        while !self.stop.load(Ordering::Acquire) {
            let report = self.run_cycle().await;
            cycles += 1;
            tracing::debug!(
                cycle = cycles,
                succeeded = report.rules_succeeded,
                failed = report.rules_failed,
                events = report.events_emitted,
                "poll cycle finished"
            );

            if self.rules.is_empty() {
                // 규칙이 없으면 사이클 사이에서 쉰다
                tokio::time::sleep(self.delay).await;
                tokio::task::yield_now().await;
            }
        }

        tracing::info!(cycles, "poll loop exiting");
    }

    /// 모든 규칙을 한 번씩 처리합니다.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for rule in &self.rules {
            match self.process_rule(rule).await {
                Ok(outcome) => {
                    report.rules_succeeded += 1;
                    report.events_emitted += outcome.documents;
                }
                Err(e) => {
                    report.rules_failed += 1;
                    counter!(m::DETECTOR_RULE_FAILURES_TOTAL, m::LABEL_RULE => rule.name().to_owned())
                        .increment(1);
                    tracing::error!(
                        rule = %rule.name(),
                        index = %rule.data_index(),
                        error = %e,
                        "rule processing failed"
                    );
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        counter!(m::DETECTOR_CYCLES_TOTAL).increment(1);
        report
    }

    /// 규칙 하나를 처리합니다: 체크포인트 읽기, 조회, 이벤트 생성, 체크포인트 기록.
    ///
    /// 조회나 체크포인트 연산이 실패하면 체크포인트는 바뀌지 않습니다.
    pub async fn process_rule(&self, rule: &ElasticRule) -> Result<RuleOutcome, DetectorError> {
        let since = self
            .store
            .last_timestamp(rule)
            .await?
            .unwrap_or_else(Checkpoint::epoch);

        // 조회 직전 시각. 처리 중에 들어온 문서는 다음 사이클에 잡힌다.
        let started = Checkpoint::now();

        tracing::info!(rule = %rule.name(), since = %since, "fetching documents since checkpoint");

        let documents = self
            .store
            .matches_since(rule.data_index(), &since, rule.query())
            .await?;

        counter!(m::DETECTOR_DOCUMENTS_FETCHED_TOTAL, m::LABEL_RULE => rule.name().to_owned())
            .increment(documents.len() as u64);

        if documents.is_empty() {
            return Ok(RuleOutcome {
                documents: 0,
                checkpoint: None,
            });
        }

        // 재개 지점을 못 정하면 아무것도 내보내지 않는다
        let next = self
            .next_checkpoint(&since, &documents, started)
            .map_err(|reason| DetectorError::Checkpoint {
                rule: rule.name().to_owned(),
                reason,
            })?;

        for document in &documents {
            tracing::debug!(rule = %rule.name(), document = %document, "processing document");
            let group = self.extractor.extract(document, rule.fields());
            let mut event = self.synthesizer.synthesize(&group.values, rule);
            event.set_default(FIELD_PLUGIN_ID, &self.plugin_id);
            self.sink.emit(event);
        }

        counter!(m::DETECTOR_EVENTS_EMITTED_TOTAL, m::LABEL_RULE => rule.name().to_owned())
            .increment(documents.len() as u64);

        self.store.insert_timestamp(rule, next.clone()).await?;

        tracing::info!(
            rule = %rule.name(),
            documents = documents.len(),
            checkpoint = %next,
            "rule batch processed"
        );

        Ok(RuleOutcome {
            documents: documents.len(),
            checkpoint: Some(next),
        })
    }

    /// 다음 조회를 시작할 지점을 정합니다.
    ///
    /// 꽉 찬 페이지는 마지막 문서 시각에서 이어 읽어야 하므로 그 시각을 알 수 없거나
    /// 그 시각의 문서에 ID가 없으면 에러입니다. 조회 직전 시각으로 건너뛰지 않습니다.
    fn next_checkpoint(
        &self,
        since: &Checkpoint,
        documents: &[Document],
        started: Checkpoint,
    ) -> Result<Checkpoint, String> {
        let full_page = documents.len() >= self.page_size;
        let last = documents
            .last()
            .and_then(|doc| doc.resume_instant(&self.timestamp_field));

        let at: DateTime<Utc> = match last {
            Some(last) if full_page || last > started.timestamp() => last,
            None if full_page => {
                return Err(format!(
                    "last document of a full page has no usable '{}' value",
                    self.timestamp_field
                ));
            }
            _ => started.timestamp(),
        };

        let mut seen_ids = if at == since.timestamp() {
            since.seen_ids().to_vec()
        } else {
            Vec::new()
        };
        for doc in documents
            .iter()
            .filter(|doc| doc.resume_instant(&self.timestamp_field) == Some(at))
        {
            match doc.id() {
                Some(id) => seen_ids.push(id.to_owned()),
                None if full_page => {
                    return Err(format!("document at resume point {at} has no id"));
                }
                None => {}
            }
        }

        Ok(Checkpoint::from(at).with_seen_ids(seen_ids))
    }

    /// 로드된 규칙
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// 규칙 사이 대기 시간
    pub fn delay(&self) -> Duration {
        self.delay
    }
}
