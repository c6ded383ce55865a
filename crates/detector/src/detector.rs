//! 탐지기 생명주기 -- 폴링 루프 워커의 시작/정지/상태를 관리합니다.
//!
//! [`ElasticDetector`]는 core의 [`Pipeline`](esguard_core::pipeline::Pipeline) trait을 구현하여
//! `esguard-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 상태 전이
//! ```text
//! Idle --start--> Running --request_stop--> StopRequested --(사이클 종료)--> Stopped
//!   \--start 실패(StartupFatal)------------------------------------------> Stopped
//! ```
//!
//! 정지 요청은 다음 사이클 시작 지점에서 반영되므로 최악의 정지 지연은
//! 규칙 수 x 규칙별 대기 시간을 포함한 한 사이클입니다.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::gauge;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use esguard_core::error::{EsguardError, PipelineError};
use esguard_core::event::SecurityEvent;
use esguard_core::metrics as m;
use esguard_core::pipeline::{HealthStatus, Pipeline};

use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::poll::PollLoop;
use crate::rule::RuleSet;
use crate::sink::{ChannelSink, EventSink};
use crate::store::{DataStore, ElasticClient};

/// 폴링 루프 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// 생성됨, 아직 시작하지 않음
    Idle,
    /// 사이클 실행 중
    Running,
    /// 정지 플래그 설정됨, 진행 중인 사이클 마무리 중
    StopRequested,
    /// 종료됨 (최종 상태)
    Stopped,
}

impl LoopState {
    /// 상태 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::StopRequested => "stop_requested",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elasticsearch 규칙 기반 탐지기
///
/// # 사용 예시
/// ```ignore
/// use esguard_detector::{ElasticDetector, ElasticDetectorBuilder};
///
/// let (mut detector, event_rx) = ElasticDetectorBuilder::new()
///     .config(config)
///     .rules(rules)
///     .build()?;
///
/// detector.start().await?;
/// // ...
/// detector.request_stop();
/// detector.await_stopped(Duration::from_secs(1)).await;
/// ```
pub struct ElasticDetector {
    config: DetectorConfig,
    rules: RuleSet,
    sink: Arc<dyn EventSink>,
    stop: Arc<AtomicBool>,
    state: Arc<watch::Sender<LoopState>>,
    task: Option<JoinHandle<()>>,
}

impl ElasticDetector {
    /// 현재 상태
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// 상태 변경을 구독합니다.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// 탐지기 설정
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 로드된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 주어진 데이터 스토어로 폴링 워커를 시작합니다.
    ///
    /// # Errors
    /// 이미 시작한 적이 있으면 `AlreadyStarted`를 반환합니다.
    pub fn start_with_store<S: DataStore>(&mut self, store: S) -> Result<(), DetectorError> {
        if self.state() != LoopState::Idle {
            return Err(DetectorError::AlreadyStarted);
        }

        let poll = PollLoop::new(
            &self.config,
            self.rules.clone(),
            store,
            Arc::clone(&self.sink),
            Arc::clone(&self.stop),
        )?;

        gauge!(m::DETECTOR_RULES_LOADED).set(self.rules.len() as f64);
        self.state.send_replace(LoopState::Running);

        let state = Arc::clone(&self.state);
        self.task = Some(tokio::spawn(async move {
            poll.run().await;
            state.send_replace(LoopState::Stopped);
        }));

        tracing::info!(
            plugin = %self.config.name,
            rules = self.rules.len(),
            delay_secs = self.config.sleep_secs,
            "elastic detector started"
        );
        Ok(())
    }

    /// 정지를 요청합니다. 여러 번 호출해도 안전합니다.
    pub fn request_stop(&self) {
        let already = self.stop.swap(true, Ordering::AcqRel);
        self.state.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::StopRequested;
                true
            } else {
                false
            }
        });
        if !already {
            tracing::debug!(state = %self.state(), "scheduling detector stop");
        }
    }

    /// 워커가 `Stopped`가 되거나 `timeout`이 지날 때까지 기다립니다.
    ///
    /// 워커가 더 이상 돌고 있지 않으면 `true`를 반환합니다.
    /// 시작 전에 호출하면 경고만 남기고 바로 돌아옵니다.
    pub async fn await_stopped(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        if *rx.borrow() == LoopState::Idle {
            tracing::warn!("stopping detector that has not been started");
            return true;
        }

        match tokio::time::timeout(timeout, rx.wait_for(|s| *s == LoopState::Stopped)).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    state = %self.state(),
                    "detector did not stop within timeout"
                );
                false
            }
        }
    }

    fn fail_startup(&self, err: DetectorError) -> DetectorError {
        tracing::error!(
            url = %self.config.elastic_url,
            error = %err,
            "cannot create data store client, detector not started"
        );
        self.state.send_replace(LoopState::Stopped);
        err
    }
}

impl Pipeline for ElasticDetector {
    async fn start(&mut self) -> Result<(), EsguardError> {
        if self.state() != LoopState::Idle {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(url = %self.config.elastic_url, "starting elastic detector");

        let store = ElasticClient::new(&self.config).map_err(|e| self.fail_startup(e))?;
        self.start_with_store(store)?;
        Ok(())
    }

    /// 정지를 요청하고 `stop_timeout`만큼 기다립니다.
    ///
    /// 그 안에 끝나지 않으면 (규칙 사이 대기 중이거나 조회가 걸린 경우)
    /// 경고를 남기고 워커를 중단합니다. 정지 자체는 실패하지 않습니다.
    async fn stop(&mut self) -> Result<(), EsguardError> {
        self.request_stop();

        let timeout = self.config.stop_timeout();
        let finished = self.await_stopped(timeout).await;

        if let Some(task) = self.task.take() {
            if !finished {
                task.abort();
            }
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    tracing::warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "detector worker aborted after stop timeout"
                    );
                }
                Err(e) => tracing::error!(error = %e, "detector worker task failed"),
            }
            self.state.send_replace(LoopState::Stopped);
        }

        tracing::info!("elastic detector stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state() {
            LoopState::Running => HealthStatus::Healthy,
            LoopState::StopRequested => HealthStatus::Degraded("stop requested".to_owned()),
            LoopState::Idle => HealthStatus::Unhealthy("not started".to_owned()),
            LoopState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 탐지기 빌더
///
/// 싱크를 지정하지 않으면 [`ChannelSink`]와 수신 채널을 만들어 함께 돌려줍니다.
pub struct ElasticDetectorBuilder {
    config: DetectorConfig,
    rules: RuleSet,
    sink: Option<Arc<dyn EventSink>>,
    event_channel_capacity: usize,
}

impl ElasticDetectorBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
            rules: RuleSet::default(),
            sink: None,
            event_channel_capacity: 1024,
        }
    }

    /// 탐지기 설정을 지정합니다.
    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 탐지 규칙을 지정합니다.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// 외부 싱크를 지정합니다.
    pub fn sink(mut self, sink: impl EventSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// 이벤트 채널 용량을 설정합니다 (외부 싱크 미사용 시).
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// 탐지기를 빌드합니다.
    ///
    /// # Returns
    /// - `ElasticDetector`: 탐지기 인스턴스
    /// - `Option<mpsc::Receiver<SecurityEvent>>`: 이벤트 수신 채널
    ///   (외부 싱크를 지정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(ElasticDetector, Option<mpsc::Receiver<SecurityEvent>>), DetectorError> {
        self.config.validate()?;
        if self.event_channel_capacity == 0 {
            return Err(DetectorError::Config {
                field: "event_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.rules.is_empty() {
            tracing::warn!("building detector without rules");
        }

        let (sink, event_rx) = match self.sink {
            Some(sink) => (sink, None),
            None => {
                let (sink, rx) = ChannelSink::channel(self.event_channel_capacity);
                (Arc::new(sink) as Arc<dyn EventSink>, Some(rx))
            }
        };

        let (state, _) = watch::channel(LoopState::Idle);

        let detector = ElasticDetector {
            config: self.config,
            rules: self.rules,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
            task: None,
        };

        Ok((detector, event_rx))
    }
}

impl Default for ElasticDetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
