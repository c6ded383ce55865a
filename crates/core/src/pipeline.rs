//! 파이프라인 trait — 모듈 생명주기 확장 포인트 정의

use serde::{Deserialize, Serialize};

use crate::error::EsguardError;

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작하지만 성능 저하 또는 부분 장애
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 데몬이 관리하는 모든 모듈이 구현하는 생명주기 trait
///
/// `esguard-daemon`은 이 trait을 통해 모듈을 시작/정지하고 상태를 조회합니다.
#[allow(async_fn_in_trait)]
pub trait Pipeline: Send {
    /// 모듈을 시작합니다.
    async fn start(&mut self) -> Result<(), EsguardError>;

    /// 모듈을 정지합니다.
    ///
    /// 진행 중인 작업이 끝날 때까지 대기할 수 있습니다.
    async fn stop(&mut self) -> Result<(), EsguardError>;

    /// 현재 헬스 상태를 반환합니다.
    async fn health_check(&self) -> HealthStatus;
}
