//! 하위 싱크 -- 합성된 이벤트를 탐지기 밖으로 넘깁니다.
//!
//! 호출자 입장에서 `emit`은 실패하지 않습니다. 전달 실패는 싱크가 직접
//! 로그와 메트릭으로 처리합니다.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;

use esguard_core::event::SecurityEvent;
use esguard_core::metrics as m;

/// 이벤트 싱크 인터페이스
pub trait EventSink: Send + Sync + 'static {
    /// 이벤트 소유권을 싱크로 넘깁니다.
    fn emit(&self, event: SecurityEvent);
}

impl<K: EventSink + ?Sized> EventSink for Arc<K> {
    fn emit(&self, event: SecurityEvent) {
        (**self).emit(event);
    }
}

/// `tokio::mpsc` 채널로 이벤트를 보내는 싱크
///
/// 채널이 가득 찼거나 닫혔으면 이벤트를 버리고 경고를 남깁니다.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SecurityEvent>,
}

impl ChannelSink {
    /// 송신측으로 싱크를 생성합니다.
    pub fn new(tx: mpsc::Sender<SecurityEvent>) -> Self {
        Self { tx }
    }

    /// 새 채널을 만들어 싱크와 수신측을 반환합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SecurityEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                counter!(m::DETECTOR_EVENTS_DROPPED_TOTAL).increment(1);
                tracing::warn!(
                    rule = %event.rule_name,
                    event_id = %event.id,
                    "event channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                counter!(m::DETECTOR_EVENTS_DROPPED_TOTAL).increment(1);
                tracing::warn!(
                    rule = %event.rule_name,
                    event_id = %event.id,
                    "event channel closed, dropping event"
                );
            }
        }
    }
}
