use std::time::Duration;

use crate::host::HostBridge;

/// 宿主就绪探测的结论
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 控件已有数据，可以抓取初始快照
    Ready,
    /// 重试次数耗尽：降级继续（快照为空，列表退回裸记录名）
    Degraded,
}

/// 有界重试的就绪探测。
///
/// 宿主挂载本扩展时可能还在加载自己的列表控件；固定间隔轮询控件
/// 是否有数据，超出次数上限后不再等待：列表可能真的为空。
pub struct ReadinessProbe {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        // 500ms x 20 ≈ 10s：覆盖宿主正常的冷启动窗口
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 20,
        }
    }
}

impl ReadinessProbe {
    pub async fn wait_ready(&self, host: &dyn HostBridge) -> ProbeOutcome {
        for attempt in 0..self.max_attempts {
            if !host.current_options().is_empty() {
                if attempt > 0 {
                    tracing::info!("Host list ready after {} probe(s)", attempt + 1);
                }
                return ProbeOutcome::Ready;
            }
            tokio::time::sleep(self.interval).await;
        }

        tracing::warn!(
            "Host list not ready after {} attempts, continuing degraded",
            self.max_attempts
        );
        ProbeOutcome::Degraded
    }
}
