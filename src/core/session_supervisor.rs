//! 运行监管：为每次用户请求发放 CancellationToken，Ctrl+C 时取消当前运行

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一次运行，返回其取消令牌（替换上一次的令牌）
    pub fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some(token.clone());
        }
        token
    }

    /// 运行结束，清空令牌（之后的 Ctrl+C 视为空闲）
    pub fn end_run(&self) {
        if let Ok(mut slot) = self.current.lock() {
            *slot = None;
        }
    }

    /// 取消当前运行；没有运行时返回 false
    pub fn cancel(&self) -> bool {
        let Ok(slot) = self.current.lock() else {
            return false;
        };
        match slot.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }
}
