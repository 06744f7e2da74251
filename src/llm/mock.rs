//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序回放预设回复；回复用完后返回一个 finish 动作，保证 ReAct 循环总能结束。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 回复耗尽时的兜底输出
pub const MOCK_FALLBACK: &str =
    "Thought: No reasoning backend is configured.\nAction: finish\nAction Input: No reasoning backend is configured, so I cannot answer that yet.";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设成功回复，按调用顺序消费
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条回复（Err 模拟后端失败）
    pub fn push_reply(&self, reply: Result<String, String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    /// 收到过的提示词（每次 complete 取最后一条消息）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let (Ok(mut seen), Some(last)) = (self.prompts.lock(), messages.last()) {
            seen.push(last.content.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Ok(MOCK_FALLBACK.to_string()))
    }
}
