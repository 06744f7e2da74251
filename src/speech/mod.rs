//! 语音输出
//!
//! 最终回答与工具播报都经由 SpeechSink；播报失败只记日志，从不影响回答本身。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::BuildingSession;

#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), String>;
}

/// 播报并吞掉错误（记 warn 日志）
pub async fn speak_or_log(sink: &dyn SpeechSink, text: &str) {
    if let Err(e) = sink.speak(text).await {
        tracing::warn!(error = %e, "Speech output failed");
    }
}

/// 通过仿真器的 text_to_speech 命令播放
pub struct SimulatorSpeech {
    session: Arc<BuildingSession>,
    voice: String,
}

impl SimulatorSpeech {
    pub fn new(session: Arc<BuildingSession>, voice: impl Into<String>) -> Self {
        Self {
            session,
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl SpeechSink for SimulatorSpeech {
    async fn speak(&self, text: &str) -> Result<(), String> {
        let mut client = self.session.lock_client().await;
        client
            .text_to_speech(text, &self.voice)
            .await
            .map_err(|e| e.to_string())
    }
}

/// 只写日志（语音关闭或无仿真器时）
#[derive(Debug, Default)]
pub struct LogSpeech;

#[async_trait]
impl SpeechSink for LogSpeech {
    async fn speak(&self, text: &str) -> Result<(), String> {
        tracing::info!(text, "speak");
        Ok(())
    }
}

/// 记录所有播报内容（测试用）
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSink for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<(), String> {
        if let Ok(mut s) = self.spoken.lock() {
            s.push(text.to_string());
        }
        Ok(())
    }
}
