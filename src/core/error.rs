//! 顶层错误类型
//!
//! 各层有各自的错误枚举（SimError / ModelError / ExecutionError），组装阶段的失败在此汇总；
//! ReAct 循环内部的失败不会以 AgentError 形式外泄，而是转为降级回答。

use thiserror::Error;

use crate::model::ModelError;
use crate::sim::SimError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Simulator error: {0}")]
    Simulator(#[from] SimError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
