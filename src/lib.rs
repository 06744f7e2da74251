//! BIM Agent - 通过 ReAct 循环查询与修改仿真场景中的建筑模型
//!
//! 模块划分：
//! - **agent**: 助手运行时（组装组件、处理单条请求、播报回答）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、建筑会话（仿真器连接 + 模型句柄）、运行取消
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **model**: IFC 模型索引与场景加载
//! - **react**: 动作解析、提示词、ReAct 主循环
//! - **sandbox**: JSON 脚本解释器与能力表
//! - **sim**: 仿真器线协议客户端
//! - **speech**: 语音输出
//! - **tools**: 工具注册表、分发器与建筑工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod model;
pub mod observability;
pub mod react;
pub mod sandbox;
pub mod sim;
pub mod speech;
pub mod tools;

pub use agent::{build_assistant, Assistant};
