//! 仿真器协议层：长度前缀帧、请求/响应模型、持久连接客户端
//!
//! 线上格式：4 字节小端 u32 长度 L + L 字节 UTF-8 JSON。请求总含 `command`，响应总含 `status`。
//! 协议不带请求 ID，同一时刻只能有一个未完成请求，由持有者（BuildingSession）加锁保证。

pub mod client;
pub mod command;
pub mod frame;

use std::time::Duration;

use thiserror::Error;

pub use client::{SimulatorClient, Transport};
pub use command::{Command, Response, Status};
pub use frame::{decode_payload, encode_frame, read_frame, write_frame, HEADER_LEN};

/// 协议客户端错误
///
/// 除 `Remote` 外均视为连接级致命错误：客户端实例进入断开状态，重连由调用方负责。
#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to connect to simulator at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("connection closed {0}")]
    Closed(&'static str),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("client is disconnected after an earlier failure")]
    Disconnected,

    /// 远端返回 status == "error"
    #[error("remote command '{command}' failed: {message}")]
    Remote { command: String, message: String },
}

impl SimError {
    /// 是否使当前连接不可再用
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::Remote { .. })
    }
}
