//! 仿真器客户端：一条持久连接上的同步请求/响应
//!
//! 每次 exchange 写一帧、读一帧；任一致命错误后实例进入断开状态，后续调用直接失败。
//! 另维护一个本地、非权威的「已隐藏对象」缓存，仅供本地便捷查询。

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::SimulatorSection;
use crate::sim::{read_frame, write_frame, Command, Response, SimError};

/// 连接所需的字节流（TCP、测试用 duplex 等）
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// 默认最大帧长（glb 以 base64 上传，需较大上限）
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

pub struct SimulatorClient {
    stream: Box<dyn Transport>,
    peer: String,
    request_timeout: Option<Duration>,
    max_frame_bytes: usize,
    broken: bool,
    hidden: Vec<String>,
}

impl std::fmt::Debug for SimulatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorClient")
            .field("peer", &self.peer)
            .field("broken", &self.broken)
            .field("hidden", &self.hidden.len())
            .finish()
    }
}

impl SimulatorClient {
    /// 按配置建立 TCP 连接（带连接超时）
    pub async fn connect(cfg: &SimulatorSection) -> Result<Self, SimError> {
        let addr = format!("{}:{}", cfg.address, cfg.port);
        let connect = TcpStream::connect(&addr);
        let stream = match tokio::time::timeout(Duration::from_secs(cfg.connect_timeout_secs), connect).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                return Err(SimError::Connect {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SimError::Connect {
                    addr,
                    reason: format!("timed out after {}s", cfg.connect_timeout_secs),
                })
            }
        };
        stream.set_nodelay(true)?;
        tracing::info!(peer = %addr, "Connected to simulator");

        let request_timeout = match cfg.request_timeout_secs {
            0 => None,
            s => Some(Duration::from_secs(s)),
        };
        Ok(Self::from_stream(stream, addr)
            .with_request_timeout(request_timeout)
            .with_max_frame_bytes(cfg.max_frame_bytes))
    }

    pub fn from_stream(stream: impl Transport + 'static, peer: impl Into<String>) -> Self {
        Self {
            stream: Box::new(stream),
            peer: peer.into(),
            request_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            broken: false,
            hidden: Vec::new(),
        }
    }

    /// None 表示无限等待
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn is_connected(&self) -> bool {
        !self.broken
    }

    /// 一次请求/响应往返；不检查 status
    pub async fn exchange(&mut self, command: &Command) -> Result<Response, SimError> {
        if self.broken {
            return Err(SimError::Disconnected);
        }
        let payload = command.to_payload();
        let max = self.max_frame_bytes;
        // 往返被中途丢弃时流上可能残留半帧或未读响应，完整读完才清除
        self.broken = true;
        let stream = &mut self.stream;
        let round_trip = async move {
            write_frame(&mut *stream, &payload).await?;
            read_frame(&mut *stream, max).await
        };

        let raw = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, round_trip).await {
                Ok(r) => r,
                Err(_) => Err(SimError::Timeout(limit)),
            },
            None => round_trip.await,
        };

        let result = raw.and_then(Response::from_payload);
        if let Err(e) = &result {
            warn!(peer = %self.peer, command = %command.name, error = %e, "Simulator connection is no longer usable");
        } else {
            self.broken = false;
            debug!(command = %command.name, "simulator exchange");
        }
        result
    }

    /// exchange + status 检查：error 转为 SimError::Remote
    pub async fn call(&mut self, command: &Command) -> Result<Map<String, Value>, SimError> {
        self.exchange(command).await?.into_result(&command.name)
    }

    /// 销毁场景中全部实体
    pub async fn reset(&mut self) -> Result<(), SimError> {
        self.call(&Command::new("reset")).await?;
        self.hidden.clear();
        Ok(())
    }

    pub async fn text_to_speech(&mut self, text: &str, voice: &str) -> Result<(), SimError> {
        self.call(
            &Command::new("text_to_speech")
                .arg("text", text)
                .arg("voice", voice),
        )
        .await?;
        Ok(())
    }

    /// 设置可见性；远端接受后更新本地隐藏缓存
    pub async fn set_object_visibility(&mut self, id: &str, visible: bool) -> Result<(), SimError> {
        self.call(
            &Command::new("set_object_visibility")
                .arg("id", id)
                .arg("visibility", visible),
        )
        .await?;
        if visible {
            self.hidden.retain(|h| h != id);
        } else if !self.hidden.iter().any(|h| h == id) {
            self.hidden.push(id.to_string());
        }
        Ok(())
    }

    /// 最近一次被设为隐藏的对象 ID（本地缓存，非权威）
    pub fn hidden_objects(&self) -> &[String] {
        &self.hidden
    }
}
