//! 长度前缀帧编解码
//!
//! 写：头 + 体拼成一个缓冲区一次写出再 flush；读：先 read_exact 4 字节头，再 read_exact L 字节体。

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::sim::SimError;

/// 长度头字节数（小端 u32）
pub const HEADER_LEN: usize = 4;

/// 编码为完整帧（长度头 + JSON 体）
pub fn encode_frame(payload: &Map<String, Value>) -> Result<Vec<u8>, SimError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| SimError::Protocol(format!("cannot encode payload: {}", e)))?;
    let len = u32::try_from(body.len())
        .map_err(|_| SimError::Protocol(format!("payload too large: {} bytes", body.len())))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// 解码帧体；必须是 JSON 对象
pub fn decode_payload(body: &[u8]) -> Result<Map<String, Value>, SimError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SimError::Protocol(format!("invalid JSON payload: {}", e)))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SimError::Protocol(format!(
            "payload is not a JSON object: {}",
            preview(&other.to_string())
        ))),
    }
}

pub async fn write_frame<W>(writer: &mut W, payload: &Map<String, Value>) -> Result<(), SimError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// 读一帧；中途断开为 Closed，零长度或超过 max_len 为协议违例
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Map<String, Value>, SimError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| eof_as_closed(e, "while reading frame header"))?;
    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(SimError::Protocol("zero-length frame".into()));
    }
    if len > max_len {
        return Err(SimError::Protocol(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| eof_as_closed(e, "while reading frame payload"))?;
    decode_payload(&body)
}

fn eof_as_closed(err: std::io::Error, stage: &'static str) -> SimError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        SimError::Closed(stage)
    } else {
        SimError::Io(err)
    }
}

fn preview(s: &str) -> String {
    if s.len() > 120 {
        format!("{}...", s.chars().take(120).collect::<String>())
    } else {
        s.to_string()
    }
}
