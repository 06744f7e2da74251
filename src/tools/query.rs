//! query_building：图查询
//!
//! 问题原样交给 QueryBackend；HTTP 实现 POST `{"question": ...}` 到配置的端点，
//! 响应 JSON 的 `result` 作为观察、`query` 作为产物（生成的图查询语句）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Tool, ToolDescriptor, ToolOutput};

/// 图查询后端的一次回答
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryAnswer {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub query: String,
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn answer(&self, question: &str) -> Result<QueryAnswer, String>;
}

pub struct HttpQueryBackend {
    client: Client,
    endpoint: String,
}

impl HttpQueryBackend {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn answer(&self, question: &str) -> Result<QueryAnswer, String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json::<QueryAnswer>()
            .await
            .map_err(|e| format!("Invalid query response: {}", e))
    }
}

/// 未配置端点时使用
#[derive(Debug, Default)]
pub struct UnconfiguredQueryBackend;

#[async_trait]
impl QueryBackend for UnconfiguredQueryBackend {
    async fn answer(&self, _question: &str) -> Result<QueryAnswer, String> {
        Err("the graph query backend is not configured".to_string())
    }
}

pub struct QueryBuildingTool {
    descriptor: ToolDescriptor,
    backend: Arc<dyn QueryBackend>,
}

impl QueryBuildingTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "query_building",
                "Graph Querying API",
                "Graph Querying API is used to retrieve information from the building database \
                 using natural language queries. Returns raw data from the graph database. Input should be \
                 a question about building elements, their properties, or relationships. It is also \
                 possible to query about a specific ID retrieved from the sandbox.",
                "'How many doors are there?', 'How many windows are there per floor?', \
                 'Get the height of the door with ID xyz'",
            ),
            backend,
        }
    }
}

fn result_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Null => "'No information retrieved.'".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Tool for QueryBuildingTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn announcement(&self) -> Option<&str> {
        Some("Using the query tool")
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput, String> {
        tracing::info!(question = %input, "query_building");
        let answer = self.backend.answer(input.trim()).await?;
        tracing::info!(query = %answer.query.trim(), "Graph query generated");
        Ok(ToolOutput::text(result_text(&answer.result)).with_artifact(answer.query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Fixed(QueryAnswer);

    #[async_trait]
    impl QueryBackend for Fixed {
        async fn answer(&self, _question: &str) -> Result<QueryAnswer, String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_result_is_observation_and_query_is_artifact() {
        let tool = QueryBuildingTool::new(Arc::new(Fixed(QueryAnswer {
            result: serde_json::json!([{"count(w)": 24}]),
            query: "MATCH (w:IfcWindow) RETURN count(w)".into(),
        })));
        let out = tool.execute("How many windows?").await.unwrap();
        assert_eq!(out.observation, r#"[{"count(w)":24}]"#);
        assert_eq!(out.artifact.as_deref(), Some("MATCH (w:IfcWindow) RETURN count(w)"));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_errors() {
        let tool = QueryBuildingTool::new(Arc::new(UnconfiguredQueryBackend));
        let err = tool.execute("How many windows?").await.unwrap_err();
        assert!(err.contains("not configured"));
    }

    /// 单连接 HTTP 服务：读完请求后返回固定 JSON，并把请求体交回
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let request_body = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            request_body
        });
        (format!("http://{}/query", addr), handle)
    }

    #[tokio::test]
    async fn test_http_backend_posts_question() {
        let (url, server) = serve_once(r#"{"result": "24", "query": "MATCH (w:IfcWindow) RETURN count(w)"}"#).await;
        let backend = HttpQueryBackend::new(url, 5);
        let answer = backend.answer("How many windows?").await.unwrap();
        assert_eq!(answer.result, Value::String("24".into()));
        assert!(answer.query.starts_with("MATCH"));
        let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["question"], "How many windows?");
    }
}
