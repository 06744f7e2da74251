//! 建筑会话：进程内唯一的仿真器连接与当前模型句柄
//!
//! 连接由异步互斥锁保护（协议无请求 ID，同一时刻只能有一个未完成请求）；
//! 模型句柄在多次运行间保留，可被脚本中的 load_model 整体替换。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::info;

use crate::config::SimulatorSection;
use crate::model::{ModelError, ModelIndex, ModelLoader};
use crate::sim::{SimError, SimulatorClient};

#[derive(Debug)]
pub struct BuildingSession {
    client: Mutex<SimulatorClient>,
    model: RwLock<Option<Arc<ModelIndex>>>,
    loader: ModelLoader,
    sim_config: SimulatorSection,
}

impl BuildingSession {
    pub fn new(client: SimulatorClient, loader: ModelLoader, sim_config: SimulatorSection) -> Self {
        Self {
            client: Mutex::new(client),
            model: RwLock::new(None),
            loader,
            sim_config,
        }
    }

    /// 按配置连接仿真器
    pub async fn connect(sim_config: &SimulatorSection, loader: ModelLoader) -> Result<Self, SimError> {
        let client = SimulatorClient::connect(sim_config).await?;
        Ok(Self::new(client, loader, sim_config.clone()))
    }

    /// 独占连接；守卫存活期间其他调用方等待
    pub async fn lock_client(&self) -> MutexGuard<'_, SimulatorClient> {
        self.client.lock().await
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    /// 当前加载的建筑（未加载时为 None）
    pub async fn model(&self) -> Option<Arc<ModelIndex>> {
        self.model.read().await.clone()
    }

    pub async fn replace_model(&self, index: Arc<ModelIndex>) {
        info!(source = %index.source().display(), entities = index.len(), "Model handle replaced");
        *self.model.write().await = Some(index);
    }

    /// 重置场景并加载新的建筑，成功后替换模型句柄
    pub async fn reset_model(&self, ifc: &Path) -> Result<Arc<ModelIndex>, ModelError> {
        let index = {
            let mut client = self.client.lock().await;
            self.loader.load(&mut client, ifc).await?
        };
        let index = Arc::new(index);
        self.replace_model(index.clone()).await;
        Ok(index)
    }

    /// 重新建立连接，替换已断开的客户端
    pub async fn reconnect(&self) -> Result<(), SimError> {
        let fresh = SimulatorClient::connect(&self.sim_config).await?;
        *self.client.lock().await = fresh;
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_model_handle_starts_empty_and_is_replaced() {
        let (client_end, _server_end) = tokio::io::duplex(64);
        let session = BuildingSession::new(
            SimulatorClient::from_stream(client_end, "test"),
            ModelLoader::default(),
            SimulatorSection::default(),
        );
        assert!(session.model().await.is_none());

        let text = "DATA;\n#1= IFCDOOR('1TAGlQkKXEnQ4lBJfHnOcM',#2,'D1',$);\nENDSEC;";
        let index = Arc::new(ModelIndex::parse("a.ifc", text).unwrap());
        session.replace_model(index).await;
        assert_eq!(session.model().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let (client_end, _server_end) = tokio::io::duplex(64);
        let cfg = SimulatorSection {
            port,
            connect_timeout_secs: 1,
            ..SimulatorSection::default()
        };
        let session = BuildingSession::new(
            SimulatorClient::from_stream(client_end, "test"),
            ModelLoader::default(),
            cfg,
        );
        assert!(matches!(session.reconnect().await, Err(SimError::Connect { .. })));
    }
}
