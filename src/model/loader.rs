//! 场景加载：IFC → glTF 转换、load_gltf 上传、prop 加载
//!
//! glb 与 IFC 同目录、文件名追加 `.glb`；配置了转换器且 glb 缺失或比 IFC 旧时先转换。

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::process::Command as ProcessCommand;
use tracing::info;
use uuid::Uuid;

use crate::model::{ModelError, ModelIndex};
use crate::sim::{Command, SimulatorClient};

/// prop 标签前缀，仿真端据此识别 prop ID
pub const PROP_TAG_PREFIX: &str = "Luminous:PropId:";

/// 上传时的初始位姿
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    converter: Option<PathBuf>,
}

impl ModelLoader {
    pub fn new(converter: Option<PathBuf>) -> Self {
        Self { converter }
    }

    pub fn gltf_path(ifc: &Path) -> PathBuf {
        let mut name = ifc.as_os_str().to_owned();
        name.push(".glb");
        PathBuf::from(name)
    }

    /// 确保 glb 存在且不旧于 IFC，返回 glb 路径
    pub async fn ensure_gltf(&self, ifc: &Path) -> Result<PathBuf, ModelError> {
        let glb = Self::gltf_path(ifc);
        let ifc_mtime = modified(ifc).await?.ok_or_else(|| ModelError::Io {
            path: ifc.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "IFC file not found"),
        })?;
        let stale = match modified(&glb).await? {
            Some(glb_mtime) => glb_mtime < ifc_mtime,
            None => true,
        };
        if !stale {
            return Ok(glb);
        }
        let Some(converter) = &self.converter else {
            if tokio::fs::try_exists(&glb).await.unwrap_or(false) {
                tracing::warn!(glb = %glb.display(), "glTF is older than the IFC file and no converter is configured");
                return Ok(glb);
            }
            return Err(ModelError::Converter(format!(
                "{} is missing and no converter is configured",
                glb.display()
            )));
        };

        info!(converter = %converter.display(), ifc = %ifc.display(), "Converting IFC to glTF");
        let output = ProcessCommand::new(converter)
            .arg("--use-element-guids")
            .arg("-y")
            .arg(ifc)
            .arg(&glb)
            .output()
            .await
            .map_err(|e| ModelError::Converter(format!("cannot run {}: {}", converter.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ModelError::Converter(format!(
                "exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(glb)
    }

    /// 重置场景、上传建筑 glb，并返回新的模型索引
    pub async fn load(
        &self,
        client: &mut SimulatorClient,
        ifc: &Path,
    ) -> Result<ModelIndex, ModelError> {
        let glb = self.ensure_gltf(ifc).await?;
        let data = read_base64(&glb).await?;
        let index = ModelIndex::from_path(ifc)?;

        client.reset().await?;
        let absolute = std::path::absolute(&glb).unwrap_or(glb.clone());
        let placement = Placement::default();
        client
            .call(
                &Command::new("load_gltf")
                    .arg("filename", absolute.display().to_string())
                    .arg("data", data)
                    .arg("location", json!(placement.location))
                    .arg("rotation", json!(placement.rotation))
                    .arg("scale", json!(placement.scale)),
            )
            .await?;
        info!(model = %ifc.display(), entities = index.len(), "Building loaded into simulator");
        Ok(index)
    }

    /// 上传一个 prop，返回其 ID（同时写入标签 `Luminous:PropId:<id>`）
    pub async fn load_prop(
        &self,
        client: &mut SimulatorClient,
        path: &Path,
        mut tags: Vec<String>,
        placement: &Placement,
        variant: &str,
    ) -> Result<String, ModelError> {
        let data = read_base64(path).await?;
        let prop_id = Uuid::new_v4().to_string();
        tags.push(format!("{}{}", PROP_TAG_PREFIX, prop_id));
        client
            .call(
                &Command::new("load_gltf")
                    .arg("data", data)
                    .arg("tags", Value::from(tags))
                    .arg("variant", variant)
                    .arg("location", json!(placement.location))
                    .arg("rotation", json!(placement.rotation))
                    .arg("scale", json!(placement.scale)),
            )
            .await?;
        Ok(prop_id)
    }
}

async fn modified(path: &Path) -> Result<Option<SystemTime>, ModelError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.modified().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ModelError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn read_base64(path: &Path) -> Result<String, ModelError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BASE64.encode(bytes))
}
