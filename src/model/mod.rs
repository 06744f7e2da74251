//! 建筑模型：IFC 实体索引与场景加载
//!
//! - **entity**: 实体引用（GlobalId / 类型 / 名称）与类型判定
//! - **index**: 扫描 IFC STEP 文件得到只读 ModelIndex
//! - **loader**: 转换 glTF、上传到仿真器、加载 prop

pub mod entity;
pub mod index;
pub mod loader;

use std::path::PathBuf;

use thiserror::Error;

use crate::sim::SimError;

pub use entity::Entity;
pub use index::ModelIndex;
pub use loader::{ModelLoader, Placement};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not an IFC model: {0}")]
    Format(String),

    #[error("glTF conversion failed: {0}")]
    Converter(String),

    #[error("simulator rejected the upload: {0}")]
    Simulator(#[from] SimError),
}
