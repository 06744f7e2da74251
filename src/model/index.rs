//! IFC 模型索引
//!
//! 只扫描 STEP DATA 段中首参数为 22 位 GlobalId 的实体（IfcRoot 派生），记录类型与名称，
//! 不解析几何。索引加载后只读；「切换建筑」时由 BuildingSession 整体替换。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Entity, ModelError};

const GUID_LEN: usize = 22;

fn entity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*#\d+\s*=\s*([A-Za-z0-9_]+)\s*\(\s*'([^']*)'\s*,\s*[^,]*,\s*(\$|'((?:[^']|'')*)')")
            .expect("static entity pattern")
    })
}

#[derive(Debug, Clone)]
pub struct ModelIndex {
    source: PathBuf,
    entities: Vec<Entity>,
    by_guid: HashMap<String, usize>,
}

impl ModelIndex {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &String::from_utf8_lossy(&bytes))
    }

    /// 从 STEP 文本构建索引；没有 DATA 段或没有任何带 GlobalId 的实体时报错
    pub fn parse(source: impl Into<PathBuf>, text: &str) -> Result<Self, ModelError> {
        let source = source.into();
        let data = data_section(text).ok_or_else(|| {
            ModelError::Format(format!("{}: missing DATA section", source.display()))
        })?;

        let mut entities = Vec::new();
        let mut by_guid = HashMap::new();
        for stmt in split_statements(data) {
            let Some(caps) = entity_pattern().captures(stmt) else {
                continue;
            };
            let guid = &caps[2];
            if guid.len() != GUID_LEN {
                continue;
            }
            let name = caps.get(4).map(|m| m.as_str().replace("''", "'"));
            if by_guid.contains_key(guid) {
                continue;
            }
            by_guid.insert(guid.to_string(), entities.len());
            entities.push(Entity::new(guid, &caps[1], name));
        }

        if entities.is_empty() {
            return Err(ModelError::Format(format!(
                "{}: no entities with a GlobalId",
                source.display()
            )));
        }
        tracing::debug!(source = %source.display(), entities = entities.len(), "model index built");
        Ok(Self {
            source,
            entities,
            by_guid,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get_by_guid(&self, guid: &str) -> Option<&Entity> {
        self.by_guid.get(guid).map(|&i| &self.entities[i])
    }

    /// 按类型查找（含标准子类型），保持文件中的出现顺序
    pub fn find_by_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.iter().filter(move |e| e.is_a(ty))
    }
}

fn data_section(text: &str) -> Option<&str> {
    let start = text.find("DATA;")? + "DATA;".len();
    let rest = &text[start..];
    let end = rest.find("ENDSEC;").unwrap_or(rest.len());
    Some(&rest[..end])
}

/// 按字符串外的 ';' 切分语句（STEP 字符串用 '' 转义单引号）
fn split_statements(data: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in data.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            ';' if !in_string => {
                out.push(&data[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < data.len() && !data[start..].trim().is_empty() {
        out.push(&data[start..]);
    }
    out
}
