//! 实体引用

use serde::Serialize;
use serde_json::{json, Value};

/// 标准子类型：按父类型查找时一并返回（如 IfcWall 包含 IfcWallStandardCase）
const SUBTYPES: &[(&str, &str)] = &[
    ("IFCWALL", "IFCWALLSTANDARDCASE"),
    ("IFCWALL", "IFCWALLELEMENTEDCASE"),
    ("IFCSLAB", "IFCSLABSTANDARDCASE"),
    ("IFCSLAB", "IFCSLABELEMENTEDCASE"),
    ("IFCDOOR", "IFCDOORSTANDARDCASE"),
    ("IFCWINDOW", "IFCWINDOWSTANDARDCASE"),
    ("IFCBEAM", "IFCBEAMSTANDARDCASE"),
    ("IFCCOLUMN", "IFCCOLUMNSTANDARDCASE"),
    ("IFCMEMBER", "IFCMEMBERSTANDARDCASE"),
    ("IFCPLATE", "IFCPLATESTANDARDCASE"),
    ("IFCOPENINGELEMENT", "IFCOPENINGSTANDARDCASE"),
];

/// 类型名规范化：大写、去空白；接受 "IfcDoor" / "IFCDOOR" / "door"
pub fn normalize_type(ty: &str) -> String {
    let upper = ty.trim().to_ascii_uppercase();
    if upper.starts_with("IFC") {
        upper
    } else {
        format!("IFC{}", upper)
    }
}

/// 实际类型是否属于目标类型（含标准子类型）
pub fn type_matches(actual: &str, wanted: &str) -> bool {
    let actual = normalize_type(actual);
    let wanted = normalize_type(wanted);
    actual == wanted
        || SUBTYPES
            .iter()
            .any(|(parent, child)| *parent == wanted && *child == actual)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub guid: String,
    /// STEP 中的类型名（大写，如 IFCDOOR）
    #[serde(rename = "type")]
    pub ifc_type: String,
    pub name: Option<String>,
}

impl Entity {
    pub fn new(guid: impl Into<String>, ifc_type: impl Into<String>, name: Option<String>) -> Self {
        Self {
            guid: guid.into(),
            ifc_type: normalize_type(&ifc_type.into()),
            name,
        }
    }

    pub fn is_a(&self, ty: &str) -> bool {
        type_matches(&self.ifc_type, ty)
    }

    /// 供脚本绑定的 JSON 形式：`{"id", "type", "name"}`
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.guid,
            "type": self.ifc_type,
            "name": self.name,
        })
    }
}
