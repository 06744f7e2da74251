//! 能力表：脚本可调用的全部操作
//!
//! 远端能力按名称透传为仿真器命令（参数键即线上键），本地能力只读写模型句柄与脚本内的值。
//! 表外名称一律拒绝。

use std::fmt::Write as _;

/// 远端响应中取回的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    /// 只确认成功，脚本得到 true
    Ack,
    /// 取响应中的某个键，缺失即错误
    Key(&'static str),
    /// 取响应中的某个键，缺失时为 null
    OptionalKey(&'static str),
    /// 整个响应（去掉 status）
    Whole,
}

#[derive(Debug)]
pub struct RemoteCapability {
    pub name: &'static str,
    pub required: &'static [&'static str],
    /// (键, JSON 默认值)
    pub optional: &'static [(&'static str, &'static str)],
    pub returns: Returns,
    /// 只读能力才出现在检索提示词中
    pub read_only: bool,
    pub doc: &'static str,
}

const fn remote(
    name: &'static str,
    required: &'static [&'static str],
    returns: Returns,
    read_only: bool,
    doc: &'static str,
) -> RemoteCapability {
    RemoteCapability {
        name,
        required,
        optional: &[],
        returns,
        read_only,
        doc,
    }
}

const fn remote_opt(
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [(&'static str, &'static str)],
    returns: Returns,
    read_only: bool,
    doc: &'static str,
) -> RemoteCapability {
    RemoteCapability {
        name,
        required,
        optional,
        returns,
        read_only,
        doc,
    }
}

use Returns::{Ack, Key, OptionalKey, Whole};

pub const REMOTE: &[RemoteCapability] = &[
    // 相机
    remote("move_to", &["location"], Ack, false, "Moves the camera to the global coordinates [x, y, z]."),
    remote("move_relative_to", &["location"], Ack, false, "Moves the camera by adding [x, y, z] to its current location."),
    remote("move_forward", &["amount"], Ack, false, "Moves the camera forward (backward if negative)."),
    remote("move_right", &["amount"], Ack, false, "Moves the camera right (left if negative)."),
    remote("move_up", &["amount"], Ack, false, "Moves the camera up (down if negative)."),
    remote("rotate_to", &["rotation"], Ack, false, "Rotates the camera to [pitch, yaw, roll] in degrees."),
    remote("rotate_relative_to", &["rotation"], Ack, false, "Adds [pitch, yaw, roll] to the camera rotation."),
    remote("look_at", &["id"], Ack, false, "Rotates the camera to look at the object."),
    // 场景查询
    remote("in_sight", &[], Key("objects"), true, "Objects in the camera's field of view."),
    remote("props_in_sight", &[], Key("props"), true, "Props in the camera's field of view."),
    remote("all_objects", &[], Key("objects"), true, "All objects in the scene."),
    remote("all_props", &[], Key("props"), true, "All props in the scene."),
    remote("near_objects", &["radius"], Key("objects"), true, "Objects within radius of the camera, closest first."),
    remote("near_object_objects", &["id", "radius"], Key("objects"), true, "Objects within radius of the object, closest first."),
    remote("near_props", &["radius"], Key("props"), true, "Props within radius of the camera, closest first."),
    remote("near_object_props", &["id", "radius"], Key("props"), true, "Props within radius of the object, closest first."),
    remote("whereami", &[], Whole, true, "Current camera location and rotation."),
    remote("get_camera_view", &[], Whole, true, "Current camera position and rotations."),
    remote("mouse_status", &[], Whole, true, "Current mouse state."),
    remote("front_object", &["distance"], OptionalKey("object"), true, "Object in front of the camera closer than distance, or null."),
    remote_opt("under_cursor_object", &[], &[("distance", "10000")], OptionalKey("object"), true, "Object under the cursor, or null."),
    remote("get_object_info", &["id"], Key("info"), true, "Information about the object (location, rotation, color)."),
    remote("get_prop_info", &["id"], Key("info"), true, "Information about the prop."),
    remote("distance", &["id"], Key("distance"), true, "Distance from the camera to the object in cm."),
    remote("distance_object", &["id", "id2"], Key("distance"), true, "Distance between two objects in cm."),
    remote("dot", &["id", "id2"], Key("dot"), true, "Dot product of the vectors pointing at the two objects."),
    // 对象编辑
    remote("move_object_to", &["id", "location"], Ack, false, "Moves the object to [x, y, z]."),
    remote("move_object_relative_to", &["id", "location"], Ack, false, "Moves the object by [x, y, z]."),
    remote("rotate_object_to", &["id", "rotation"], Ack, false, "Rotates the object to [pitch, yaw, roll]."),
    remote("rotate_object_relative_to", &["id", "rotation"], Ack, false, "Adds [pitch, yaw, roll] to the object rotation."),
    remote("scale_object_to", &["id", "scale"], Ack, false, "Sets the object scale to [x, y, z]."),
    remote("scale_object_relative_to", &["id", "scale"], Ack, false, "Multiplies the object scale by [x, y, z]."),
    remote("set_object_color", &["id", "color"], Ack, false, "Sets the object color to [r, g, b] in 0..1."),
    remote("set_object_visibility", &["id", "visibility"], Ack, false, "Shows (true) or hides (false) the object."),
    remote_opt("set_object_wireframe", &["id", "wireframe"], &[("color", "[1, 0, 0, 1]")], Ack, false, "Toggles wireframe rendering with an [r, g, b, a] color."),
    remote("destroy_object", &["id"], Ack, false, "Removes the object from the scene."),
    // prop
    remote("move_prop_to_wall", &["id"], Ack, false, "Moves the prop to the nearest wall in the camera direction."),
    remote("move_prop_to_floor", &["id"], Ack, false, "Moves the prop to the floor in the camera direction."),
    remote("destroy_prop", &["id"], Ack, false, "Removes the prop."),
    remote_opt("rotate_prop_yaw", &["id"], &[("yaw", "90")], Ack, false, "Rotates the prop around the vertical axis."),
    remote("move_prop_up", &["id", "amount"], Ack, false, "Moves the prop up by amount cm."),
    remote("move_prop_right", &["id", "amount"], Ack, false, "Moves the prop right by amount cm."),
    remote("move_prop_forward", &["id", "amount"], Ack, false, "Moves the prop forward by amount cm."),
    remote("scale_prop", &["id", "amount"], Ack, false, "Scales the prop to amount."),
    // 其他
    remote_opt("text_to_speech", &["text"], &[("voice", "\"\"")], Ack, false, "Speaks the text inside the simulator."),
    remote("reset", &[], Ack, false, "Destroys all entities and resets the camera."),
];

/// 本地能力：不直接对应单条仿真器命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    GetHiddenObjects,
    LoadModel,
    LoadProp,
    FindByType,
    GetByGuid,
    Entity,
    FilterByType,
    IsType,
    Count,
    First,
    Last,
    Ids,
    Contains,
    Eq,
    Lt,
    Gt,
    Not,
}

#[derive(Debug)]
pub struct LocalCapability {
    pub name: &'static str,
    pub op: LocalOp,
    pub signature: &'static str,
    pub read_only: bool,
    pub doc: &'static str,
}

pub const LOCAL: &[LocalCapability] = &[
    LocalCapability { name: "get_hidden_objects", op: LocalOp::GetHiddenObjects, signature: "()", read_only: true, doc: "Ids of the objects last set to hidden." },
    LocalCapability { name: "load_model", op: LocalOp::LoadModel, signature: "(path)", read_only: false, doc: "Resets the scene and loads the IFC building at path. Later calls see the new model." },
    LocalCapability { name: "load_prop", op: LocalOp::LoadProp, signature: "(path, tags=[], variant=\"\", location=[0,0,0], rotation=[0,0,0], scale=[1,1,1])", read_only: false, doc: "Loads a glb prop and returns its prop id." },
    LocalCapability { name: "find_by_type", op: LocalOp::FindByType, signature: "(type)", read_only: true, doc: "Entities of the IFC type (e.g. IfcWall, IfcDoor, IfcWindow), subtypes included." },
    LocalCapability { name: "get_by_guid", op: LocalOp::GetByGuid, signature: "(id)", read_only: true, doc: "The model entity with this GlobalId, or null." },
    LocalCapability { name: "entity", op: LocalOp::Entity, signature: "(id)", read_only: true, doc: "Entity reference for an id or an object; type and name are null when the model does not know it." },
    LocalCapability { name: "filter_by_type", op: LocalOp::FilterByType, signature: "(objects, type)", read_only: true, doc: "Keeps the objects (or ids) whose model entity is of the type, preserving order." },
    LocalCapability { name: "is_type", op: LocalOp::IsType, signature: "(id, type)", read_only: true, doc: "Whether the object (or id) is of the IFC type." },
    LocalCapability { name: "count", op: LocalOp::Count, signature: "(items)", read_only: true, doc: "Number of elements (0 for null)." },
    LocalCapability { name: "first", op: LocalOp::First, signature: "(items)", read_only: true, doc: "First element, or null." },
    LocalCapability { name: "last", op: LocalOp::Last, signature: "(items)", read_only: true, doc: "Last element, or null." },
    LocalCapability { name: "ids", op: LocalOp::Ids, signature: "(items)", read_only: true, doc: "The id of every element (objects, entities or id strings)." },
    LocalCapability { name: "contains", op: LocalOp::Contains, signature: "(items, value)", read_only: true, doc: "Whether items contains value (compared by id when both have one)." },
    LocalCapability { name: "eq", op: LocalOp::Eq, signature: "(left, right)", read_only: true, doc: "left == right." },
    LocalCapability { name: "lt", op: LocalOp::Lt, signature: "(left, right)", read_only: true, doc: "left < right for numbers." },
    LocalCapability { name: "gt", op: LocalOp::Gt, signature: "(left, right)", read_only: true, doc: "left > right for numbers." },
    LocalCapability { name: "not", op: LocalOp::Not, signature: "(value)", read_only: true, doc: "Logical negation of the value's truthiness." },
];

#[derive(Debug, Clone, Copy)]
pub enum Capability {
    Remote(&'static RemoteCapability),
    Local(&'static LocalCapability),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Remote(c) => c.name,
            Capability::Local(c) => c.name,
        }
    }

    /// 不改变场景
    pub fn read_only(&self) -> bool {
        match self {
            Capability::Remote(c) => c.read_only,
            Capability::Local(c) => c.read_only,
        }
    }
}

/// 按名称查找能力（大小写敏感）
pub fn lookup(name: &str) -> Option<Capability> {
    if let Some(local) = LOCAL.iter().find(|c| c.name == name) {
        return Some(Capability::Local(local));
    }
    REMOTE
        .iter()
        .find(|c| c.name == name)
        .map(Capability::Remote)
}

/// 生成提示词用的能力说明；`read_only_only` 时只列出不改变场景的能力
pub fn capability_docs(read_only_only: bool) -> String {
    let mut out = String::from("Simulator capabilities:\n");
    for cap in REMOTE.iter().filter(|c| c.read_only || !read_only_only) {
        let mut args: Vec<String> = cap.required.iter().map(|a| a.to_string()).collect();
        args.extend(cap.optional.iter().map(|(k, v)| format!("{}={}", k, v)));
        let returns = match cap.returns {
            Ack => "true".to_string(),
            Key(k) => format!("response.{}", k),
            OptionalKey(k) => format!("response.{} or null", k),
            Whole => "response object".to_string(),
        };
        let _ = writeln!(out, "- {}({}) -> {}: {}", cap.name, args.join(", "), returns, cap.doc);
    }
    out.push_str("\nModel and helper capabilities:\n");
    for cap in LOCAL.iter().filter(|c| c.read_only || !read_only_only) {
        let _ = writeln!(out, "- {}{}: {}", cap.name, cap.signature, cap.doc);
    }
    out
}
