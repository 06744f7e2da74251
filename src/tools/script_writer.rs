//! 脚本生成：把自然语言请求交给推理后端，得到 JSON 步骤脚本
//!
//! 提示词 = 说明 + 能力表 + 脚本 JSON Schema + 可加载的建筑/prop 清单，随后是若干「请求 → 脚本」
//! 示例对话，最后是用户请求。检索用途只列出只读能力，并要求把结果绑定到 `result`。

use std::path::Path;
use std::sync::Arc;

use crate::llm::{LlmClient, Message};
use crate::sandbox::{capability_docs, script_schema_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPurpose {
    /// 只读，结果写入 `result`
    Retrieve,
    /// 改变场景
    Modify,
}

/// 可加载的建筑
pub const BUILDINGS: &[(&str, &str)] = &[
    ("House", "data/ifc/AC20-FZK-Haus.ifc"),
    ("School", "data/ifc/Technical_school-current_m.ifc"),
    ("Office", "data/ifc/Office Building.ifc"),
];

/// 可放置的 prop
pub const PROPS: &[(&str, &str)] = &[
    ("Barn Lamp", "data/props/AnisotropyBarnLamp.glb"),
    ("Boom box", "data/props/BoomBox.glb"),
    ("Purple chair", "data/props/ChairDamaskPurplegold.glb"),
    ("Plant", "data/props/DiffuseTransmissionPlant.glb"),
    ("Velvet sofa", "data/props/GlamVelvetSofa.glb"),
    ("Iridescence lamp", "data/props/IridescenceLamp.glb"),
    ("Punctual lamp", "data/props/LightsPunctualLamp.glb"),
    ("Sheen chair", "data/props/SheenChair.glb"),
    ("Leather sofa", "data/props/SheenWoodLeatherSofa.glb"),
    ("Pouf", "data/props/SpecularSilkPouf.glb"),
    ("Sunglasses", "data/props/SunglassesKhronos.glb"),
    ("Toy car", "data/props/ToyCar.glb"),
    ("Water bottle", "data/props/WaterBottle.glb"),
];

const MODIFY_INTRO: &str = "Your task is to fulfill a query given by the user in a 3D environment. \
The query will involve changing the features of a specific entity or entities.

To get the query done, you will write a JSON script: a list of steps that call the capabilities listed below.
* Simulator capabilities interact with the sandbox, getting information about the scene and applying changes to it.
  Capability names with the 'object' substring affect just BIM entities (e.g. walls, doors), whereas the ones with 'prop' affect only props (e.g. chairs).
* Model capabilities tell the type of an object of the scene (wall, window, door...) using the loaded building model.
* Entities have an id (the IFC GlobalId), a type and a name.

Objects returned by the simulator are objects with the keys \"id\", \"location\", \"rotation\" and \"color\".
Distances and amounts are in centimeters, colors are [r, g, b] with components between 0 and 1.

Apart from that, you can add props and transform them. These props are available:";

const RETRIEVE_INTRO: &str = "You are a script generator for retrieving building element IDs from a 3D sandbox environment.

Your task is to generate a JSON script that:
1. Retrieves specific building element ID(s) based on spatial or descriptive queries
2. Stores the ID(s) in the variable named 'result'
3. Uses only the capabilities listed below

* Simulator capabilities get information about the scene.
* Model capabilities tell the type of an object of the scene (wall, window, door...) using the loaded building model.
* Entities have an id (the IFC GlobalId), a type and a name.

Objects returned by the simulator are objects with the keys \"id\", \"location\", \"rotation\" and \"color\".";

const SCRIPT_FORMAT: &str = "Script format:
- A script is {\"steps\": [...]}; steps run in order.
- {\"op\": \"call\", \"name\": <capability>, \"args\": {...}, \"bind\": <variable>} calls a capability and optionally stores its return value.
- {\"op\": \"let\", \"name\": <variable>, \"value\": <value>} stores a value.
- {\"op\": \"for_each\", \"in\": <array>, \"as\": <variable>, \"do\": [steps]} repeats the steps for every element.
- {\"op\": \"if\", \"cond\": <value>, \"then\": [steps], \"else\": [steps]} runs \"then\" when the value is truthy (not null, false, 0, \"\", [] or {}).
- Strings starting with $ read variables: \"$doors\", \"$door.id\", \"$doors.0\". Write $$ for a literal $.";

const RETRIEVE_RULES: &str = "IMPORTANT RULES:
- Answer ONLY with the JSON script, no explanations
- Focus on retrieving IDs (GUIDs), not modifying elements
- ALWAYS store the final result in the variable named 'result'
- Return results in a clear format:
  * For single element: a string id
  * For multiple elements: an array of string ids
  * For not found: leave result unset, null or []
- Handle cases where no elements are found gracefully";

const MODIFY_RULES: &str = "Moreover, you must not give any explanation outside the script.";

/// 修改用的示例：(请求, 脚本)
pub const MODIFY_EXAMPLES: &[(&str, &str)] = &[
    (
        "Destroy all walls of the scene.",
        r#"{"steps": [
  {"op": "call", "name": "find_by_type", "args": {"type": "IfcWall"}, "bind": "walls"},
  {"op": "for_each", "in": "$walls", "as": "wall", "do": [
    {"op": "call", "name": "destroy_object", "args": {"id": "$wall.id"}}
  ]}
]}"#,
    ),
    (
        "Set the color of the nearest door and the farthest window to blue.",
        r#"{"steps": [
  {"op": "call", "name": "near_objects", "args": {"radius": 3000}, "bind": "near"},
  {"op": "call", "name": "filter_by_type", "args": {"objects": "$near", "type": "IfcDoor"}, "bind": "doors"},
  {"op": "call", "name": "filter_by_type", "args": {"objects": "$near", "type": "IfcWindow"}, "bind": "windows"},
  {"op": "call", "name": "first", "args": {"items": "$doors"}, "bind": "nearest_door"},
  {"op": "call", "name": "last", "args": {"items": "$windows"}, "bind": "farthest_window"},
  {"op": "if", "cond": "$nearest_door", "then": [
    {"op": "call", "name": "set_object_color", "args": {"id": "$nearest_door.id", "color": [0.0, 0.0, 1.0]}}
  ]},
  {"op": "if", "cond": "$farthest_window", "then": [
    {"op": "call", "name": "set_object_color", "args": {"id": "$farthest_window.id", "color": [0.0, 0.0, 1.0]}}
  ]}
]}"#,
    ),
    (
        "Hide the stairs I can see.",
        r#"{"steps": [
  {"op": "call", "name": "in_sight", "bind": "seen"},
  {"op": "call", "name": "filter_by_type", "args": {"objects": "$seen", "type": "IfcStair"}, "bind": "stairs"},
  {"op": "for_each", "in": "$stairs", "as": "stair", "do": [
    {"op": "call", "name": "set_object_visibility", "args": {"id": "$stair.id", "visibility": false}}
  ]}
]}"#,
    ),
    (
        "Load the school.",
        r#"{"steps": [
  {"op": "call", "name": "load_model", "args": {"path": "data/ifc/Technical_school-current_m.ifc"}}
]}"#,
    ),
    (
        "Place a chair in front of me and a lamp near it.",
        r#"{"steps": [
  {"op": "call", "name": "load_prop", "args": {"path": "data/props/IridescenceLamp.glb"}, "bind": "lamp"},
  {"op": "call", "name": "load_prop", "args": {"path": "data/props/ChairDamaskPurplegold.glb"}, "bind": "chair"},
  {"op": "call", "name": "move_prop_to_floor", "args": {"id": "$chair"}},
  {"op": "call", "name": "move_prop_to_floor", "args": {"id": "$lamp"}},
  {"op": "call", "name": "move_prop_forward", "args": {"id": "$lamp", "amount": 100}},
  {"op": "call", "name": "move_prop_right", "args": {"id": "$lamp", "amount": 100}}
]}"#,
    ),
    (
        "Put a sheen chair on the floor and an iridescence lamp on the wall, moving it 0.5 meters to the left.",
        r#"{"steps": [
  {"op": "call", "name": "load_prop", "args": {"path": "data/props/SheenChair.glb"}, "bind": "chair"},
  {"op": "call", "name": "move_prop_to_floor", "args": {"id": "$chair"}},
  {"op": "call", "name": "load_prop", "args": {"path": "data/props/IridescenceLamp.glb"}, "bind": "lamp"},
  {"op": "call", "name": "move_prop_to_wall", "args": {"id": "$lamp"}},
  {"op": "call", "name": "move_prop_right", "args": {"id": "$lamp", "amount": -50}}
]}"#,
    ),
    (
        "Color the wall in front of me red.",
        r#"{"steps": [
  {"op": "call", "name": "front_object", "args": {"distance": 1000}, "bind": "front"},
  {"op": "if", "cond": "$front", "then": [
    {"op": "call", "name": "is_type", "args": {"id": "$front", "type": "IfcWall"}, "bind": "is_wall"},
    {"op": "if", "cond": "$is_wall", "then": [
      {"op": "call", "name": "set_object_color", "args": {"id": "$front.id", "color": [1.0, 0.0, 0.0]}}
    ]}
  ]}
]}"#,
    ),
    (
        "Show everything that is hidden.",
        r#"{"steps": [
  {"op": "call", "name": "get_hidden_objects", "bind": "hidden"},
  {"op": "for_each", "in": "$hidden", "as": "id", "do": [
    {"op": "call", "name": "set_object_visibility", "args": {"id": "$id", "visibility": true}}
  ]}
]}"#,
    ),
];

/// 检索用的示例：(请求, 脚本)
pub const RETRIEVE_EXAMPLES: &[(&str, &str)] = &[
    (
        "Get the ID of the object in front of me",
        r#"{"steps": [
  {"op": "call", "name": "front_object", "args": {"distance": 1000.0}, "bind": "front"},
  {"op": "if", "cond": "$front", "then": [
    {"op": "let", "name": "result", "value": "$front.id"}
  ]}
]}"#,
    ),
    (
        "Find all window IDs",
        r#"{"steps": [
  {"op": "call", "name": "find_by_type", "args": {"type": "IfcWindow"}, "bind": "windows"},
  {"op": "call", "name": "ids", "args": {"items": "$windows"}, "bind": "result"}
]}"#,
    ),
    (
        "Find the ID of the door in front of me",
        r#"{"steps": [
  {"op": "call", "name": "front_object", "args": {"distance": 1000.0}, "bind": "front"},
  {"op": "if", "cond": "$front", "then": [
    {"op": "call", "name": "is_type", "args": {"id": "$front", "type": "IfcDoor"}, "bind": "is_door"},
    {"op": "if", "cond": "$is_door", "then": [
      {"op": "let", "name": "result", "value": "$front.id"}
    ]}
  ]}
]}"#,
    ),
    (
        "Get all beam IDs currently visible",
        r#"{"steps": [
  {"op": "call", "name": "in_sight", "bind": "seen"},
  {"op": "call", "name": "filter_by_type", "args": {"objects": "$seen", "type": "IfcBeam"}, "bind": "beams"},
  {"op": "call", "name": "ids", "args": {"items": "$beams"}, "bind": "result"}
]}"#,
    ),
    (
        "Find the ID of the wall closest to me",
        r#"{"steps": [
  {"op": "call", "name": "near_objects", "args": {"radius": 1000.0}, "bind": "near"},
  {"op": "call", "name": "filter_by_type", "args": {"objects": "$near", "type": "IfcWall"}, "bind": "walls"},
  {"op": "call", "name": "first", "args": {"items": "$walls"}, "bind": "wall"},
  {"op": "if", "cond": "$wall", "then": [
    {"op": "let", "name": "result", "value": "$wall.id"}
  ]}
]}"#,
    ),
];

fn catalog(title: &str, entries: &[(&str, &str)]) -> String {
    let mut out = format!("{}\n", title);
    for (label, path) in entries {
        out.push_str(&format!("* {}: \"{}\"\n", label, path));
    }
    out
}

/// 当前会话中已加载的建筑
fn loaded_line(loaded: Option<&Path>) -> String {
    match loaded {
        Some(path) => format!("The building \"{}\" is currently loaded.", path.display()),
        None => "No building is currently loaded, so model capabilities will fail until one is loaded.".to_string(),
    }
}

/// 组装某一用途的完整对话（说明、示例对话、用户请求）
///
/// `loaded` 为会话当前模型的来源文件，写进说明里
pub fn script_messages(purpose: ScriptPurpose, request: &str, loaded: Option<&Path>) -> Vec<Message> {
    let buildings = catalog(
        "The following buildings can be loaded, but load them only when prompted to do so:",
        BUILDINGS,
    );
    let (instructions, ack, examples) = match purpose {
        ScriptPurpose::Modify => (
            format!(
                "{}\n{}\n{}\n\n{}\n\nJSON Schema of a script:\n{}\n\n{}\n{}\n\n{}",
                MODIFY_INTRO,
                catalog("", PROPS).trim_start(),
                capability_docs(false),
                SCRIPT_FORMAT,
                script_schema_json(),
                buildings,
                loaded_line(loaded),
                MODIFY_RULES
            ),
            "Alright, from now on I will answer just by writing JSON scripts.",
            MODIFY_EXAMPLES,
        ),
        ScriptPurpose::Retrieve => (
            format!(
                "{}\n\n{}\n\n{}\n\nJSON Schema of a script:\n{}\n\n{}\n\n{}",
                RETRIEVE_INTRO,
                capability_docs(true),
                SCRIPT_FORMAT,
                script_schema_json(),
                loaded_line(loaded),
                RETRIEVE_RULES
            ),
            "Alright, from now on I will answer just by writing JSON scripts to retrieve IDs.",
            RETRIEVE_EXAMPLES,
        ),
    };

    let mut messages = vec![Message::user(instructions), Message::assistant(ack)];
    for (question, script) in examples {
        messages.push(Message::user(*question));
        messages.push(Message::assistant(format!("```json\n{}\n```", script)));
    }
    messages.push(Message::user(request));
    messages
}

/// 去掉模型附带的解释段
fn strip_explanation(output: &str) -> &str {
    match output.find("**Explanation:**") {
        Some(idx) => &output[..idx],
        None => output,
    }
    .trim()
}

pub struct ScriptWriter {
    llm: Arc<dyn LlmClient>,
}

impl ScriptWriter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn write(
        &self,
        purpose: ScriptPurpose,
        request: &str,
        loaded: Option<&Path>,
    ) -> Result<String, String> {
        let messages = script_messages(purpose, request, loaded);
        let output = self.llm.complete(&messages).await?;
        Ok(strip_explanation(&output).to_string())
    }
}
