//! 端到端：TCP 仿真器替身 + 脚本化推理后端

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bim_agent::config::AppConfig;
use bim_agent::core::{AgentError, BuildingSession};
use bim_agent::llm::MockLlmClient;
use bim_agent::model::ModelLoader;
use bim_agent::react::{AbortReason, RunStatus};
use bim_agent::sandbox::SUCCESS_SENTINEL;
use bim_agent::sim::{read_frame, write_frame, Command, Response};
use bim_agent::{build_assistant, Assistant};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const DOOR: &str = "1TAGlQkKXEnQ4lBJfHnOcM";

const HOUSE: &str = "ISO-10303-21;\nDATA;\n\
#10= IFCDOOR('1TAGlQkKXEnQ4lBJfHnOcM',#2,'Door-1',$);\n\
#11= IFCWINDOW('0LV8Pg$bXDXgDaaGRXNl$H',#2,'Window-1',$);\n\
#12= IFCWALLSTANDARDCASE('2XPyKWY018sA1ygZKgQPtU',#2,'Wall-1',$);\n\
ENDSEC;\nEND-ISO-10303-21;\n";

type Seen = Arc<Mutex<Vec<Command>>>;

fn ok_with(v: Value) -> Response {
    match v {
        Value::Object(map) => Response::ok(map),
        _ => Response::ok(Default::default()),
    }
}

fn reply_for(req: &Command) -> Response {
    match req.name.as_str() {
        "in_sight" => ok_with(json!({"objects": [
            {"id": DOOR, "location": [0, 0, 0], "rotation": [0, 0, 0], "color": [1, 1, 1]},
            {"id": "0LV8Pg$bXDXgDaaGRXNl$H", "location": [1, 0, 0], "rotation": [0, 0, 0], "color": [1, 1, 1]}
        ]})),
        "front_object" => ok_with(json!({"object": {"id": DOOR, "location": [0, 0, 0]}})),
        "distance" => ok_with(json!({"distance": 4.5})),
        "teleport" => Response::error("unknown command"),
        _ => ok_with(json!({})),
    }
}

/// 在 127.0.0.1 上起一个仿真器替身，记录收到的每个请求
async fn fake_simulator() -> (u16, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                while let Ok(req) = read_frame(&mut stream, 1 << 24).await {
                    let Ok(cmd) = Command::from_payload(req) else { break };
                    // 卡住的命令：永不回复，迫使工具超时
                    if cmd.name == "whereami" {
                        log.lock().unwrap().push(cmd);
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        break;
                    }
                    let reply = reply_for(&cmd).to_payload();
                    log.lock().unwrap().push(cmd);
                    if write_frame(&mut stream, &reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (port, seen)
}

fn commands(seen: &Seen) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

fn spoken(seen: &Seen) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|c| c.name == "text_to_speech")
        .filter_map(|c| c.arguments.get("text").and_then(Value::as_str).map(String::from))
        .collect()
}

fn house_files(dir: &tempfile::TempDir) -> PathBuf {
    let ifc = dir.path().join("house.ifc");
    std::fs::write(&ifc, HOUSE).unwrap();
    std::fs::write(ModelLoader::gltf_path(&ifc), b"glTF-binary").unwrap();
    ifc
}

fn config(port: u16) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.simulator.port = port;
    cfg.simulator.connect_timeout_secs = 2;
    cfg.simulator.request_timeout_secs = 5;
    cfg.tools.tool_timeout_secs = 10;
    cfg.llm.timeouts.request = 10;
    cfg
}

async fn assistant_with(cfg: &AppConfig, ifc: &PathBuf, replies: &[&str]) -> Assistant {
    let session = Arc::new(
        BuildingSession::connect(&cfg.simulator, ModelLoader::default())
            .await
            .unwrap(),
    );
    session.reset_model(ifc).await.unwrap();
    let llm = Arc::new(MockLlmClient::with_replies(replies.iter().copied()));
    Assistant::assemble(cfg, llm, session)
}

#[tokio::test]
async fn test_modify_request_hides_door_and_speaks() {
    let (port, seen) = fake_simulator().await;
    let dir = tempfile::tempdir().unwrap();
    let ifc = house_files(&dir);
    let cfg = config(port);

    let script = r#"{"steps": [
        {"op": "call", "name": "in_sight", "bind": "seen"},
        {"op": "call", "name": "filter_by_type", "args": {"objects": "$seen", "type": "IfcDoor"}, "bind": "doors"},
        {"op": "for_each", "in": "$doors", "as": "door", "do": [
            {"op": "call", "name": "set_object_visibility", "args": {"id": "$door.id", "visibility": false}}
        ]}
    ]}"#;
    let assistant = assistant_with(
        &cfg,
        &ifc,
        &[
            "Thought: This is a direct modification request.\nAction: modify_building\nAction Input: Hide the door I can see",
            script,
            "Thought: Done.\nAction: finish\nAction Input: I've hidden the door.",
        ],
    )
    .await;

    let outcome = assistant.handle("Hide the door I can see").await;
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(outcome.answer, "I've hidden the door.");
    assert_eq!(outcome.steps[0].observation, SUCCESS_SENTINEL);
    assert_eq!(outcome.steps[0].artifact.as_deref(), Some(script));

    let cmds = commands(&seen);
    assert_eq!(&cmds[..2], &["reset", "load_gltf"]);
    assert!(cmds.contains(&"set_object_visibility".to_string()));
    let hide = seen
        .lock()
        .unwrap()
        .iter()
        .find(|c| c.name == "set_object_visibility")
        .cloned()
        .unwrap();
    assert_eq!(hide.arguments["id"], json!(DOOR));
    assert_eq!(hide.arguments["visibility"], json!(false));

    let client = assistant.session().lock_client().await;
    assert_eq!(client.hidden_objects(), &[DOOR.to_string()]);
    drop(client);

    assert_eq!(
        spoken(&seen),
        vec!["Using the modification tool".to_string(), "I've hidden the door.".to_string()]
    );
}

#[tokio::test]
async fn test_retrieve_then_query_chain() {
    let (port, seen) = fake_simulator().await;
    let dir = tempfile::tempdir().unwrap();
    let ifc = house_files(&dir);
    let cfg = config(port);

    let script = r#"{"steps": [
        {"op": "call", "name": "front_object", "args": {"distance": 1000.0}, "bind": "front"},
        {"op": "if", "cond": "$front", "then": [
            {"op": "call", "name": "is_type", "args": {"id": "$front", "type": "IfcDoor"}, "bind": "is_door"},
            {"op": "if", "cond": "$is_door", "then": [
                {"op": "let", "name": "result", "value": "$front.id"}
            ]}
        ]}
    ]}"#;
    let assistant = assistant_with(
        &cfg,
        &ifc,
        &[
            "Thought: Find the door first.\nAction: retrieve_building\nAction Input: Get the ID of the door in front of me",
            script,
            "Thought: Now query it.\nAction: query_building\nAction Input: What is the height of the door with ID 1TAGlQkKXEnQ4lBJfHnOcM?",
            "Thought: The query service is down.\nAction: finish\nAction Input: The door in front of you is 1TAGlQkKXEnQ4lBJfHnOcM, but I could not look up its height.",
        ],
    )
    .await;

    let outcome = assistant.handle("What is the height of the door in front of me?").await;
    assert!(outcome.is_finished());
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(outcome.steps[0].observation, DOOR);
    assert!(outcome.steps[1].observation.starts_with("Error executing query_building:"));
    assert!(outcome.steps[1].observation.contains("not configured"));

    let said = spoken(&seen);
    assert_eq!(said[0], "Using the retrieve tool");
    assert_eq!(said[1], "Using the query tool");
    assert!(said[2].starts_with("The door in front of you"));
}

#[tokio::test]
async fn test_run_budget_is_enforced_end_to_end() {
    let (port, _seen) = fake_simulator().await;
    let dir = tempfile::tempdir().unwrap();
    let ifc = house_files(&dir);
    let mut cfg = config(port);
    cfg.agent.max_iterations = 2;
    cfg.speech.announce_tools = false;

    let assistant = assistant_with(
        &cfg,
        &ifc,
        &[
            "Thought: go\nAction: teleport_building\nAction Input: roof",
            "Thought: again\nAction: teleport_building\nAction Input: roof",
        ],
    )
    .await;

    let outcome = assistant.handle("Take me to the roof").await;
    assert_eq!(outcome.status, RunStatus::Aborted(AbortReason::MaxIterations));
    assert_eq!(outcome.steps.len(), 2);
    assert!(outcome.answer.contains("max iterations"));
    assert!(outcome.answer.contains("not found"));
}

#[tokio::test]
async fn test_next_run_reconnects_after_tool_timeout() {
    let (port, seen) = fake_simulator().await;
    let dir = tempfile::tempdir().unwrap();
    let ifc = house_files(&dir);
    let mut cfg = config(port);
    cfg.tools.tool_timeout_secs = 1;
    cfg.speech.announce_tools = false;

    let stuck = r#"[{"op": "call", "name": "whereami", "bind": "result"}]"#;
    let distance = r#"[{"op": "call", "name": "distance", "args": {"id": "1TAGlQkKXEnQ4lBJfHnOcM"}, "bind": "result"}]"#;
    let assistant = assistant_with(
        &cfg,
        &ifc,
        &[
            "Thought: Where am I?\nAction: retrieve_building\nAction Input: Get my location",
            stuck,
            "Thought: The tool is stuck.\nAction: finish\nAction Input: I could not find your location.",
            "Thought: Measure it.\nAction: retrieve_building\nAction Input: Distance to the door",
            distance,
            "Thought: Done.\nAction: finish\nAction Input: The door is 4.5 units away.",
        ],
    )
    .await;

    let first = assistant.handle("Where am I?").await;
    assert!(first.is_finished());
    assert!(first.steps[0].observation.contains("timed out"));
    assert!(!assistant.session().is_connected().await);

    let second = assistant.handle("How far is the door?").await;
    assert!(second.is_finished());
    assert!(assistant.session().is_connected().await);
    // 读到的是本次 distance 的响应，而不是上一次卡住的请求
    assert_eq!(second.steps[0].observation, "4.5");
    assert_eq!(second.answer, "The door is 4.5 units away.");

    let cmds = commands(&seen);
    assert_eq!(cmds.iter().filter(|c| *c == "whereami").count(), 1);
    assert!(cmds.contains(&"distance".to_string()));
    assert_eq!(spoken(&seen), vec!["The door is 4.5 units away.".to_string()]);
}

#[tokio::test]
async fn test_build_assistant_with_mock_backend() {
    let (port, seen) = fake_simulator().await;
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(port);
    cfg.llm.provider = "mock".into();
    cfg.model.ifc_path = Some(house_files(&dir));

    let assistant = build_assistant(&cfg).await.unwrap();
    assert_eq!(
        assistant.tool_names(),
        vec!["query_building", "retrieve_building", "modify_building"]
    );
    assert_eq!(assistant.session().model().await.map(|m| m.len()), Some(3));

    let outcome = assistant.handle("How many windows are there?").await;
    assert!(outcome.is_finished());
    assert!(outcome.answer.contains("No reasoning backend is configured"));
    assert_eq!(spoken(&seen).last(), Some(&outcome.answer));
}

#[tokio::test]
async fn test_build_assistant_without_simulator_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let cfg = config(port);
    let err = build_assistant(&cfg).await.err().unwrap();
    assert!(matches!(err, AgentError::Simulator(_)));
}
