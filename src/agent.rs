//! 助手运行时
//!
//! build_assistant 按配置组装全部组件：连接仿真器、（可选）加载启动建筑、选择推理后端、
//! 注册 query / retrieve / modify 工具、选择语音输出。handle 对单条用户输入跑 ReAct
//! 并播报最终回答。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::{AgentError, BuildingSession, SessionSupervisor};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::model::ModelLoader;
use crate::react::{format_trajectory, ReactAgent, ReactEvent, RunOutcome};
use crate::sandbox::Sandbox;
use crate::speech::{speak_or_log, LogSpeech, SimulatorSpeech, SpeechSink};
use crate::tools::{
    HttpQueryBackend, ModifyBuildingTool, QueryBackend, QueryBuildingTool, RetrieveBuildingTool,
    ToolDispatcher, ToolRegistry, UnconfiguredQueryBackend,
};

pub struct Assistant {
    agent: ReactAgent,
    dispatcher: ToolDispatcher,
    speech: Arc<dyn SpeechSink>,
    session: Arc<BuildingSession>,
    supervisor: Arc<SessionSupervisor>,
    verbose: bool,
}

impl Assistant {
    /// 用已有的推理后端与会话组装（测试与嵌入场景）
    pub fn assemble(cfg: &AppConfig, llm: Arc<dyn LlmClient>, session: Arc<BuildingSession>) -> Self {
        let speech: Arc<dyn SpeechSink> = if cfg.speech.enabled {
            Arc::new(SimulatorSpeech::new(session.clone(), cfg.speech.voice.clone()))
        } else {
            Arc::new(LogSpeech)
        };

        let query_backend: Arc<dyn QueryBackend> = match &cfg.tools.query.endpoint {
            Some(endpoint) => Arc::new(HttpQueryBackend::new(endpoint.clone(), cfg.tools.query.timeout_secs)),
            None => {
                warn!("No graph query endpoint configured, query_building will report an error");
                Arc::new(UnconfiguredQueryBackend)
            }
        };

        let mut tools = ToolRegistry::new();
        tools.register(QueryBuildingTool::new(query_backend));
        tools.register(RetrieveBuildingTool::new(
            llm.clone(),
            Sandbox::new(session.clone(), cfg.sandbox.max_steps),
        ));
        tools.register(ModifyBuildingTool::new(
            llm.clone(),
            Sandbox::new(session.clone(), cfg.sandbox.max_steps),
        ));

        let mut dispatcher = ToolDispatcher::new(tools, cfg.tools.tool_timeout_secs);
        if cfg.speech.announce_tools {
            dispatcher = dispatcher.with_announcer(speech.clone());
        }

        Self {
            agent: ReactAgent::new(llm, cfg.agent.max_iterations, cfg.llm.timeouts.request),
            dispatcher,
            speech,
            session,
            supervisor: Arc::new(SessionSupervisor::new()),
            verbose: cfg.agent.verbose,
        }
    }

    pub fn supervisor(&self) -> Arc<SessionSupervisor> {
        self.supervisor.clone()
    }

    pub fn session(&self) -> &Arc<BuildingSession> {
        &self.session
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.dispatcher.tool_names()
    }

    pub async fn handle(&self, query: &str) -> RunOutcome {
        self.handle_with_events(query, None).await
    }

    /// 跑一次 ReAct；event_tx 用于实时展示过程事件
    pub async fn handle_with_events(
        &self,
        query: &str,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> RunOutcome {
        if !self.session.is_connected().await {
            warn!("Simulator connection is broken, reconnecting");
            if let Err(e) = self.session.reconnect().await {
                warn!(error = %e, "Reconnect failed");
            }
        }

        let cancel = self.supervisor.begin_run();
        let outcome = self.agent.run(query, &self.dispatcher, cancel, event_tx).await;
        self.supervisor.end_run();
        info!(status = ?outcome.status, steps = outcome.steps.len(), "Run finished");

        if self.verbose && !outcome.steps.is_empty() {
            let rule = "=".repeat(60);
            info!("\n{}\n{}{}\n", rule, format_trajectory(&outcome.steps), rule);
        }

        speak_or_log(self.speech.as_ref(), &outcome.answer).await;
        outcome
    }
}

/// 按配置组装助手：仿真器必须可连接，配置了启动建筑时必须加载成功
pub async fn build_assistant(cfg: &AppConfig) -> Result<Assistant, AgentError> {
    let loader = ModelLoader::new(cfg.model.converter.clone());
    let session = Arc::new(BuildingSession::connect(&cfg.simulator, loader).await?);

    if let Some(ifc) = &cfg.model.ifc_path {
        let index = session.reset_model(ifc).await?;
        info!(model = %ifc.display(), entities = index.len(), "Startup model loaded");
    }

    let llm = create_llm_from_config(&cfg.llm);
    Ok(Assistant::assemble(cfg, llm, session))
}
