//! BIM Agent 入口
//!
//! 初始化日志、加载配置、连接仿真器并组装助手；随后执行单次 `--query`，
//! 或从标准输入逐行读取请求（输入 q 退出）。Ctrl+C 取消当前请求，空闲时退出。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use bim_agent::config::load_config;
use bim_agent::react::ReactEvent;
use bim_agent::{build_assistant, observability, Assistant};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "bim-agent")]
#[command(about = "ReAct assistant for querying and modifying a simulated building")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, env = "BIM_CONFIG")]
    config: Option<PathBuf>,

    /// 只处理这一条请求然后退出
    #[arg(long)]
    query: Option<String>,

    /// 打印推理轨迹与过程事件
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    cfg.agent.verbose |= cli.verbose;

    let assistant = build_assistant(&cfg).await.context("Failed to start assistant")?;
    tracing::info!(tools = ?assistant.tool_names(), "Assistant ready");

    let supervisor = assistant.supervisor();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if supervisor.cancel() {
                tracing::warn!("Current request cancelled");
            } else {
                tracing::info!("Exiting");
                std::process::exit(0);
            }
        }
    });

    if let Some(query) = cli.query {
        answer(&assistant, &query, cfg.agent.verbose).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Type input query: ");
        std::io::stdout().flush().context("stdout")?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "q" {
            break;
        }
        answer(&assistant, input, cfg.agent.verbose).await;
    }
    Ok(())
}

async fn answer(assistant: &Assistant, query: &str, verbose: bool) {
    let outcome = if verbose {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReactEvent>();
        let printer = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                if let Ok(json) = serde_json::to_string(&ev) {
                    eprintln!("{}", json);
                }
            }
        });
        let outcome = assistant.handle_with_events(query, Some(&tx)).await;
        drop(tx);
        let _ = printer.await;
        outcome
    } else {
        assistant.handle(query).await
    };
    println!("{}", outcome.answer);
}
