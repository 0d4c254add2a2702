//! SkillRun CLI - Command line interface for the SkillRun server.

mod sse;

use std::collections::BTreeMap;

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use skillrun_core::{content_text, EventKind, ExecutionEvent, Task, TaskSummary};

/// SkillRun CLI - task management and live execution
#[derive(Parser)]
#[command(name = "skillrun")]
#[command(about = "CLI for the SkillRun server", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "http://127.0.0.1:3001")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Agent,
    Skill,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new task
    Create {
        /// Task name
        #[arg(short, long)]
        name: String,

        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// Prompt for the model
        #[arg(short, long)]
        prompt: String,

        /// Run a single skill in isolation
        #[arg(long)]
        skill: Option<String>,

        /// Template parameter, repeatable (key=value)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Task type; defaults to skill when --skill is given
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Get task details
    Get {
        /// Task ID
        id: String,

        /// Print the execution log too
        #[arg(long)]
        log: bool,
    },

    /// List tasks
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Execute a task and follow its events
    Execute {
        /// Task ID
        id: String,
    },

    /// Cancel a running task
    Cancel {
        /// Task ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.addr.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Create {
            name,
            agent,
            prompt,
            skill,
            params,
            kind,
        } => {
            create_task(&client, &base, name, agent, prompt, skill, params, kind).await?;
        }
        Commands::Get { id, log } => {
            get_task(&client, &base, &id, log).await?;
        }
        Commands::List { limit, offset } => {
            list_tasks(&client, &base, limit, offset).await?;
        }
        Commands::Execute { id } => {
            execute_task(&client, &base, &id).await?;
        }
        Commands::Cancel { id } => {
            cancel_task(&client, &base, &id).await?;
        }
    }

    Ok(())
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(response: Response) -> Result<Response, Box<dyn std::error::Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    Err(format!("{} ({})", message, status.as_u16()).into())
}

fn parse_params(params: Vec<String>) -> Result<BTreeMap<String, Value>, String> {
    let mut values = BTreeMap::new();
    for param in params {
        let (key, raw) = param
            .split_once('=')
            .ok_or_else(|| format!("Invalid parameter '{}', expected KEY=VALUE", param))?;
        // Numbers, booleans and JSON literals keep their type.
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        values.insert(key.to_string(), value);
    }
    Ok(values)
}

#[allow(clippy::too_many_arguments)]
async fn create_task(
    client: &Client,
    base: &str,
    name: String,
    agent_id: String,
    user_prompt: String,
    skill_id: Option<String>,
    params: Vec<String>,
    kind: Option<Kind>,
) -> Result<(), Box<dyn std::error::Error>> {
    let task_type = match kind {
        Some(Kind::Agent) => "agent",
        Some(Kind::Skill) => "skill",
        None if skill_id.is_some() => "skill",
        None => "agent",
    };
    let body = json!({
        "name": name,
        "agentId": agent_id,
        "taskType": task_type,
        "skillId": skill_id,
        "userPrompt": user_prompt,
        "inputValues": parse_params(params)?,
    });

    let response = check(client.post(format!("{}/tasks", base)).json(&body).send().await?).await?;
    let task: Task = response.json().await?;

    println!("Task created:");
    print_task(&task);

    Ok(())
}

async fn get_task(
    client: &Client,
    base: &str,
    id: &str,
    log: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(client.get(format!("{}/tasks/{}", base, id)).send().await?).await?;
    let task: Task = response.json().await?;

    print_task(&task);
    if log && !task.execution_log.is_empty() {
        println!("  Log:");
        for event in &task.execution_log {
            print!("    ");
            print_event(event);
        }
    }

    Ok(())
}

async fn list_tasks(
    client: &Client,
    base: &str,
    limit: usize,
    offset: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(
        client
            .get(format!("{}/tasks", base))
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?,
    )
    .await?;
    let body: Value = response.json().await?;
    let tasks: Vec<TaskSummary> = serde_json::from_value(body["tasks"].clone())?;
    let total = body["total"].as_u64().unwrap_or(tasks.len() as u64);

    println!("Tasks ({} of {}):", tasks.len(), total);
    println!("{:<36}  {:<10}  {:<6}  {:<16}  {}", "ID", "STATUS", "TYPE", "AGENT", "CREATED");
    println!("{}", "-".repeat(90));

    for task in tasks {
        let created = task.created_at.format("%Y-%m-%d %H:%M:%S");
        let kind = serde_json::to_value(task.task_type)?;
        println!(
            "{:<36}  {:<10}  {:<6}  {:<16}  {}",
            task.id,
            task.status,
            kind.as_str().unwrap_or("-"),
            task.agent_id,
            created
        );
    }

    Ok(())
}

async fn execute_task(client: &Client, base: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(
        client
            .post(format!("{}/tasks/{}/execute", base, id))
            .header("accept", "text/event-stream")
            .send()
            .await?,
    )
    .await?;

    let mut frames = std::pin::pin!(sse::frames(response.bytes_stream()));
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let event: ExecutionEvent = match serde_json::from_str(&frame.data) {
            Ok(event) => event,
            Err(_) => {
                println!("[{}] {}", frame.event, frame.data);
                continue;
            }
        };
        print_event(&event);
        if let EventKind::Done { .. } = event.kind {
            return Ok(());
        }
    }

    Err("Stream ended before the run finished".into())
}

async fn cancel_task(client: &Client, base: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    check(client.post(format!("{}/tasks/{}/cancel", base, id)).send().await?).await?;
    println!("Cancellation requested for {}", id);
    Ok(())
}

fn print_task(task: &Task) {
    println!("  ID:         {}", task.id);
    println!("  Name:       {}", task.name);
    println!("  Agent:      {}", task.agent_id);
    if let Some(skill) = &task.skill_id {
        println!("  Skill:      {}", skill);
    }
    println!("  Status:     {}", task.status);
    println!("  Created:    {}", task.created_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(ms) = task.duration_ms {
        println!("  Duration:   {} ms", ms);
    }
    if let Some(cost) = task.cost_usd {
        println!("  Cost:       ${:.4}", cost);
    }
    if let Some(error) = &task.error_message {
        println!("  Error:      {}", error);
    }
    if let Some(isolation) = &task.isolation {
        let mode = if isolation.forced { "forced" } else { "open" };
        println!("  Isolation:  {} ({} providers)", mode, isolation.providers.len());
    }
}

fn print_event(event: &ExecutionEvent) {
    match &event.kind {
        EventKind::Status { status, message, details } => {
            let status = serde_json::to_value(status).unwrap_or(Value::Null);
            println!(
                "[status] {} {}",
                status.as_str().unwrap_or("-"),
                message.as_deref().unwrap_or("")
            );
            for detail in details {
                println!("         {}", detail);
            }
        }
        EventKind::ModelText { text, .. } => println!("{}", text),
        EventKind::ToolUse(call) => println!("[tool] {} {}", call.tool_name, call.arguments),
        EventKind::ToolResult(result) => {
            if result.is_error {
                println!(
                    "[tool] {} failed: {}",
                    result.tool_name,
                    result.error.as_deref().unwrap_or("error")
                );
            } else {
                println!("[tool] {} -> {}", result.tool_name, content_text(&result.content));
            }
        }
        EventKind::Completion {
            model,
            duration_ms,
            usage,
            cost_usd,
            cost_estimated,
            ..
        } => {
            let marker = if *cost_estimated { "~" } else { "" };
            println!(
                "[done] {} in {} ms, {} in / {} out tokens, {}${:.4}",
                model, duration_ms, usage.input_tokens, usage.output_tokens, marker, cost_usd
            );
        }
        EventKind::Error { message, details } => {
            println!("[error] {}", message);
            if let Some(details) = details {
                println!("        {}", details);
            }
        }
        EventKind::Done { status } => println!("[{}]", status),
    }
}
