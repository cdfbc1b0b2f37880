//! Projboard console client.
//!
//! A minimal line-oriented frontend for the client library: server events
//! print to stdout, stdin lines become chat messages or slash commands.
//!
//! ```text
//! /add <title>|<description>   create a task
//! /done <id>                   complete a task
//! /del <id>                    delete a task
//! /user <name>                 retry with a different username
//! /quit                        disconnect and exit
//! anything else                chat
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use projboard::client::ProjectClient;
use projboard::config::{ClientCliArgs, ClientConfig};
use projboard::events::{ProjectEvents, TaskInfo};

/// Sink that renders every event as one stdout line.
struct ConsoleEvents;

impl ProjectEvents for ConsoleEvents {
    fn on_system_message(&self, text: &str) {
        println!("* {text}");
    }

    fn on_chat_message(&self, username: &str, text: &str) {
        println!("<{username}> {text}");
    }

    fn on_users_updated(&self, usernames: &[String]) {
        println!("* online: {}", usernames.join(", "));
    }

    fn on_task_added(&self, task: &TaskInfo) {
        match task.completed_by.as_deref() {
            Some(completer) => println!(
                "* task #{} {} [{}] (by {}, completed by {completer})",
                task.id, task.title, task.status, task.assigned_by
            ),
            None => println!(
                "* task #{} {} [{}] (by {})",
                task.id, task.title, task.status, task.assigned_by
            ),
        }
    }

    fn on_task_completed(&self, id: u64, title: &str, completed_by: &str) {
        println!("* task #{id} {title} completed by {completed_by}");
    }

    fn on_task_deleted(&self, id: u64, title: &str, deleted_by: &str) {
        println!("* task #{id} {title} deleted by {deleted_by}");
    }

    fn on_disconnected(&self, reason: &str) {
        println!("* disconnected: {reason}");
    }
}

#[tokio::main]
async fn main() {
    let cli = ClientCliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = Arc::new(ProjectClient::new(
        &config.server_addr,
        &config.username,
        Arc::new(ConsoleEvents),
    ));
    if let Err(e) = client.connect().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    run_input_loop(&client).await;
    client.disconnect();
}

/// Reads stdin until `/quit` or EOF, translating lines into commands.
async fn run_input_loop(client: &ProjectClient) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(rest) = line.strip_prefix("/add ") {
            match rest.split_once('|') {
                Some((title, description)) => client.add_task(title.trim(), description.trim()),
                None => println!("usage: /add <title>|<description>"),
            }
        } else if let Some(rest) = line.strip_prefix("/done ") {
            match rest.trim().parse::<u64>() {
                Ok(id) => client.complete_task(id),
                Err(_) => println!("usage: /done <id>"),
            }
        } else if let Some(rest) = line.strip_prefix("/del ") {
            match rest.trim().parse::<u64>() {
                Ok(id) => client.delete_task(id),
                Err(_) => println!("usage: /del <id>"),
            }
        } else if let Some(name) = line.strip_prefix("/user ") {
            client.request_username(name.trim());
        } else if line.starts_with('/') {
            println!("unknown command: {line}");
        } else {
            client.send_chat(line);
        }
    }
}
