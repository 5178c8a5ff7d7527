//! # Murmur
//!
//! Terminal chat client.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! murmur
//!
//! # Point at another server and credential file
//! MURMUR_SERVER_URL=wss://chat.example.com/ws/chat MURMUR_CREDENTIALS=./creds.json murmur
//!
//! # More logging
//! RUST_LOG=murmur=debug murmur
//! ```

use anyhow::{Context, Result};
use murmur_client::cli::{render_event, CliCommand, HELP};
use murmur_client::{metrics, ChatClient, ClientConfig, ClientOptions, FileCredentialStore};
use murmur_core::{Access, Route, UserProfile};
use murmur_transport::WebSocketConnector;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = ClientConfig::load()?;

    tracing::info!("Starting Murmur client for {}", config.server_url);

    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let credentials_path = config.credentials_path();
    let store = FileCredentialStore::open(&credentials_path).with_context(|| {
        format!(
            "Failed to open credential store: {}",
            credentials_path.display()
        )
    })?;

    let (client, runtime) = ChatClient::spawn(
        ClientOptions::from(&config),
        Arc::new(WebSocketConnector::default()),
        Box::new(store),
    );

    let mut events = client.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", render_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let reconciled = client.reconcile(Route::guarded()).await?;
    match reconciled.access {
        Access::Granted => {
            println!("* logged in as {}", reconciled.session.username);
            client.connect().await?;
        }
        Access::RedirectToLogin => {
            println!("* not logged in, use /login <token> <user-id> <username>");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match CliCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("! {e}");
                continue;
            }
        };
        if command == CliCommand::Quit {
            break;
        }
        if let Err(e) = run_command(&client, command).await {
            println!("! {e}");
        }
    }

    client.disconnect().await?;
    drop(client);
    runtime.await?;
    printer.abort();

    Ok(())
}

async fn run_command(client: &ChatClient, command: CliCommand) -> Result<()> {
    // Each command is a navigation: re-check the credential file first.
    let route = match command {
        CliCommand::Login { .. } | CliCommand::Logout | CliCommand::Help | CliCommand::Quit => {
            Route::public()
        }
        _ => Route::guarded(),
    };
    if client.reconcile(route).await?.access == Access::RedirectToLogin {
        println!("* not logged in, use /login <token> <user-id> <username>");
        return Ok(());
    }

    match command {
        CliCommand::Login {
            token,
            user_id,
            username,
        } => {
            client
                .login(token, UserProfile::new(user_id, username))
                .await?;
            client.connect().await?;
        }
        CliCommand::Logout => client.logout().await?,
        CliCommand::Connect => client.connect().await?,
        CliCommand::Disconnect => client.disconnect().await?,
        CliCommand::Direct { peer, content } => client.send_private(content, peer).await?,
        CliCommand::Focus(peer) => {
            client.focus(peer.clone()).await?;
            for message in client.private_history(peer).await? {
                println!("  {}: {}", message.sender_name, message.content);
            }
        }
        CliCommand::Unfocus => client.unfocus().await?,
        CliCommand::Online => {
            let users = client.online_users().await?;
            println!("* {} online", users.len());
            for user in users {
                println!("  {} ({})", user.username, user.user_id);
            }
        }
        CliCommand::Join(room) => client.join_room(room).await?,
        CliCommand::Probe(message) => client.send_probe(message).await?,
        CliCommand::Say(content) => client.send_public(content, None).await?,
        CliCommand::Help => println!("{HELP}"),
        CliCommand::Quit => {}
    }
    Ok(())
}
