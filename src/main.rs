//! Harvest CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{bail, Context, Result};
use clap::Parser;
use harvest::realtime::{ConnectionState, RealtimeChannel, Topic, Update};
use harvest::storage::default_data_dir;
use harvest::{HarvestConfig, Role, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    match cli.command {
        Commands::Login { email, password } => login(&config, &email, &password).await,
        Commands::Register { email, password, name, role } => {
            register(&config, &email, &password, &name, role).await
        }
        Commands::Logout => logout(&config).await,
        Commands::Refresh => refresh(&config).await,
        Commands::Whoami => whoami(&config).await,
        Commands::Watch { topics } => watch(&config, topics).await,
        Commands::Send { topic, data, timeout } => send(&config, &topic, &data, timeout).await,
        Commands::Status => status(&config).await,
    }
}

fn build_config(cli: &Cli) -> HarvestConfig {
    let mut config = HarvestConfig::new(cli.deployment).auth_mode(cli.auth_mode);
    if let Some(url) = &cli.api_url {
        config = config.api_base_url(url);
    }
    if let Some(url) = &cli.ws_url {
        config = config.ws_url(url);
    }
    if let Some(dir) = &cli.data_dir {
        config = config.data_dir(dir);
    }
    config
}

async fn open_session(config: &HarvestConfig) -> Result<SessionStore> {
    SessionStore::from_config(config)
        .await
        .context("Failed to open session storage")
}

/// Realtime commands need a session to authenticate the channel with
fn require_login(session: &SessionStore) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not logged in. Run `harvest login` first");
    }
    Ok(())
}

async fn login(config: &HarvestConfig, email: &str, password: &str) -> Result<()> {
    let session = open_session(config).await?;
    let user = session.login(email, password).await.context("Login failed")?;

    println!("Logged in as {} <{}>", user.name, user.email);
    println!("Role: {}", user.role);
    Ok(())
}

async fn register(
    config: &HarvestConfig,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
) -> Result<()> {
    let session = open_session(config).await?;
    let user = session
        .register(email, password, name, role)
        .await
        .context("Registration failed")?;

    println!("Registered {} <{}>", user.name, user.email);
    println!("Role: {}", user.role);
    Ok(())
}

async fn logout(config: &HarvestConfig) -> Result<()> {
    let session = open_session(config).await?;
    if !session.is_authenticated() {
        println!("Not logged in");
        return Ok(());
    }

    session.logout().await.context("Logout failed")?;
    println!("Logged out");
    Ok(())
}

async fn refresh(config: &HarvestConfig) -> Result<()> {
    let session = open_session(config).await?;
    require_login(&session)?;

    match session.refresh().await.context("Refresh failed")? {
        Some(user) => println!("Token refreshed for {} <{}>", user.name, user.email),
        None => println!("Nothing to refresh; the current token is kept"),
    }
    Ok(())
}

async fn whoami(config: &HarvestConfig) -> Result<()> {
    let session = open_session(config).await?;

    match (session.user(), session.is_authenticated()) {
        (Some(user), _) => {
            println!("{} <{}>", user.name, user.email);
            println!("Role: {}", user.role);
            println!("ID:   {}", user.id);
        }
        // Only the token survives a restart
        (None, true) => println!("Authenticated (profile not stored; log in again to refresh it)"),
        (None, false) => println!("Not logged in"),
    }
    Ok(())
}

async fn watch(config: &HarvestConfig, topics: Vec<Topic>) -> Result<()> {
    let session = Arc::new(open_session(config).await?);
    require_login(&session)?;

    let topics = if topics.is_empty() {
        Topic::ALL.to_vec()
    } else {
        topics
    };

    let channel = RealtimeChannel::with_credentials(config.channel_config(), session);
    let _subscriptions: Vec<_> = topics
        .iter()
        .map(|topic| channel.subscribe(*topic, |update| println!("{}", describe(&update))))
        .collect();

    let mut state = channel.state_receiver();
    channel.connect();
    info!(url = %config.ws_url, "Watching {} topic(s), Ctrl-C to stop", topics.len());

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                eprintln!("[{}]", current);
                if current == ConnectionState::Failed {
                    let gave_up = format!("Gave up reconnecting to {}", config.ws_url);
                    break Err(match channel.last_error() {
                        Some(e) => anyhow::Error::new(e).context(gave_up),
                        None => anyhow::anyhow!(gave_up),
                    });
                }
            }
        }
    };

    channel.disconnect().await;
    outcome
}

async fn send(config: &HarvestConfig, topic: &str, data: &str, timeout: u64) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("Invalid JSON payload: {}", data))?;

    let session = Arc::new(open_session(config).await?);
    require_login(&session)?;

    let channel = RealtimeChannel::with_credentials(config.channel_config(), session);
    let mut state = channel.state_receiver();
    channel.connect();

    let connected = match tokio::time::timeout(
        Duration::from_secs(timeout),
        state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed)),
    )
    .await
    {
        Ok(Ok(settled)) => *settled == ConnectionState::Connected,
        _ => false,
    };
    if !connected {
        let reason = channel.last_error();
        channel.disconnect().await;
        match reason {
            Some(e) => bail!("Could not connect to {}: {}", config.ws_url, e),
            None => bail!("Could not connect to {}", config.ws_url),
        }
    }

    channel.send(topic, &payload).context("Failed to send message")?;
    channel.disconnect().await;

    println!("Sent {} to {}", topic, config.ws_url);
    Ok(())
}

async fn status(config: &HarvestConfig) -> Result<()> {
    let session = open_session(config).await?;
    let data_dir = config.data_dir.clone().or_else(default_data_dir);

    println!("Harvest Status");
    println!("==============");
    println!("Deployment:  {}", config.deployment);
    println!("API:         {}", config.api_base_url);
    println!("Realtime:    {}", config.ws_url);
    println!("Auth mode:   {}", config.auth_mode);
    match data_dir {
        Some(dir) => println!("Data dir:    {}", dir.display()),
        None => println!("Data dir:    (none)"),
    }
    println!(
        "Session:     {}",
        if session.is_authenticated() {
            "authenticated"
        } else {
            "not logged in"
        }
    );
    Ok(())
}

fn describe(update: &Update) -> String {
    match update {
        Update::SensorUpdate(reading) => format!(
            "[sensor] {} {:?} = {} {}",
            reading.sensor_id, reading.kind, reading.value, reading.unit
        ),
        Update::DroneUpdate(drone) => format!(
            "[drone] {} {} {:?} battery {}% signal {}%{}",
            drone.id,
            drone.name,
            drone.status,
            drone.battery,
            drone.signal,
            drone
                .current_task
                .as_ref()
                .map(|task| format!(" ({})", task))
                .unwrap_or_default()
        ),
        Update::SecurityAlert(alert) => format!(
            "[security] {} {:?} confidence {:.2} {:?}",
            alert.camera_id, alert.alert_type, alert.confidence, alert.status
        ),
        Update::LeafDetection(detection) => format!(
            "[leaves] {} leaves, confidence {:.2}, {} boxes",
            detection.leaf_count,
            detection.confidence,
            detection.bounding_boxes.len()
        ),
        Update::SystemAlert(alert) => format!(
            "[alert] {:?}/{:?} {}: {}",
            alert.priority, alert.level, alert.title, alert.message
        ),
    }
}
