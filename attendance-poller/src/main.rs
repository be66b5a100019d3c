mod config;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tokio::signal;
use tokio::time::sleep;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camu_client::{CamuClient, Credentials};

use crate::config::{Cli, Config};
use crate::watcher::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attendance_poller=info,camu_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env(Cli::parse());

    tracing::info!("Starting Camu attendance watcher");
    tracing::info!("Logging in as {}", config.email);

    let client =
        CamuClient::new(config.student_id.clone()).context("failed to build HTTP client")?;
    let credentials = Credentials {
        email: config.email.clone(),
        password: config.password.clone(),
    };

    // Without a session there is nothing to poll.
    let session = client
        .login(&credentials)
        .await
        .context("initial login failed, check credentials")?;

    let now_ist = chrono::Utc::now().with_timezone(&chrono_tz::Asia::Kolkata);
    tracing::info!("Student ID: {}", config.student_id);
    tracing::info!("Session: {}", session.redacted());
    tracing::info!("Time zone: Asia/Kolkata, current time {}", now_ist.format("%Y-%m-%d %H:%M:%S"));
    tracing::info!(
        "Watching for attendance windows every {:?} (Ctrl+C to stop)",
        config.poll_interval
    );

    let mut watcher = Watcher::new(client, session, &config);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let started = Instant::now();

        if let Err(e) = watcher.run_cycle().await {
            tracing::error!("Poll cycle failed: {:#}", e);
        }

        let elapsed = started.elapsed();
        if elapsed > config.poll_interval {
            tracing::warn!(
                "Cycle took {:.2?}, longer than the {:?} poll interval",
                elapsed,
                config.poll_interval
            );
        }

        // Interrupts are honored between cycles, never mid-request.
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutdown signal received, stopping watcher");
                break;
            }
            _ = sleep(config.poll_interval.saturating_sub(elapsed)) => {}
        }
    }

    tracing::info!("Attendance watcher stopped");
    Ok(())
}
