use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{error, info};

use blestream::btle::{BtleConfig, BtleTransport};
use blestream::config::SessionConfig;
use blestream::controller::SessionController;
use blestream::profiles::Profile;
use blestream::transport::PeripheralTransport;
use blestream::types::SessionState;

const USAGE: &str = "usage: blestream <profile> [config.json] [name-prefix]";

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=blestream=debug also shows rejected frames.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Arguments ─────────────────────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let profile: Profile = args
        .next()
        .ok_or_else(|| anyhow!(USAGE))?
        .parse()
        .map_err(|e: String| anyhow!("{e}\n{USAGE}"))?;
    let config = match args.next() {
        Some(path) => SessionConfig::load(Path::new(&path))
            .with_context(|| format!("loading {path}"))?,
        None => SessionConfig::default(),
    };
    let btle_config = BtleConfig {
        name_prefix: args.next().unwrap_or_default(),
        ..BtleConfig::default()
    };

    // ── Connect ───────────────────────────────────────────────────────────────
    let transport = Arc::new(BtleTransport::new(btle_config).await?);
    let device = transport
        .scan()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no matching peripheral found"))?;
    info!("Connecting to {} ({}) …", device.name, device.id);
    transport.connect(&device.id).await?;

    let controller = SessionController::new(Arc::clone(&transport));

    info!("Profile: {profile}. Commands (type + Enter):");
    info!("  s  – start recording");
    info!("  x  – stop recording");
    info!("  b  – capture respiration baseline");
    info!("  v  – trigger site survey");
    info!("  i  – print session summary");
    info!("  e  – export to {profile}.csv");
    info!("  q  – quit\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on an OS thread so no StdinLock is held across awaits.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut status = tokio::time::interval(Duration::from_secs(5));
    loop {
        let line = tokio::select! {
            line = line_rx.recv() => match line {
                Some(l) => l,
                None => break,
            },
            _ = status.tick() => {
                if controller.session_state() == SessionState::Recording {
                    if let Ok(s) = controller.summary() {
                        info!(
                            "{}: {} notifications, {} rejected, channels {:?}",
                            s.profile, s.notifications, s.rejected, s.channels
                        );
                    }
                }
                continue;
            }
        };

        match line.as_str() {
            "" => {}
            "s" => match controller.start_session(profile, &device.id, config.clone()).await {
                Ok(()) => info!("Recording …"),
                Err(e) => error!("Start error: {e}"),
            },
            "x" => {
                controller.stop_session().await;
                info!("Stopped.");
            }
            "b" => {
                if let Err(e) = controller.arm_baseline() {
                    error!("Baseline error: {e}");
                }
            }
            "v" => {
                if let Err(e) = controller.trigger_site_survey().await {
                    error!("Site survey error: {e}");
                }
            }
            "i" => match controller.summary() {
                Ok(s) => println!("{}", serde_json::to_string_pretty(&s)?),
                Err(e) => error!("{e}"),
            },
            "e" => match controller.export_session() {
                Ok(text) => {
                    let path = format!("{profile}.csv");
                    std::fs::write(&path, text).with_context(|| format!("writing {path}"))?;
                    info!("Exported to {path}");
                }
                Err(e) => error!("Export error: {e}"),
            },
            "q" => {
                info!("Quit requested.");
                break;
            }
            other => error!("Unknown command '{other}'"),
        }
    }

    controller.stop_session().await;
    transport.disconnect(&device.id).await.ok();
    info!("Exiting.");
    Ok(())
}
