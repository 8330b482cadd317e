//! TrackPilot agent - the on-robot control binary.
//!
//! Wires the sensor sources, the serial motor link, and the fixed-rate
//! control loop together. Sensor input comes from a replay file (the
//! LIDAR and camera drivers publish through the same seam); the motor
//! link is live when a serial port is given, otherwise commands stay
//! local (dry run).

mod control_loop;
mod motor_link;
mod replay;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use control_loop::ControlLoop;
use motor_link::MotorLink;
use replay::ReplayPlayer;
use trackpilot_core::{EncoderSource, ParamStore};
use trackpilot_env::{DriveTarget, Latest, RobotContext, TokioContext};

#[derive(Parser, Debug)]
#[command(name = "trackpilot-agent", about = "TrackPilot on-robot controller")]
struct Args {
    /// Sensor frame file (JSONL) to play through the provider seam
    #[arg(long)]
    replay: PathBuf,

    /// Serial port of the motor controller; omit for a dry run
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Parameter file (JSON); missing file means defaults
    #[arg(long, default_value = "params.json")]
    params: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ctx = TokioContext::shared();
    let params = Arc::new(ParamStore::from_file(args.params.clone()));
    let snapshot = params.snapshot();

    // Sensor providers
    let player = ReplayPlayer::load(&args.replay)
        .await
        .with_context(|| format!("loading replay {}", args.replay.display()))?;
    let (scans, blobs, replay_encoder) = player.spawn(Arc::clone(&ctx));

    // Motor link (or dry run)
    let mut link: Option<MotorLink> = None;
    let (target, encoder): (Arc<DriveTarget>, Box<dyn EncoderSource>) = match &args.port {
        Some(port) => {
            let connected = MotorLink::connect(&*ctx, port, args.baud, Arc::clone(&snapshot))
                .await
                .with_context(|| format!("connecting motor controller on {port}"))?;
            let target = connected.target();
            let encoder = Box::new(connected.encoder_handle());
            link = Some(connected);
            (target, encoder)
        }
        None => {
            warn!("no serial port given, running dry (encoder from replay)");
            (
                Arc::new(DriveTarget::new(snapshot.steering_center)),
                Box::new(replay_encoder),
            )
        }
    };

    // Shutdown signal: stop at the next tick boundary
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctx.spawn("signal-handler", async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                running.store(false, Ordering::Release);
            }
        });
    }

    let stats = ControlLoop {
        ctx,
        scans,
        blobs,
        encoder,
        target,
        params: Arc::clone(&params),
        observer: Arc::new(Latest::default()),
        running,
    }
    .run()
    .await;

    info!(
        ticks = stats.ticks(),
        overruns = stats.overruns(),
        "control loop finished"
    );

    if let Some(link) = link {
        link.shutdown(snapshot.steering_center).await;
    }

    Ok(())
}
