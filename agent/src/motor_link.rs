//! Serial link to the downstream motor controller.
//!
//! After connect, the keepalive task owns the serial port outright. The
//! tick loop only writes the shared `DriveTarget`; every keepalive period
//! the task re-encodes the current target and transmits it, feeding the
//! controller's watchdog even when a tick overruns. Incoming status
//! frames are drained with a short timeout and update the shared encoder.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use trackpilot_core::{Command, EncoderSource, LineReader, Odometry, Parameters, Status};
use trackpilot_env::{DriveTarget, EnvError, RobotContext};

/// Serial read timeout; a stalled controller must never block a period.
const READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Read-only view of the encoder updated by the keepalive task.
#[derive(Clone)]
pub struct EncoderHandle(Arc<AtomicI64>);

impl EncoderSource for EncoderHandle {
    fn encoder(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Connected motor controller link.
pub struct MotorLink {
    target: Arc<DriveTarget>,
    encoder: Arc<AtomicI64>,
    stop_requested: Arc<AtomicBool>,

    /// Resolved when the keepalive task has sent its final stop frames
    done: oneshot::Receiver<()>,
}

impl MotorLink {
    /// Opens the serial port, resets the encoder, and starts the
    /// keepalive task on the context.
    pub async fn connect<Ctx: RobotContext>(
        ctx: &Ctx,
        port: &str,
        baud: u32,
        params: Arc<Parameters>,
    ) -> Result<Self, EnvError> {
        let mut stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|e| EnvError::link(format!("open {port}: {e}")))?;

        stream
            .write_all(Command::ResetEncoder.encode().as_bytes())
            .await
            .map_err(|e| EnvError::link(format!("encoder reset: {e}")))?;
        info!(port, baud, "motor controller connected");

        let target = Arc::new(DriveTarget::new(params.steering_center));
        let encoder = Arc::new(AtomicI64::new(0));
        let stop_requested = Arc::new(AtomicBool::new(false));

        let (done_tx, done) = oneshot::channel();
        let task = keepalive_loop(
            stream,
            Arc::clone(&target),
            Arc::clone(&encoder),
            Arc::clone(&stop_requested),
            params,
        );
        ctx.spawn("motor-keepalive", async move {
            task.await;
            let _ = done_tx.send(());
        });

        Ok(Self {
            target,
            encoder,
            stop_requested,
            done,
        })
    }

    /// The target the tick loop writes into.
    pub fn target(&self) -> Arc<DriveTarget> {
        Arc::clone(&self.target)
    }

    /// Encoder view for the perception pipeline.
    pub fn encoder_handle(&self) -> EncoderHandle {
        EncoderHandle(Arc::clone(&self.encoder))
    }

    /// Forces a stop, emits the final stop frames, and closes the link.
    pub async fn shutdown(self, steering_center: u8) {
        self.target.force_stop(steering_center);
        self.stop_requested.store(true, Ordering::Release);
        if self.done.await.is_err() {
            error!("keepalive task ended without signaling");
        }
        info!("motor link closed");
    }
}

/// The keepalive activity: retransmit the target, drain status frames.
async fn keepalive_loop(
    mut stream: SerialStream,
    target: Arc<DriveTarget>,
    encoder: Arc<AtomicI64>,
    stop_requested: Arc<AtomicBool>,
    params: Arc<Parameters>,
) {
    let mut interval =
        tokio::time::interval(Duration::from_millis(params.keepalive_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut reader = LineReader::new();
    let mut odometry = Odometry::new();
    let started = tokio::time::Instant::now();
    let mut read_buf = [0u8; 256];
    let mut link_errors = 0u32;

    loop {
        interval.tick().await;

        // Retransmit the current target; never mutate it here
        let (speed, steering) = target.get();
        let frame = Command::drive(
            trackpilot_core::DriveCommand::new(speed, steering),
            params.servo_inverted,
        );
        if let Err(e) = stream.write_all(frame.encode().as_bytes()).await {
            link_errors += 1;
            if link_errors % 50 == 1 {
                error!(error = %e, "drive frame write failed");
            }
        }

        // Drain any pending status frames
        match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut read_buf)).await {
            Ok(Ok(n)) if n > 0 => {
                for status in reader.push(&read_buf[..n]) {
                    match status {
                        Status::Telemetry { encoder: ticks, .. } => {
                            encoder.store(ticks, Ordering::Release);
                            odometry.update(ticks, started.elapsed());
                        }
                        Status::Fault(code) => {
                            error!(code = %code, "controller fault");
                        }
                    }
                }
            }
            Ok(Ok(_)) => {
                // Zero-byte read: port closed on the other end
                warn!("serial port returned EOF");
            }
            Ok(Err(e)) => {
                link_errors += 1;
                if link_errors % 50 == 1 {
                    error!(error = %e, "serial read failed");
                }
            }
            Err(_) => {} // timeout: nothing pending this period
        }

        if stop_requested.load(Ordering::Acquire) {
            // Final stop on the way out
            let _ = stream
                .write_all(
                    Command::drive(
                        trackpilot_core::DriveCommand::stop(params.steering_center),
                        params.servo_inverted,
                    )
                    .encode()
                    .as_bytes(),
                )
                .await;
            let _ = stream.write_all(Command::EmergencyStop.encode().as_bytes()).await;
            debug!(report = ?odometry.report(&params), "final odometry");
            break;
        }
    }
}
