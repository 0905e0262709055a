use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::Session;

/// Run the frame loop without a screen, logging a summary every second.
pub async fn run(mut session: Session) -> Result<()> {
    let mut interval = tokio::time::interval(session.frame_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_summary = Instant::now();
    let mut beats_since_summary = 0u32;
    let mut tempo_since_summary = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break;
            }
        }

        session.drain_commands();
        let report = session.step();
        if report.beat.is_some() {
            beats_since_summary += 1;
        }
        if report.tempo_beat.is_some() {
            tempo_since_summary += 1;
        }

        if last_summary.elapsed() >= Duration::from_secs(1) {
            let status = session.pipeline.status();
            info!(
                "frame={} volume={:.3} smoothed={:.3} cutoff={:.3} beats={} tempo={} | {}",
                status.frame,
                status.instant,
                status.smoothed,
                status.cutoff,
                beats_since_summary,
                tempo_since_summary,
                session.visualizer.summary()
            );
            last_summary = Instant::now();
            beats_since_summary = 0;
            tempo_since_summary = 0;
        }

        if session.finished() {
            info!("Reached {} frames, stopping", session.pipeline.frame());
            break;
        }
    }

    Ok(())
}
