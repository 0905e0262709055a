use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io::{self, stdout};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::warn;

use super::Session;
use crate::signal::SignalPipeline;

/// Threshold step for the +/- keys.
const THRESHOLD_STEP: f32 = 0.01;

pub async fn run(session: Session) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, session).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut session: Session,
) -> Result<()> {
    let mut interval = tokio::time::interval(session.frame_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut beat_flash_until = Instant::now();

    loop {
        interval.tick().await;

        session.drain_commands();
        let report = session.step();
        if report.beat.is_some() {
            beat_flash_until = Instant::now() + Duration::from_millis(120);
        }
        let beat_lit = Instant::now() < beat_flash_until;

        terminal.draw(|frame| {
            let area = frame.area();

            // Clear with transparent/reset background for terminal transparency support
            let block = ratatui::widgets::Block::default()
                .style(Style::default().bg(Color::Reset));
            frame.render_widget(block, area);

            let body = Rect::new(area.x, area.y + 1, area.width, area.height.saturating_sub(1));
            session.visualizer.render(frame, body);

            render_status(frame, area, &session.pipeline, beat_lit);
        })?;

        // Handle input without blocking the runtime
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key(key, &mut session.pipeline) {
                    return Ok(());
                }
            }
        }

        if session.finished() {
            return Ok(());
        }
    }
}

/// Returns true when the user asked to quit.
fn handle_key(key: KeyEvent, pipeline: &mut SignalPipeline) -> bool {
    match key {
        KeyEvent {
            code: KeyCode::Char('q'),
            ..
        }
        | KeyEvent {
            code: KeyCode::Char('c'),
            modifiers: KeyModifiers::CONTROL,
            ..
        } => return true,
        KeyEvent {
            code: KeyCode::Char('t'),
            ..
        } => {
            pipeline.tap(Instant::now());
        }
        KeyEvent {
            code: KeyCode::Char('a'),
            ..
        } => {
            let on = !pipeline.tunables().auto_mode();
            if let Err(e) = pipeline.tune(|t| {
                t.set_auto_mode(on);
                Ok(())
            }) {
                warn!("{}", e);
            }
        }
        KeyEvent {
            code: KeyCode::Char('+'),
            ..
        }
        | KeyEvent {
            code: KeyCode::Char('='),
            ..
        } => nudge_threshold(pipeline, THRESHOLD_STEP),
        KeyEvent {
            code: KeyCode::Char('-'),
            ..
        } => nudge_threshold(pipeline, -THRESHOLD_STEP),
        _ => {}
    }
    false
}

fn nudge_threshold(pipeline: &mut SignalPipeline, delta: f32) {
    let next = (pipeline.tunables().beat().threshold + delta).clamp(0.0, 1.0);
    if let Err(e) = pipeline.tune(|t| t.set_threshold(next)) {
        warn!("{}", e);
    }
}

fn render_status(frame: &mut Frame, area: Rect, pipeline: &SignalPipeline, beat_lit: bool) {
    let status = pipeline.status();
    let source = match &status.source {
        Some(handle) => handle.kind.to_string(),
        None => "no source".to_string(),
    };
    let line = format!(
        " {} | vol {:.2} | cutoff {:.2} | thr {:.2} | {} bpm | auto {} | [t]ap [a]uto [+/-] threshold [q]uit ",
        source,
        status.smoothed,
        status.cutoff,
        status.tunables.beat().threshold,
        status.bpm,
        if status.tunables.auto_mode() { "on" } else { "off" },
    );
    let fg = if beat_lit { Color::Yellow } else { Color::DarkGray };

    for (i, ch) in line.chars().enumerate() {
        if i < area.width as usize {
            let cell = frame.buffer_mut().cell_mut((area.x + i as u16, area.y));
            if let Some(cell) = cell {
                cell.set_char(ch);
                cell.set_fg(fg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoftwarePlatform;
    use crate::config::Config;
    use std::sync::Arc;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn keys_toggle_auto_and_nudge_threshold() {
        let mut pipeline =
            SignalPipeline::new(&Config::default(), Arc::new(SoftwarePlatform), Instant::now())
                .unwrap();

        assert!(!handle_key(press('a'), &mut pipeline));
        assert!(!pipeline.tunables().auto_mode());
        handle_key(press('a'), &mut pipeline);
        assert!(pipeline.tunables().auto_mode());

        handle_key(press('+'), &mut pipeline);
        assert!((pipeline.detector().params().threshold - 0.16).abs() < 1e-6);
        handle_key(press('-'), &mut pipeline);
        handle_key(press('-'), &mut pipeline);
        assert!((pipeline.tunables().beat().threshold - 0.14).abs() < 1e-6);

        assert!(handle_key(press('q'), &mut pipeline));
        assert!(handle_key(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &mut pipeline
        ));
    }
}
