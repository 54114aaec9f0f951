mod view;

pub use view::RenderStyle;

use crate::browser::{Browser, Event as BrowserEvent, Outcome, OutputSource};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, widgets::Paragraph, Terminal};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("failed to start terminal UI")]
    Start(#[source] io::Error),
    #[error("terminal UI failed")]
    Io(#[from] io::Error),
}

/// Map a key press to a browser event. Unbound keys are ignored.
fn key_to_event(k: KeyEvent) -> Option<BrowserEvent> {
    if k.kind != KeyEventKind::Press {
        return None;
    }
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(BrowserEvent::Cancel),
        (_, KeyCode::Char('q')) | (_, KeyCode::Esc) => Some(BrowserEvent::Cancel),
        (_, KeyCode::Up) | (_, KeyCode::Char('k')) => Some(BrowserEvent::MoveUp),
        (_, KeyCode::Down) | (_, KeyCode::Char('j')) => Some(BrowserEvent::MoveDown),
        (_, KeyCode::Enter) => Some(BrowserEvent::Confirm),
        _ => None,
    }
}

/// Run the interactive browser until the user confirms or cancels.
///
/// The terminal is restored before returning, so the caller can print the
/// selected output to the normal screen.
pub fn run(
    mut browser: Browser,
    source: &dyn OutputSource,
    style: &RenderStyle,
) -> Result<Outcome, BrowserError> {
    enable_raw_mode().map_err(BrowserError::Start)?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        disable_raw_mode().ok();
        return Err(BrowserError::Start(e));
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend) {
        Ok(t) => t,
        Err(e) => {
            disable_raw_mode().ok();
            execute!(io::stdout(), LeaveAlternateScreen).ok();
            return Err(BrowserError::Start(e));
        }
    };

    let res = loop {
        if !browser.is_browsing() {
            break Ok(());
        }
        if let Err(e) = terminal.draw(|f| {
            let area = f.area();
            let top = view::scroll_offset(&browser, area.height as usize);
            let p = Paragraph::new(view::render(&browser, style)).scroll((top as u16, 0));
            f.render_widget(p, area);
        }) {
            break Err(e);
        }

        // Blocks until the next input; resizes just fall through to a redraw.
        match event::read() {
            Ok(Event::Key(k)) => {
                if let Some(ev) = key_to_event(k) {
                    browser.apply(ev, source);
                }
            }
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res?;

    let outcome = browser.into_outcome().unwrap_or(Outcome::Cancelled);
    let kind = match &outcome {
        Outcome::Selected(_) => "selected",
        Outcome::Failed(_) => "failed",
        Outcome::Cancelled => "cancelled",
    };
    tracing::debug!(outcome = kind, "browser closed");
    Ok(outcome)
}
