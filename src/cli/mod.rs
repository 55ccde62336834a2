//! TUI front-end (Ratatui + Crossterm)
//! - Builds the REST client from the loaded config
//! - Sets up the terminal and runs the event loop

use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::api;
use crate::config::Config;

pub mod impact_widget;
pub mod input;
pub mod state;
pub mod ui;
pub mod util;

pub async fn run(config: &Config) -> Result<()> {
    let mut app = init_app(config)?;

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app, Duration::from_millis(config.ui.tick_rate_ms)).await;

    // restore the terminal even when the loop failed
    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut state::App,
    tick_rate: Duration,
) -> Result<()> {
    app.request_structure();
    let mut last_tick = Instant::now();

    loop {
        app.drain_loaded();
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // poll blocks the thread; hand control back to spawned fetches between ticks
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(event::KeyModifiers::CONTROL) {
                    break;
                }
                app.handle_key(key).await?;
            }
        }
        tokio::task::yield_now().await;

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.quit {
            break;
        }
    }
    Ok(())
}

pub fn init_app(config: &Config) -> Result<state::App> {
    let client = api::Client::new(&config.api)?;
    log::info!("Using API at {}", client.base_url());
    Ok(state::App::new(client, config.year_id, config.ui.expand_all))
}
