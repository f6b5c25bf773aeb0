//! # pocket-shell
//!
//! Console front end for the command session engine.
//!
//! ## Overview
//!
//! Reads command lines from stdin and runs them in one engine session,
//! printing output lines as they are captured:
//! - `Ctrl-C` cancels the running command, or quits when idle
//! - `:back` / `:fwd` walk the command history
//! - `:up` / `:down` scroll the output window
//! - `:status` prints the session status as JSON
//! - `exit` quits
//!
//! Logs go to stderr; rendered lines go to stdout.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;

use pocket_shell::{Args, Console, Flow};
use pocket_shell_session::SessionManager;

/// Interval between redraws while a command produces output.
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    let config = args.load_config()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.engine.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "pocket-shell v{} starting (transport={:?}, width={})",
        env!("CARGO_PKG_VERSION"),
        config.session.transport,
        config.display.width
    );

    let manager = SessionManager::with_config(config, Handle::current())?;
    let mut console = Console::new(manager)?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let mut stdout = std::io::stdout();

    loop {
        let flow = tokio::select! {
            line = stdin.next_line() => match line? {
                Some(line) => console.handle_line(&line, &mut stdout)?,
                None => Flow::Quit,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                console.interrupt()?
            }
            _ = redraw.tick() => Flow::Continue,
        };

        console.render(&mut stdout)?;
        if flow == Flow::Quit {
            break;
        }
    }

    tracing::info!("pocket-shell shutting down");
    console.shutdown();

    Ok(())
}
