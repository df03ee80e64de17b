//! Multi-window host demo
//!
//! Opens the first window with the show hint given on the command line (the
//! integer the OS would hand a process) and plays a short session against the
//! in-process desktop: a secondary press opens a second window and broadcasts
//! to every window, the new window is resized, then both windows close and
//! the host returns.
//!
//! Usage: `multi_window [SHOW_HINT]`

use std::error::Error;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use window_host::foundation::logging;
use window_host::platform::HeadlessError;
use window_host::prelude::*;

const CONFIG_PATH: &str = "multi_window.toml";
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
enum AppError {
    #[error("Invalid show hint {0:?}: expected an integer")]
    InvalidShowHint(String),

    #[error("Timed out waiting for {0} open window(s)")]
    Timeout(usize),

    #[error(transparent)]
    Desktop(#[from] HeadlessError),
}

fn parse_show_hint(arg: Option<&str>, fallback: ShowHint) -> Result<ShowHint, AppError> {
    match arg {
        None => Ok(fallback),
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .map(ShowHint::from)
            .map_err(|_| AppError::InvalidShowHint(raw.to_owned())),
    }
}

fn wait_for_windows(desktop: &HeadlessDesktop, count: usize) -> Result<Vec<WindowId>, AppError> {
    if desktop.wait_for_open(count, STEP_TIMEOUT) {
        Ok(desktop.open_windows())
    } else {
        Err(AppError::Timeout(count))
    }
}

fn play_session(desktop: &HeadlessDesktop) -> Result<(), AppError> {
    let first = *wait_for_windows(desktop, 1)?
        .first()
        .ok_or(AppError::Timeout(1))?;
    desktop.change_scale(first, 1.25, true)?;

    log::info!("Secondary press on {}", first);
    desktop.press(first, true)?;
    let second = wait_for_windows(desktop, 2)?
        .into_iter()
        .find(|window| *window != first)
        .ok_or(AppError::Timeout(2))?;
    desktop.resize(second, 1024, 768)?;

    // Let the broadcast and the resize land before reading back.
    thread::sleep(Duration::from_millis(50));
    for window in [first, second] {
        log::info!(
            "{} status {:?}, content size {:?}",
            window,
            desktop.status(window).unwrap_or_default(),
            desktop.content_size(window)
        );
    }

    desktop.close(first)?;
    desktop.close(second)?;
    Ok(())
}

fn drive(desktop: &HeadlessDesktop) -> Result<(), AppError> {
    let result = play_session(desktop);
    if let Err(err) = &result {
        log::error!("Session failed: {}, closing remaining windows", err);
        for window in desktop.open_windows() {
            let _ = desktop.close(window);
        }
    }
    result
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = HostConfig::load_or_default(CONFIG_PATH)?;
    logging::init_with_level(&config.logging.level);

    let arg = std::env::args().nth(1);
    let hint = parse_show_hint(arg.as_deref(), config.show_hint)?;
    log::info!("Starting multi-window host ({:?})", hint);

    let desktop = HeadlessDesktop::new();
    let host = WindowHost::headless(config, &desktop);

    let driver = {
        let desktop = desktop.clone();
        thread::Builder::new()
            .name(String::from("demo-driver"))
            .spawn(move || drive(&desktop))?
    };

    let report = host.run(hint)?;
    match driver.join() {
        Ok(session) => session?,
        Err(_) => return Err("Demo driver panicked".into()),
    }

    log::info!(
        "Host exited: {} window(s) shown, {} teardown failure(s), {} rundown failure(s)",
        report.windows_shown,
        report.teardown_failures.len(),
        report.rundown_failures.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_hint_argument() {
        assert_eq!(parse_show_hint(None, ShowHint::Minimized).unwrap(), ShowHint::Minimized);
        assert_eq!(parse_show_hint(Some("3"), ShowHint::Normal).unwrap(), ShowHint::Maximized);
        assert_eq!(parse_show_hint(Some(" 7 "), ShowHint::Normal).unwrap(), ShowHint::Other(7));
        assert!(matches!(
            parse_show_hint(Some("big"), ShowHint::Normal),
            Err(AppError::InvalidShowHint(_))
        ));
    }

    #[test]
    fn test_demo_session_runs_to_completion() {
        let desktop = HeadlessDesktop::new();
        let host = WindowHost::headless(HostConfig::default(), &desktop);
        let driver = {
            let desktop = desktop.clone();
            thread::spawn(move || drive(&desktop))
        };

        let report = host.run(ShowHint::Normal).unwrap();
        driver.join().unwrap().unwrap();
        assert_eq!(report.windows_shown, 2);
        assert!(report.is_clean());
    }
}
