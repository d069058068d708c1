//! Interactive prompts
//!
//! Every prompt gives up when stdin is not a terminal, so scripts never hang.

use std::io::{self, IsTerminal, Write};

use anyhow::{bail, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let input = read_line()?;
    Ok(is_yes(&input))
}

/// Ask for a value the user did not pass as a flag
pub fn ask(label: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        bail!("{} is required (no terminal to prompt on)", label);
    }

    print!("{}: ", label);
    io::stdout().flush()?;

    let value = read_line()?;
    if value.is_empty() {
        bail!("{} is required", label);
    }
    Ok(value)
}

/// Ask for a password without echoing it
///
/// The value is returned exactly as typed; whitespace is significant.
pub fn ask_password(label: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        bail!("{} is required (no terminal to prompt on)", label);
    }

    print!("{}: ", label);
    io::stdout().flush()?;

    let typed = {
        let _raw = RawMode::enable()?;
        read_hidden()
    };
    println!();

    let Some(password) = typed? else {
        bail!("Cancelled");
    };
    if password.is_empty() {
        bail!("{} is required", label);
    }
    Ok(password)
}

/// Raw mode for as long as the guard lives
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to switch terminal to raw mode")?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

enum KeyOutcome {
    Continue,
    Submit,
    Cancel,
}

/// `None` when the user cancelled
fn read_hidden() -> Result<Option<String>> {
    let mut buffer = String::new();
    loop {
        let Event::Key(key) = event::read().context("Failed to read from terminal")? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match apply_key(&mut buffer, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Submit => return Ok(Some(buffer)),
            KeyOutcome::Cancel => return Ok(None),
        }
    }
}

fn apply_key(buffer: &mut String, key: KeyEvent) -> KeyOutcome {
    match key.code {
        KeyCode::Enter => KeyOutcome::Submit,
        KeyCode::Esc => KeyOutcome::Cancel,
        KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyOutcome::Cancel
        }
        KeyCode::Backspace => {
            buffer.pop();
            KeyOutcome::Continue
        }
        KeyCode::Char(c) => {
            buffer.push(c);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}

fn is_yes(input: &str) -> bool {
    let input = input.to_lowercase();
    input == "y" || input == "yes"
}
