use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn init(json: bool) {
    JSON_MODE.store(json, Ordering::Relaxed);
}

pub fn is_json() -> bool {
    JSON_MODE.load(Ordering::Relaxed)
}

/// Print `value` as JSON in JSON mode, otherwise print `human`.
pub fn print<T: Serialize>(value: &T, human: &str) -> anyhow::Result<()> {
    if is_json() {
        let s = serde_json::to_string_pretty(value)?;
        println!("{s}");
    } else {
        println!("{human}");
    }
    Ok(())
}

/// Report a fatal error on stderr.
pub fn error(err: &anyhow::Error) {
    if is_json() {
        let v = serde_json::json!({ "ok": false, "error": format!("{err:#}") });
        let _ = writeln!(io::stderr(), "{v}");
        return;
    }
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {err:#}");
}

pub fn stdout() -> StandardStream {
    StandardStream::stdout(ColorChoice::Auto)
}

/// Write `text` in `color` (bold), then reset.
pub fn colored<W: WriteColor>(w: &mut W, color: Color, text: &str) -> io::Result<()> {
    w.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(w, "{text}")?;
    w.reset()
}
