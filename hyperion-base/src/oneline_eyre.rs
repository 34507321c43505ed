//! An eyre handler that prints a report and its backtrace on a single line,
//! so log aggregators keep it in one record.

use std::error::Error;
use std::{env, fmt, iter};

use backtrace::Backtrace;
use eyre::EyreHandler;

const LINE_SEPARATOR: &str = " ## ";
const SECTION_SEPARATOR: &str = " ##$$## ";

/// Frames from these crates are noise in every report.
const SKIPPED_FRAME_PREFIXES: &[&str] = &["backtrace::", "eyre::", "hyperion_base::oneline_eyre"];

struct Handler {
    backtrace: Option<Backtrace>,
}

fn capture_enabled() -> bool {
    env::var("RUST_LIB_BACKTRACE")
        .or_else(|_| env::var("RUST_BACKTRACE"))
        .map(|v| v != "0")
        .unwrap_or(false)
}

impl Handler {
    fn fmt_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frames = backtrace
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols())
            .filter_map(|symbol| {
                let name = symbol.name()?.to_string();
                if SKIPPED_FRAME_PREFIXES.iter().any(|p| name.starts_with(p)) {
                    return None;
                }
                Some(match (symbol.filename(), symbol.lineno()) {
                    (Some(file), Some(line)) => format!("{name} at {}:{line}", file.display()),
                    _ => name,
                })
            });
        for (i, frame) in frames.enumerate() {
            if i > 0 {
                f.write_str(LINE_SEPARATOR)?;
            }
            write!(f, "{i}: {frame}")?;
        }
        Ok(())
    }
}

impl EyreHandler for Handler {
    fn debug(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return fmt::Debug::fmt(error, f);
        }
        write!(f, "{error}")?;
        for cause in iter::successors(error.source(), |&e| e.source()) {
            write!(f, "{LINE_SEPARATOR}Caused by: {cause}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            f.write_str(SECTION_SEPARATOR)?;
            Self::fmt_backtrace(backtrace, f)?;
        }
        Ok(())
    }
}

/// Install the one-line handler as the global eyre hook.
pub(crate) fn install() -> eyre::Result<()> {
    let capture = capture_enabled();
    eyre::set_hook(Box::new(move |_| {
        Box::new(Handler {
            backtrace: capture.then(Backtrace::new),
        })
    }))?;
    Ok(())
}
