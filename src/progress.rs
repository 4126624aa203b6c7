use std::io::{self, Write};
use std::time::Instant;

/// Stderr progress reporting for the CLI: elapsed-stamped stage lines plus a
/// percent line that only reprints when the numbers move.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
    last: std::sync::Mutex<(u8, String)>,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
            last: std::sync::Mutex::new((u8::MAX, String::new())),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    pub fn percent(&self, pct: u8, milestone: &str) {
        if !self.enabled {
            return;
        }
        let mut last = self.last.lock().expect("progress lock");
        if last.0 == pct && last.1 == milestone {
            return;
        }
        *last = (pct, milestone.to_string());
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {milestone} {pct:>3}%");
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
