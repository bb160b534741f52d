use std::io::Write;

/// Single-line `current / total` counter redrawn in place on stderr.
pub struct ProgressCount;

impl ProgressCount {
    pub fn line(current: u64, total: u64) -> String {
        format!("\r{current} / {total}")
    }

    pub fn draw(current: u64, total: u64) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{}", Self::line(current, total));
        let _ = stderr.flush();
    }

    pub fn draw_complete(current: u64, total: u64) {
        eprintln!("{}", Self::line(current, total));
    }
}
