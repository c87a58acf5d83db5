//! Module that prints level-tagged, colored log lines.
//!
//! Messages are usually built with `cformat!` at the call site so they can carry their own markup.

use color_print::{ceprintln, cprintln};
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Function that enables or disables `debug` output.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn info(message: &str) {
    cprintln!("<blue, bold>[INFO]</blue, bold> {}", message);
}

/// Function that logs a successful step (e.g. entering the critical section).
pub fn success(message: &str) {
    cprintln!("<green, bold>[ OK ]</green, bold> {}", message);
}

pub fn warn(message: &str) {
    cprintln!("<yellow, bold>[WARN]</yellow, bold> {}", message);
}

pub fn error(message: &str) {
    ceprintln!("<red, bold>[ERR ]</red, bold> {}", message);
}

pub fn debug(message: &str) {
    if is_verbose() {
        cprintln!("<dim>[DBUG] {}</dim>", message);
    }
}
