// ── Command-line surface ──
//
// The host launches the provider with no arguments; `--debug` pins the
// transport to a fixed port so a debugger-driven host can attach.

use clap::Parser;

/// Fixed port used under `--debug` so reattaching hosts find the provider.
pub const DEBUG_PORT: u16 = 42424;

#[derive(Debug, Parser)]
#[command(name = "fleetform", version, about = "AppStream 2.0 desired-state provider")]
pub struct Cli {
    /// Serve on a fixed local port for debugger-driven hosts.
    #[arg(long)]
    pub debug: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn port(&self) -> u16 {
        if self.debug { DEBUG_PORT } else { 0 }
    }
}
