pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_TICK_MS: u64 = 100;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_RESET_PULSE_MS: u64 = 20;
pub const DEFAULT_SCROLLBACK_LINES: usize = 5_000;

pub(super) const MIN_TICK_MS: u64 = 10;
pub(super) const MAX_TICK_MS: u64 = 1_000;
pub(super) const MAX_HANDSHAKE_TIMEOUT_MS: u64 = 600_000;
pub(super) const MAX_RESET_PULSE_MS: u64 = 1_000;
pub(super) const MIN_SCROLLBACK_LINES: usize = 100;
pub(super) const MAX_SCROLLBACK_LINES: usize = 100_000;
