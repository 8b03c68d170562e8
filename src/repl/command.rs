/// Reset the device and wait for a fresh prompt.
pub const RESET_COMMAND: &str = ".reset";
/// Stop the command loop.
pub const QUIT_COMMAND: &str = ".quit";
/// Send the whole composition buffer.
pub const RUN_COMMAND: &str = ".run";

/// What the loop does with one queued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Quit,
    Run,
    Send(String),
}

/// Control commands match exactly after trimming; anything else is sent as written.
pub fn classify(entry: &str) -> Command {
    match entry.trim() {
        RESET_COMMAND => Command::Reset,
        QUIT_COMMAND => Command::Quit,
        RUN_COMMAND => Command::Run,
        _ => Command::Send(entry.to_string()),
    }
}
