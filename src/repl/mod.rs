//! Operator side of the console: command classification, input checks, the
//! shared composition buffer, and the loop that drives the device.

mod command;
mod command_loop;
mod composer;
pub mod lisp;


pub use command::{classify, Command, QUIT_COMMAND, RESET_COMMAND, RUN_COMMAND};
pub use command_loop::{
    CommandLoop, LoopEvent, LoopExit, LoopSettings, NO_PROMPT_STATUS, RUNNING_STATUS,
};
pub use composer::Composer;
