pub mod command;
pub mod frame;

pub use command::{Click, Command};
pub use frame::{decode_frame, encode_audio, encode_debug, encode_visual, sanitize, Frame, Record};
