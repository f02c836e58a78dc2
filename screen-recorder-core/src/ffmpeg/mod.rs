//! Everything that talks to the external `ffmpeg` executable.

pub mod command;
pub mod encoder;
pub mod muxer;
pub mod process;
