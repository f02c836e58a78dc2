pub mod capture_provider;
pub mod encoder_launcher;
pub mod media_muxer;
pub mod recorder_delegate;
