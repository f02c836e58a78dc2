pub mod audio_worker;
pub mod clock;
pub mod controller;
pub mod finalize;
pub mod signal;
pub mod video_worker;
