pub mod audio_mixer;
pub mod pcm_track;
pub mod wav_format;
