pub mod ffmpeg;
pub mod logging;
pub mod piper_path;
