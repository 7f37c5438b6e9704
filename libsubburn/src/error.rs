use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The two-pass bitrate computation landed below the usable floor.
    /// No encoder process is spawned in this case.
    #[error("bitrate too low: {0}k")]
    BitrateTooLow(i64),

    #[error("failed to launch encoder: {0}")]
    Launch(#[source] io::Error),

    #[error("ffprobe output did not contain {0}")]
    Probe(&'static str),

    #[error("invalid subtitle data: {0}")]
    Subtitle(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
