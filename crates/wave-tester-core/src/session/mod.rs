mod stats;
mod stream_session;

pub use {
    stats::StreamStats,
    stream_session::{SessionPhase, StreamSession},
};
