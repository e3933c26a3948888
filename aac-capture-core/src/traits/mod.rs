pub mod block_encoder;
pub mod capture_source;
pub mod recording_listener;
