pub mod adts;
pub mod handoff_queue;
pub mod pcm_convert;
