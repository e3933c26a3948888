pub mod metadata;
pub mod path_allocator;
pub mod stream_writer;
