pub mod cancellation;
pub(crate) mod capture_loop;
pub mod completion;
pub mod controller;
pub(crate) mod encode_loop;
