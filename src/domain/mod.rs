pub mod allocator;
pub mod error;
pub mod legalizer;
pub mod models;
pub mod time_windows;
