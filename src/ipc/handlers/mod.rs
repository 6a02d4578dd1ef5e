pub mod core;
pub mod feedback;
