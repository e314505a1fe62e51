pub mod feedback;
pub mod mood;
pub mod schema;
