// Usage, dead-export and project statistics queries

pub mod engine;

pub use engine::QueryEngine;
