pub mod documents;
pub mod health;
pub mod tasks;
pub mod workers;
