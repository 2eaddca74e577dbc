pub mod assistant;
pub mod health;
pub mod slots;
