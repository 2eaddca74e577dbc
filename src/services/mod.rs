pub mod calendar;
pub mod context_store;
pub mod executor;
pub mod nlu;
pub mod pipeline;
pub mod planner;
pub mod slots;
pub mod system;
