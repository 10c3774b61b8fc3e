pub mod conflicts;
pub mod diff;
pub mod models;
pub mod policy;
pub mod reschedule;
pub mod spacing;
