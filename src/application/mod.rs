pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod modifications;
pub mod proposals;
pub mod week_plan;
