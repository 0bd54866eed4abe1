pub mod health;
pub mod nearby;
