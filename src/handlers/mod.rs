pub mod health;
pub mod predict;
pub mod teams;
