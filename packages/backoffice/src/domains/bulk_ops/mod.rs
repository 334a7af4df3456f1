pub mod activities;
pub mod machines;
pub mod models;
