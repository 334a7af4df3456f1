pub mod activities;
pub mod models;
