pub mod arena;
pub mod collectible;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod game;
pub mod player;
pub mod runner;
pub mod strategy;
