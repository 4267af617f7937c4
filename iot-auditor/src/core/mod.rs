/*!
Core modules of the event-driven integrity auditor
*/

pub mod config;
pub mod detection_engine;
pub mod error;
pub mod event_system;
pub mod output_plugins;
pub mod report;
pub mod simulator;
pub mod state_manager;
pub mod tracker;
