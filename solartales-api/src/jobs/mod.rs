//! Background Jobs for the SolarTales API
//!
//! This module contains background tasks that run for the process lifetime:
//!
//! - `generation`: the recurring generation timer and the refresh worker
//! - `rate_limit_sweep`: drops expired chat limiter entries and idle per-IP limiters
//!
//! # Usage
//!
//! ```ignore
//! use solartales_api::jobs::{generation_timer_task, rate_limit_sweep_task};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(generation_timer_task(generator, subjects, shutdown_rx.clone()));
//! tokio::spawn(rate_limit_sweep_task(
//!     state.chat_limiter.clone(),
//!     state.api_limiter.clone(),
//!     Duration::from_secs(60),
//!     shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod generation;
pub mod rate_limit_sweep;

pub use generation::{
    generation_timer_task, handle_request, refresh_worker_task, GenerationJobMetrics,
    GenerationJobSnapshot,
};
pub use rate_limit_sweep::{rate_limit_sweep_task, SweepMetrics};
