//! # Lockin
//!
//! Monthly habit tracking against a remote habits service.
//!
//! This crate provides:
//! - Calendar arithmetic for navigating months and deciding which days are editable
//! - Habit records with derived completion counts and percentages
//! - A month controller with optimistic toggles, rollback and stale-response handling
//! - A REST gateway and login client sharing one bearer-token session
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lockin::{AuthSession, Config, DateWindow, HabitsMonthController, HttpGateway};
//!
//! # async fn run() -> lockin::Result<()> {
//! let config = Config::load()?;
//! let gateway = HttpGateway::new(&config.server, AuthSession::with_token("token"))?;
//! let controller = HabitsMonthController::new(Arc::new(gateway), DateWindow::from_local_now());
//! controller.initialize().await?;
//! for record in controller.records() {
//!     println!("{}: {}%", record.name(), record.percentage());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod controller;
pub mod date_window;
pub mod display;
pub mod error;
pub mod gateway;
pub mod habit;
pub mod session;

pub use auth::AuthClient;
pub use config::Config;
pub use controller::{HabitsMonthController, LoadOutcome, MonthView};
pub use date_window::{DateWindow, Direction, YearMonth};
pub use error::{ConflictError, Error, RemoteError, Result, ValidationError};
pub use gateway::{HabitsGateway, HttpGateway};
pub use habit::{HabitId, HabitRecord};
pub use session::AuthSession;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "lockin";
