//! Attendance tracking for a parish catechesis program: weighted attendance
//! rates for children and catechists, the monthly participation trend, CSV
//! exports, pastoral report prompts and absence notices.

pub mod calendar;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod monthly;
pub mod notify;
pub mod rates;
pub mod report;
pub mod trend;

pub use error::{Error, Result};
