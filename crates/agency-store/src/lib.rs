//! `agency-store`: SQLite implementation of the agency store traits.
//!
//! The schema lives in [`db::init_db`]. Two partial unique indexes back the
//! scheduling jobs' idempotency checks:
//!
//! | Index                          | Guards                                      |
//! |--------------------------------|---------------------------------------------|
//! | `idx_tasks_open_renewal`       | one open renewal task per policy milestone  |
//! | `idx_expenses_child_occurrence`| one child expense per parent occurrence     |

pub mod db;
pub mod error;
mod records;
mod rows;
pub mod store;

pub use error::{Result, StoreError};
pub use store::SqliteStore;
