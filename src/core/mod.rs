//! Core types shared by every lifeline component.
//!
//! - [`error`] - The error taxonomy (`GuardError`, `CheckError`, `FetchError`,
//!   `InstallError`, `RegistrationError`) and user-facing [`ErrorContext`]
//! - [`outcome`] - [`Outcome`], the value the top-level entry point acts on
//!   (continue, re-execute the process image, or exit)

pub mod error;
pub mod outcome;

pub use error::{
    CheckError, ErrorContext, FetchError, GuardError, InstallError, RegistrationError,
    user_friendly_error,
};
pub use outcome::{Outcome, RestartRequest};
