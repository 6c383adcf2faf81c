//! Persistence traits for user accounts.
//!
//! Organization and invitation storage live in [`crate::orgs`]; this module
//! covers the user side shared by every scheme.

mod user;

#[cfg(any(test, feature = "mocks"))]
mod user_mock;

pub use user::{NewUser, User, UserRepository};

#[cfg(any(test, feature = "mocks"))]
pub use user_mock::MockUserRepository;
