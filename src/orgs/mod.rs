//! Organizations, memberships, and the invitation lifecycle.

pub mod actions;
mod repository;
mod types;

#[cfg(any(test, feature = "mocks"))]
mod mocks;

pub use repository::{
    InvitationRepository, MembershipRepository, NewInvitation, OrganizationRepository,
};
pub use types::{Invitation, InvitationStatus, Organization, OrganizationMembership};

#[cfg(any(test, feature = "mocks"))]
pub use mocks::MockOrgStore;
