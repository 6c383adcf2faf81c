//! One action struct per operation: construct with the stores it needs,
//! then call `execute`. Sinks default to the null implementations.

mod accept;
mod cancel;
mod create;
mod decline;
mod invite;
mod members;
mod prune;

pub use accept::{AcceptConfig, AcceptInvitationAction, EmailMatchPolicy};
pub use cancel::CancelInvitationAction;
pub use create::CreateOrganizationAction;
pub use decline::DeclineInvitationAction;
pub use invite::{InvitationConfig, IssueInvitationAction};
pub use members::{ChangeMemberRoleAction, RemoveMemberAction};
pub use prune::PruneInvitationsAction;
