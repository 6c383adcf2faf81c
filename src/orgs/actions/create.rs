use std::sync::Arc;

use serde_json::json;

use crate::access::OrgRole;
use crate::orgs::repository::{MembershipRepository, OrganizationRepository};
use crate::orgs::types::Organization;
use crate::repository::User;
use crate::sinks::{AuditEvent, AuditSink, NullAuditSink};
use crate::AuthError;

pub struct CreateOrganizationAction<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<S> CreateOrganizationAction<S>
where
    S: OrganizationRepository + MembershipRepository,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            audit: Arc::new(NullAuditSink),
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Creates an organization with the creator as its first owner. The
    /// owner membership is part of the same operation, so no organization
    /// exists without one.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "create_organization", skip(self, creator), err)
    )]
    pub async fn execute(&self, creator: &User, name: &str) -> Result<Organization, AuthError> {
        if !creator.is_active() {
            return Err(AuthError::UserDisabled);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Configuration(
                "organization name must not be empty".into(),
            ));
        }

        let organization = self.store.create(name, &slugify(name)).await?;
        self.store
            .upsert(organization.id, creator.id, OrgRole::Owner)
            .await?;

        let event = AuditEvent::new("organization.created", organization.id, Some(creator.id))
            .with_detail(json!({ "name": organization.name }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"organization.created\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"organization created\", org_id={}, owner_id={}",
            organization.id,
            creator.id
        );
        Ok(organization)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_owned()
}
