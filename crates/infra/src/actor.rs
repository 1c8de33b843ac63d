//! Who is performing a mutation.

use std::sync::Arc;

use stockledger_core::ActorId;

use crate::ledger::LedgerError;

/// Source of the current authenticated actor (session, request context, CLI flag).
pub trait ActorProvider: Send + Sync {
    fn current_actor(&self) -> Option<ActorId>;
}

impl<P> ActorProvider for Arc<P>
where
    P: ActorProvider + ?Sized,
{
    fn current_actor(&self) -> Option<ActorId> {
        (**self).current_actor()
    }
}

/// Mutations require a known actor.
pub fn require_actor(provider: &dyn ActorProvider) -> Result<ActorId, LedgerError> {
    provider.current_actor().ok_or(LedgerError::MissingActor)
}

/// Fixed actor, for tools, seeding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticActorProvider {
    actor: Option<ActorId>,
}

impl StaticActorProvider {
    pub fn new(actor: ActorId) -> Self {
        Self { actor: Some(actor) }
    }

    /// A provider with no signed-in actor.
    pub fn anonymous() -> Self {
        Self { actor: None }
    }
}

impl ActorProvider for StaticActorProvider {
    fn current_actor(&self) -> Option<ActorId> {
        self.actor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_actor_is_an_error() {
        let err = require_actor(&StaticActorProvider::anonymous()).unwrap_err();
        assert!(matches!(err, LedgerError::MissingActor));
    }

    #[test]
    fn known_actor_is_returned() {
        let actor = ActorId::new("alice@example.org").unwrap();
        let provider = Arc::new(StaticActorProvider::new(actor.clone()));
        assert_eq!(require_actor(&provider).unwrap(), actor);
    }
}
