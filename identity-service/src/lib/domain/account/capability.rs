use crate::domain::account::models::Account;
use crate::domain::account::models::AccountId;

pub fn is_privileged(actor: &Account) -> bool {
    actor.privileged
}

pub fn is_self(actor: &Account, target: &AccountId) -> bool {
    actor.id == *target
}

pub fn is_self_or_privileged(actor: &Account, target: &AccountId) -> bool {
    is_self(actor, target) || is_privileged(actor)
}

/// Named check over the authenticated actor, optionally against a target.
///
/// Capabilities are plain values computed on demand; they hold no state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Any active, authenticated account.
    Authenticated,
    Privileged,
    SelfOf(AccountId),
    SelfOrPrivileged(AccountId),
    /// At least one must hold. Empty never holds.
    AnyOf(Vec<Capability>),
    /// All must hold. Empty always holds.
    AllOf(Vec<Capability>),
}

impl Capability {
    pub fn permits(&self, actor: &Account) -> bool {
        match self {
            Capability::Authenticated => true,
            Capability::Privileged => is_privileged(actor),
            Capability::SelfOf(target) => is_self(actor, target),
            Capability::SelfOrPrivileged(target) => is_self_or_privileged(actor, target),
            Capability::AnyOf(capabilities) => capabilities.iter().any(|c| c.permits(actor)),
            Capability::AllOf(capabilities) => capabilities.iter().all(|c| c.permits(actor)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Authenticated => "authenticated",
            Capability::Privileged => "privileged",
            Capability::SelfOf(_) => "self",
            Capability::SelfOrPrivileged(_) => "self_or_privileged",
            Capability::AnyOf(_) => "any_of",
            Capability::AllOf(_) => "all_of",
        }
    }

    pub fn or(self, other: Capability) -> Capability {
        match self {
            Capability::AnyOf(mut capabilities) => {
                capabilities.push(other);
                Capability::AnyOf(capabilities)
            }
            first => Capability::AnyOf(vec![first, other]),
        }
    }

    pub fn and(self, other: Capability) -> Capability {
        match self {
            Capability::AllOf(mut capabilities) => {
                capabilities.push(other);
                Capability::AllOf(capabilities)
            }
            first => Capability::AllOf(vec![first, other]),
        }
    }
}
