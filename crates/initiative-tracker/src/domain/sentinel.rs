//! Sentinel bookends.
//!
//! Every encounter owns one `[ Setup ]` and one `[ Cleanup ]` entry. Their
//! ids are stored on the encounter when they are registered and resolved by
//! id from then on.

use initiative_core::identity::ParticipantDescriptor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rank::RankValue;

/// Display name of the round-opening sentinel.
pub const SETUP_LABEL: &str = "[ Setup ]";

/// Display name of the round-closing sentinel.
pub const CLEANUP_LABEL: &str = "[ Cleanup ]";

/// Which bookend a sentinel participant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelKind {
    /// Opens every round; always ranked first.
    Setup,
    /// Closes every round; always ranked last.
    Cleanup,
}

impl SentinelKind {
    /// The fixed rank of this sentinel.
    #[must_use]
    pub fn rank(self) -> RankValue {
        match self {
            Self::Setup => RankValue::SETUP,
            Self::Cleanup => RankValue::CLEANUP,
        }
    }

    /// The display name of this sentinel.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Setup => SETUP_LABEL,
            Self::Cleanup => CLEANUP_LABEL,
        }
    }

    /// What to ask the identity store for when creating this sentinel.
    #[must_use]
    pub fn descriptor(self) -> ParticipantDescriptor {
        ParticipantDescriptor {
            name: self.label().to_owned(),
            is_npc: false,
            hidden: true,
        }
    }
}

/// Ids of the two sentinels registered on an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelRefs {
    /// The `[ Setup ]` participant.
    pub setup: Uuid,
    /// The `[ Cleanup ]` participant.
    pub cleanup: Uuid,
}

impl SentinelRefs {
    /// The sentinel kind of `id`, if it is one of the two.
    #[must_use]
    pub fn kind_of(&self, id: Uuid) -> Option<SentinelKind> {
        if id == self.setup {
            Some(SentinelKind::Setup)
        } else if id == self.cleanup {
            Some(SentinelKind::Cleanup)
        } else {
            None
        }
    }

    /// The id registered for `kind`.
    #[must_use]
    pub fn id_of(&self, kind: SentinelKind) -> Uuid {
        match kind {
            SentinelKind::Setup => self.setup,
            SentinelKind::Cleanup => self.cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_are_hidden_and_named() {
        let setup = SentinelKind::Setup.descriptor();
        assert_eq!(setup.name, "[ Setup ]");
        assert!(setup.hidden);
        assert!(!setup.is_npc);
        assert_eq!(SentinelKind::Cleanup.descriptor().name, "[ Cleanup ]");
    }

    #[test]
    fn test_refs_resolve_by_id() {
        let refs = SentinelRefs {
            setup: Uuid::new_v4(),
            cleanup: Uuid::new_v4(),
        };
        assert_eq!(refs.kind_of(refs.setup), Some(SentinelKind::Setup));
        assert_eq!(refs.kind_of(refs.cleanup), Some(SentinelKind::Cleanup));
        assert_eq!(refs.kind_of(Uuid::new_v4()), None);
        assert_eq!(refs.id_of(SentinelKind::Cleanup), refs.cleanup);
    }
}
