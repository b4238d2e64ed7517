//! Role hierarchy and the minimum-seniority access policy.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account roles, ordered by seniority.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl Role {
    /// Seniority rank; higher outranks lower.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Owner => 4,
            Self::Admin => 3,
            Self::Editor => 2,
            Self::Viewer => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Editor => "EDITOR",
            Self::Viewer => "VIEWER",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OWNER" => Some(Self::Owner),
            "ADMIN" => Some(Self::Admin),
            "EDITOR" => Some(Self::Editor),
            "VIEWER" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Roles an applicant may request for themselves. Owner and Admin are
    /// granted only by an administrator during approval or out of band.
    #[must_use]
    pub const fn self_assignable(self) -> bool {
        matches!(self, Self::Editor | Self::Viewer)
    }
}

/// Grant access when the caller's role ranks at or above the most junior
/// role in the allowed set. Listing Editor therefore admits Editor, Admin,
/// and Owner without naming them.
#[must_use]
pub fn authorize(role: Role, allowed: &[Role]) -> bool {
    allowed
        .iter()
        .map(|allowed_role| allowed_role.rank())
        .min()
        .is_some_and(|floor| role.rank() >= floor)
}

#[cfg(test)]
mod tests {
    use super::{authorize, Role};

    #[test]
    fn rank_is_strictly_ordered() {
        assert!(Role::Owner.rank() > Role::Admin.rank());
        assert!(Role::Admin.rank() > Role::Editor.rank());
        assert!(Role::Editor.rank() > Role::Viewer.rank());
    }

    #[test]
    fn minimum_seniority_admits_senior_roles() {
        let allowed = [Role::Editor];
        assert!(authorize(Role::Owner, &allowed));
        assert!(authorize(Role::Admin, &allowed));
        assert!(authorize(Role::Editor, &allowed));
        assert!(!authorize(Role::Viewer, &allowed));
    }

    #[test]
    fn mixed_allowed_set_uses_most_junior_entry() {
        let allowed = [Role::Admin, Role::Viewer];
        assert!(authorize(Role::Viewer, &allowed));
        assert!(authorize(Role::Editor, &allowed));
    }

    #[test]
    fn empty_allowed_set_denies_everyone() {
        assert!(!authorize(Role::Owner, &[]));
    }

    #[test]
    fn parse_round_trips_database_values() {
        for role in [Role::Owner, Role::Admin, Role::Editor, Role::Viewer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("ROOT"), None);
    }

    #[test]
    fn only_junior_roles_are_self_assignable() {
        assert!(Role::Editor.self_assignable());
        assert!(Role::Viewer.self_assignable());
        assert!(!Role::Admin.self_assignable());
        assert!(!Role::Owner.self_assignable());
    }

    #[test]
    fn serde_uses_uppercase_names() {
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"EDITOR\"");
        let role: Role = serde_json::from_str("\"OWNER\"").unwrap();
        assert_eq!(role, Role::Owner);
    }
}
