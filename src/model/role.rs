use strum::Display;

/// Role ids as carried in the access token's `role` claim.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    /// Internal service accounts (schedulers, integrations).
    System = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::System),
            _ => None,
        }
    }

    /// May inspect integrity state and trigger heals or sweeps.
    pub fn is_operator(self) -> bool {
        matches!(self, Role::Admin | Role::Hr | Role::System)
    }
}
