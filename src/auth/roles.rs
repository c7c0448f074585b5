//! Role based authorization.

use crate::db::Role;

/// A set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet {
    admin: bool,
    manager: bool,
    customer: bool,
}

impl RoleSet {
    pub const NONE: RoleSet = RoleSet {
        admin: false,
        manager: false,
        customer: false,
    };

    pub const ALL: RoleSet = RoleSet {
        admin: true,
        manager: true,
        customer: true,
    };

    pub const fn of(roles: &[Role]) -> Self {
        let mut set = Self::NONE;
        let mut i = 0;
        while i < roles.len() {
            set = set.with(roles[i]);
            i += 1;
        }
        set
    }

    pub const fn with(mut self, role: Role) -> Self {
        match role {
            Role::Admin => self.admin = true,
            Role::Manager => self.manager = true,
            Role::Customer => self.customer = true,
        }
        self
    }

    pub const fn contains(&self, role: Role) -> bool {
        match role {
            Role::Admin => self.admin,
            Role::Manager => self.manager,
            Role::Customer => self.customer,
        }
    }
}

/// Whether `role` may proceed. Only meaningful on already verified claims.
pub fn allow(role: Role, allowed: RoleSet) -> bool {
    allowed.contains(role)
}

/// Compile-time role requirement for the `Auth` extractor.
pub trait RoleConstraint {
    const ALLOWED: RoleSet;
}

/// Only administrators.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ALLOWED: RoleSet = RoleSet::of(&[Role::Admin]);
}
