//! Guards applied synchronously at the DDL boundary.
//!
//! User and role management proper lives outside the control plane; these
//! checks exist because replication DDL is gated on them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivilegeError {
    #[error("Cannot drop a superuser '{0}'")]
    DropSuperuser(String),
    #[error("Cannot alter privileges for superuser '{0}'")]
    AlterSuperuser(String),
    #[error("Cannot drop user '{user}' because subscription '{subscription}' is owned by it")]
    OwnsSubscription { user: String, subscription: String },
}

/// Minimal user view the guards need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    name: String,
    superuser: bool,
}

impl User {
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superuser: false,
        }
    }

    pub fn superuser(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superuser: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }
}

/// DROP USER may not remove a superuser.
pub fn ensure_droppable(user: &User) -> Result<(), PrivilegeError> {
    if user.is_superuser() {
        return Err(PrivilegeError::DropSuperuser(user.name().to_string()));
    }
    Ok(())
}

/// GRANT/REVOKE may not touch a superuser's privileges.
pub fn ensure_privileges_alterable(user: &User) -> Result<(), PrivilegeError> {
    if user.is_superuser() {
        return Err(PrivilegeError::AlterSuperuser(user.name().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_cannot_be_dropped() {
        let err = ensure_droppable(&User::superuser("admin")).unwrap_err();
        assert_eq!(err.to_string(), "Cannot drop a superuser 'admin'");
        assert!(ensure_droppable(&User::regular("alice")).is_ok());
    }

    #[test]
    fn superuser_privileges_cannot_be_altered() {
        let err = ensure_privileges_alterable(&User::superuser("admin")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot alter privileges for superuser 'admin'"
        );
        assert!(ensure_privileges_alterable(&User::regular("alice")).is_ok());
    }
}
