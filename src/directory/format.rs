//! Bind identity and search filter templates.
//!
//! Values are interpolated verbatim: usernames and domains must be
//! sanitized by the caller.

/// Discriminator for Active Directory user principal names.
pub const USER_PRINCIPAL_NAME: &str = "username@LDAPDOMAIN";
/// Discriminator for OpenLDAP and 389 Directory Server.
pub const UID: &str = "uid=username,LDAPDOMAIN";

/// Naming convention expected by a tenant's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingFormat {
    /// `username@domain`.
    UserPrincipalName,
    /// `uid=username,domain`.
    Uid,
    /// `domain\username`.
    #[default]
    DownLevel,
}

impl NamingFormat {
    /// Select a format by exact match. Anything else is [`NamingFormat::DownLevel`].
    pub fn parse(discriminator: &str) -> Self {
        match discriminator {
            USER_PRINCIPAL_NAME => NamingFormat::UserPrincipalName,
            UID => NamingFormat::Uid,
            _ => NamingFormat::DownLevel,
        }
    }

    /// Build the identity presented during bind.
    pub fn identity(&self, domain: &str, username: &str) -> String {
        match self {
            NamingFormat::UserPrincipalName => format!("{username}@{domain}"),
            NamingFormat::Uid => format!("uid={username},{domain}"),
            NamingFormat::DownLevel => format!("{domain}\\{username}"),
        }
    }

    /// Build the filter matching the user entry.
    pub fn filter(&self, username: &str) -> String {
        match self {
            NamingFormat::UserPrincipalName => {
                format!("(&(objectclass=person)(sAMAccountName={username}))")
            },
            NamingFormat::Uid => format!(
                "(&(|(objectclass=person)(objectclass=iNetOrgPerson))(uid={username}))"
            ),
            NamingFormat::DownLevel => format!("(sAMAccountName={username})"),
        }
    }
}
