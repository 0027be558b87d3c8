use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

/// Role the backend assigned to the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Mentor,
    Mentee,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mentor => "MENTOR",
            Self::Mentee => "MENTEE",
        }
    }
}

/// The session's bearer token and role.
///
/// The token and role are only ever set together, and a credential is
/// authenticated exactly when it carries a token.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    access_token: Option<SecretString>,
    role: Option<Role>,
}

impl Credential {
    /// No token, no role.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(access_token: SecretString, role: Role) -> Self {
        Self {
            access_token: Some(access_token),
            role: Some(role),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Token and role returned by a successful login or refresh.
///
/// Wire form: `{"accessToken": "...", "role": "MENTOR"}`. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub access_token: SecretString,
    pub role: Role,
}

impl From<IssuedCredential> for Credential {
    fn from(issued: IssuedCredential) -> Self {
        Self::authenticated(issued.access_token, issued.role)
    }
}
