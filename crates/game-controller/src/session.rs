use serde::{Deserialize, Serialize};

/// The signed-in user a final score is credited to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Who is playing. Only a signed-in session forwards scores to the store;
/// guests keep their local history only.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Guest,
    SignedIn(Identity),
}

impl Session {
    pub fn signed_in(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Session::SignedIn(Identity {
            user_id: user_id.into(),
            username: username.into(),
        })
    }

    /// The identity scores are submitted under, if any.
    pub fn scoring_identity(&self) -> Option<&Identity> {
        match self {
            Session::Guest => None,
            Session::SignedIn(identity) => Some(identity),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Session::Guest => "guest",
            Session::SignedIn(identity) => &identity.username,
        }
    }
}
