use stockledger_auth::{JwtClaims, Role};
use stockledger_core::UserId;
use stockledger_inventory::ActorRef;

/// Authenticated actor for a request (identity + role), derived from the bearer token.
///
/// Present on every protected route; ledger writes are attributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
    username: String,
    role: Role,
}

impl ActorContext {
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn actor_ref(&self) -> ActorRef {
        ActorRef::new(self.user_id, self.username.clone())
    }
}

impl From<JwtClaims> for ActorContext {
    fn from(claims: JwtClaims) -> Self {
        Self::new(claims.sub, claims.username, claims.role)
    }
}
