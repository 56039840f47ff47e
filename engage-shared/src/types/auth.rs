use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried in the host application's access token.
///
/// The engine only distinguishes admins (flag review, warnings, user status)
/// from everyone else; any role it does not know is treated as a plain user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[serde(other)]
    User,
}

/// JWT claims issued by the host application's identity layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(user_id: Uuid, role: UserRole, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            role,
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// The authenticated actor behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
    pub token_id: Uuid,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
            token_id: claims.jti,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_fall_back_to_user() {
        let role: UserRole = serde_json::from_str("\"moderator\"").unwrap();
        assert_eq!(role, UserRole::User);
        let admin: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(admin, UserRole::Admin);
    }

    #[test]
    fn negative_duration_is_already_expired() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, -10);
        assert!(claims.is_expired());
        let fresh = Claims::new(Uuid::new_v4(), UserRole::Admin, 60);
        assert!(!fresh.is_expired());
        assert_eq!(AuthUser::from(fresh.clone()).token_id, fresh.jti);
    }
}
