//! User identity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a user is allowed to operate on the farm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Farmer,
    DroneOperator,
    SecurityStaff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Farmer => "farmer",
            Role::DroneOperator => "drone_operator",
            Role::SecurityStaff => "security_staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "farmer" => Ok(Role::Farmer),
            "drone_operator" | "operator" => Ok(Role::DroneOperator),
            "security_staff" | "security" => Ok(Role::SecurityStaff),
            _ => Err(format!(
                "Invalid role: '{}'. Must be: admin, farmer, drone_operator, or security_staff",
                s
            )),
        }
    }
}

/// The identity of whoever is using this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A partial user record; `Some` fields overwrite, `None` fields are kept
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub avatar: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge the present fields into `user`
    pub fn apply_to(self, user: &mut User) {
        if let Some(id) = self.id {
            user.id = id;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(avatar) = self.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(created_at) = self.created_at {
            user.created_at = created_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mary() -> User {
        User {
            id: "farmer-1".to_string(),
            email: "farmer@demo.com".to_string(),
            name: "Mary Farmer".to_string(),
            role: Role::Farmer,
            avatar: None,
            created_at: "2024-01-02T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_role_roundtrip_names() {
        for role in [Role::Admin, Role::Farmer, Role::DroneOperator, Role::SecurityStaff] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(serde_json::to_value(role).unwrap(), role.as_str());
        }
    }

    #[test]
    fn test_role_parse_invalid() {
        let err = "pilot".parse::<Role>().unwrap_err();
        assert!(err.contains("Invalid role: 'pilot'"));
    }

    #[test]
    fn test_user_json_is_camel_case() {
        let json = serde_json::to_value(mary()).unwrap();

        assert_eq!(json["createdAt"], "2024-01-02T00:00:00Z");
        assert_eq!(json["role"], "farmer");
        assert!(json.get("avatar").is_none());
    }

    #[test]
    fn test_user_from_endpoint_json() {
        let raw = r#"{"id":"7","email":"a@b.c","name":"A","role":"drone_operator","avatar":"x.png","createdAt":"2024-01-03T00:00:00Z"}"#;
        let user: User = serde_json::from_str(raw).unwrap();

        assert_eq!(user.role, Role::DroneOperator);
        assert_eq!(user.avatar.as_deref(), Some("x.png"));
    }

    #[test]
    fn test_update_changes_only_named_fields() {
        let mut user = mary();
        UserUpdate::new().name("Mary F.").apply_to(&mut user);

        let expected = User {
            name: "Mary F.".to_string(),
            ..mary()
        };
        assert_eq!(user, expected);
    }

    #[test]
    fn test_update_multiple_fields() {
        let mut user = mary();
        UserUpdate::new()
            .role(Role::Admin)
            .avatar("avatars/mary.png")
            .apply_to(&mut user);

        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.avatar.as_deref(), Some("avatars/mary.png"));
        assert_eq!(user.email, "farmer@demo.com");
        assert_eq!(user.id, "farmer-1");
    }

    #[test]
    fn test_empty_update() {
        assert!(UserUpdate::new().is_empty());
        assert!(!UserUpdate::new().email("x@y.z").is_empty());

        let mut user = mary();
        UserUpdate::new().apply_to(&mut user);
        assert_eq!(user, mary());
    }
}
