//! Offline identities used when the auth endpoint cannot be reached
//!
//! A fixed set of demo addresses map to preset users; any other address gets
//! a generated farmer whose name is the capitalized local part of the email.

use crate::session::user::{Role, User};
use chrono::Utc;

/// Prefix of locally generated placeholder tokens
pub const MOCK_TOKEN_PREFIX: &str = "mock-jwt-token-";

/// A preset demo identity
#[derive(Debug, Clone, Copy)]
pub struct DemoAccount {
    pub id: &'static str,
    pub email: &'static str,
    pub name: &'static str,
    pub role: Role,
}

pub const DEMO_ACCOUNTS: [DemoAccount; 4] = [
    DemoAccount {
        id: "admin-1",
        email: "admin@demo.com",
        name: "John Administrator",
        role: Role::Admin,
    },
    DemoAccount {
        id: "farmer-1",
        email: "farmer@demo.com",
        name: "Mary Farmer",
        role: Role::Farmer,
    },
    DemoAccount {
        id: "operator-1",
        email: "operator@demo.com",
        name: "Bob Operator",
        role: Role::DroneOperator,
    },
    DemoAccount {
        id: "security-1",
        email: "security@demo.com",
        name: "Alice Security",
        role: Role::SecurityStaff,
    },
];

impl DemoAccount {
    pub fn find(email: &str) -> Option<&'static DemoAccount> {
        DEMO_ACCOUNTS.iter().find(|account| account.email == email)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.to_string(),
            email: self.email.to_string(),
            name: self.name.to_string(),
            role: self.role,
            avatar: None,
            created_at: Utc::now(),
        }
    }
}

/// Identity synthesized for `login` when the endpoint fails
pub fn offline_identity(email: &str) -> User {
    if let Some(account) = DemoAccount::find(email) {
        return account.to_user();
    }

    User {
        id: generated_id(),
        email: email.to_string(),
        name: display_name_from_email(email),
        role: Role::Farmer,
        avatar: None,
        created_at: Utc::now(),
    }
}

/// Identity synthesized for `register` when the endpoint fails
pub fn registered_identity(email: &str, name: &str, role: Role) -> User {
    User {
        id: generated_id(),
        email: email.to_string(),
        name: name.to_string(),
        role,
        avatar: None,
        created_at: Utc::now(),
    }
}

/// Local part of the address with its first character uppercased
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut chars = local.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Placeholder credential for offline sessions
pub fn mock_token() -> String {
    format!("{}{}", MOCK_TOKEN_PREFIX, Utc::now().timestamp_millis())
}

fn generated_id() -> String {
    Utc::now().timestamp_millis().to_string()
}
