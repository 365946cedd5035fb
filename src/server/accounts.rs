//! In-memory account directory for the development server

use crate::auth::RegisterRequest;
use crate::session::{User, DEMO_ACCOUNTS};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Password every seeded demo account accepts
pub const DEMO_PASSWORD: &str = "demo123";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("account already exists: {0}")]
    AlreadyExists(String),
}

struct Account {
    user: User,
    password: String,
}

/// Accounts keyed by email
pub struct AccountDirectory {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Directory holding the four demo users
    pub fn seeded() -> Self {
        let directory = Self::new();
        {
            let mut accounts = directory.accounts.write();
            for demo in &DEMO_ACCOUNTS {
                accounts.insert(
                    demo.email.to_string(),
                    Account {
                        user: demo.to_user(),
                        password: DEMO_PASSWORD.to_string(),
                    },
                );
            }
        }
        directory
    }

    /// The user if `email` exists and `password` matches
    pub fn verify(&self, email: &str, password: &str) -> Option<User> {
        let accounts = self.accounts.read();
        accounts
            .get(email)
            .filter(|account| account.password == password)
            .map(|account| account.user.clone())
    }

    pub fn register(&self, request: &RegisterRequest) -> Result<User, AccountError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&request.email) {
            return Err(AccountError::AlreadyExists(request.email.clone()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: request.email.clone(),
            name: request.name.clone(),
            role: request.role,
            avatar: None,
            created_at: Utc::now(),
        };
        accounts.insert(
            request.email.clone(),
            Account {
                user: user.clone(),
                password: request.password.clone(),
            },
        );
        Ok(user)
    }

    pub fn find_by_id(&self, id: &str) -> Option<User> {
        self.accounts
            .read()
            .values()
            .find(|account| account.user.id == id)
            .map(|account| account.user.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AccountDirectory {
    fn default() -> Self {
        Self::seeded()
    }
}
