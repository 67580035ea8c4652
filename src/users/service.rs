//! In-memory user store

use super::model::{NewUser, User};
use chrono::Utc;
use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("Name, email and password are required")]
    MissingFields,
}

#[derive(Debug, Default)]
pub struct UserService {
    users: RwLock<Vec<User>>,
}

impl UserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the three demo accounts
    pub fn seeded() -> Self {
        let now = Utc::now();
        let seed = |id: &str, email: &str, password: &str| User {
            id: id.to_string(),
            name: None,
            email: email.to_string(),
            password: password.to_string(),
            created_at: now,
            updated_at: None,
        };

        let mut first = seed("1", "test@test.com", "test");
        first.updated_at = Some(now);

        Self {
            users: RwLock::new(vec![
                first,
                seed("2", "test2@test.com", "test2"),
                seed("3", "test3@test.com", "test3"),
            ]),
        }
    }

    pub fn all(&self) -> Vec<User> {
        self.users.read().clone()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Validate and store a new user; nothing is stored on failure
    pub fn create(&self, input: NewUser) -> Result<User, UserError> {
        let (Some(name), Some(email), Some(password)) = (
            non_blank(input.name),
            non_blank(input.email),
            non_blank(input.password),
        ) else {
            return Err(UserError::MissingFields);
        };

        let mut users = self.users.write();
        let next_id = users
            .iter()
            .filter_map(|user| user.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        let user = User {
            id: next_id.to_string(),
            name: Some(name),
            email,
            password,
            created_at: Utc::now(),
            updated_at: None,
        };
        users.push(user.clone());
        Ok(user)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
