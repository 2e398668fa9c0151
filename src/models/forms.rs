use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

const MAX_USERNAME_LEN: usize = 50;
const MAX_SUBJECT_LEN: usize = 100;
const MAX_DIFFICULTY_LEN: usize = 50;

/// The OAuth2 password form posted to `/token`.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> AppResult<()> {
        let username = self.username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::Validation(format!(
                "username must be between 1 and {} characters",
                MAX_USERNAME_LEN
            )));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("password must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerateForm {
    pub subject: String,
    pub difficulty: String,
    pub num_problems: u32,
    #[serde(default)]
    pub add_info: String,
}

impl GenerateForm {
    pub fn validate(&self, max_problems: u32) -> AppResult<()> {
        check_len("subject", &self.subject, MAX_SUBJECT_LEN)?;
        check_len("difficulty", &self.difficulty, MAX_DIFFICULTY_LEN)?;
        if self.num_problems == 0 || self.num_problems > max_problems {
            return Err(AppError::Validation(format!(
                "num_problems must be between 1 and {}",
                max_problems
            )));
        }
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(AppError::Validation(format!(
            "{} must be between 1 and {} characters",
            field, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(subject: &str, difficulty: &str, num_problems: u32) -> GenerateForm {
        GenerateForm {
            subject: subject.into(),
            difficulty: difficulty.into(),
            num_problems,
            add_info: String::new(),
        }
    }

    #[test]
    fn generate_form_bounds() {
        assert!(form("Algebra", "easy", 5).validate(50).is_ok());
        assert!(form("Algebra", "easy", 0).validate(50).is_err());
        assert!(form("Algebra", "easy", 51).validate(50).is_err());
        assert!(form("   ", "easy", 5).validate(50).is_err());
        assert!(form(&"x".repeat(101), "easy", 5).validate(50).is_err());
        assert!(form("Algebra", &"y".repeat(51), 5).validate(50).is_err());
    }

    #[test]
    fn register_request_requires_username_and_password() {
        let ok = RegisterRequest {
            username: "ada".into(),
            full_name: Some("Ada Lovelace".into()),
            password: "engine".into(),
        };
        assert!(ok.validate().is_ok());

        let no_password = RegisterRequest {
            password: String::new(),
            ..ok
        };
        assert!(no_password.validate().is_err());

        let long_name = RegisterRequest {
            username: "a".repeat(51),
            full_name: None,
            password: "pw".into(),
        };
        assert!(long_name.validate().is_err());
    }

    #[test]
    fn add_info_defaults_to_empty() {
        let form: GenerateForm =
            serde_json::from_str(r#"{"subject":"Physics","difficulty":"hard","num_problems":3}"#)
                .unwrap();
        assert_eq!(form.add_info, "");
    }
}
