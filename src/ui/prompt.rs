//! Interactive password prompt.

use anyhow::Result;
use inquire::validator::MinLengthValidator;
use inquire::PasswordDisplayMode;

use crate::secret::Password;

pub struct Prompt {
    password_min_length: usize,
}

impl Prompt {
    pub fn new(password_min_length: usize) -> Self {
        Self { password_min_length }
    }

    /// Asks for an encryption password twice. Both entries must match.
    pub fn encryption_password(&self) -> Result<Password> {
        let password = inquire::Password::new("Enter encryption password:")
            .with_display_mode(PasswordDisplayMode::Masked)
            .with_validator(MinLengthValidator::new(self.password_min_length))
            .with_custom_confirmation_message("Confirm password:")
            .with_custom_confirmation_error_message("passwords do not match")
            .prompt()?;

        Ok(Password::from_string(password))
    }
}
