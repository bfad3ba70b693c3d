//! Interactive prompts behind a trait so commands can be driven in tests

use dialoguer::{Confirm, Input, Password, Select};
use rewind::{RewindError, RewindResult};

pub trait UserInput {
    fn prompt_string(&self, prompt: &str) -> RewindResult<String>;
    fn prompt_password(&self, prompt: &str) -> RewindResult<String>;
    fn prompt_confirm(&self, prompt: &str, default: bool) -> RewindResult<bool>;
    fn prompt_select(&self, prompt: &str, items: &[String], default: usize) -> RewindResult<usize>;
}

// Real implementation using dialoguer
pub struct DialoguerInput;

fn read_error(e: dialoguer::Error) -> RewindError {
    RewindError::Input(format!("Failed to read input: {}", e))
}

impl UserInput for DialoguerInput {
    fn prompt_string(&self, prompt: &str) -> RewindResult<String> {
        Input::new()
            .with_prompt(prompt)
            .allow_empty(false)
            .interact_text()
            .map_err(read_error)
    }

    fn prompt_password(&self, prompt: &str) -> RewindResult<String> {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(read_error)
    }

    fn prompt_confirm(&self, prompt: &str, default: bool) -> RewindResult<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(read_error)
    }

    fn prompt_select(&self, prompt: &str, items: &[String], default: usize) -> RewindResult<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(read_error)
    }
}
