// EN: src/system/prompter.rs

use dialoguer::{Input, Select, theme::ColorfulTheme};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Interactive prompt failed: {0}")]
    Terminal(#[from] dialoguer::Error),
    #[error("No answer available for prompt '{0}'")]
    NoAnswer(String),
}

/// Asks the user for a value, either free text or one of a list of choices.
pub trait Prompter: Send + Sync + fmt::Debug {
    fn input(&self, question: &str, default: &str) -> Result<String, PromptError>;
    fn choose(&self, question: &str, choices: &[String]) -> Result<String, PromptError>;
}

/// Prompts on the terminal through `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, question: &str, default: &str) -> Result<String, PromptError> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(question);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn choose(&self, question: &str, choices: &[String]) -> Result<String, PromptError> {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .items(choices)
            .default(0)
            .interact()?;
        choices
            .get(selection)
            .cloned()
            .ok_or_else(|| PromptError::NoAnswer(question.to_string()))
    }
}

/// Answers prompts from a fixed queue. Records every question asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next(&self, question: &str) -> Option<String> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(question.to_string());
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&self, question: &str, default: &str) -> Result<String, PromptError> {
        Ok(self
            .next(question)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    fn choose(&self, question: &str, choices: &[String]) -> Result<String, PromptError> {
        let answer = self
            .next(question)
            .ok_or_else(|| PromptError::NoAnswer(question.to_string()))?;
        if choices.contains(&answer) {
            Ok(answer)
        } else {
            Err(PromptError::NoAnswer(question.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompter_falls_back_to_default() {
        let prompter = ScriptedPrompter::new(["", "typed"]);
        assert_eq!(prompter.input("first?", "dflt").unwrap(), "dflt");
        assert_eq!(prompter.input("second?", "dflt").unwrap(), "typed");
        assert_eq!(prompter.input("third?", "dflt").unwrap(), "dflt");
        assert_eq!(prompter.asked(), vec!["first?", "second?", "third?"]);
    }

    #[test]
    fn test_scripted_prompter_only_accepts_listed_choices() {
        let choices = vec!["red".to_string(), "blue".to_string()];
        let prompter = ScriptedPrompter::new(["blue", "green"]);
        assert_eq!(prompter.choose("color?", &choices).unwrap(), "blue");
        assert!(prompter.choose("color?", &choices).is_err());
    }
}
