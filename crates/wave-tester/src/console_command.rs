use crate::AppError;

use std::{panic::Location, str::FromStr};

use error_location::ErrorLocation;
use wave_tester_core::RecipeId;

/// How the operator names a recipe on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSelector {
    /// 1-based position in the offered list.
    Index(usize),
    /// Full recipe identifier.
    Id(RecipeId),
}

impl RecipeSelector {
    /// Resolves the selector against the offered recipes. Returns `None` for
    /// an out-of-range index. Identifiers pass through unchecked; the
    /// controller rejects unknown ones.
    pub fn resolve(&self, recipes: &[RecipeId]) -> Option<RecipeId> {
        match self {
            RecipeSelector::Index(index) => index
                .checked_sub(1)
                .and_then(|i| recipes.get(i))
                .cloned(),
            RecipeSelector::Id(recipe_id) => Some(recipe_id.clone()),
        }
    }
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Begin a run.
    Start,
    /// Pick the recipe for the run being started.
    Select(RecipeSelector),
    /// Stop the running session.
    Stop,
    /// Dismiss the recipe choice or cancel a pending authorization.
    Cancel,
    /// Approve the oldest authorization request on the simulated UI.
    Approve,
    /// Deny the oldest authorization request on the simulated UI.
    Deny,
    /// Reconnect to the service.
    Connect,
    /// Print the command list.
    Help,
    /// Tear down and exit.
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = AppError;

    #[track_caller]
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(invalid("empty command"));
        };
        let argument = words.next();
        if words.next().is_some() {
            return Err(invalid(format!("too many arguments to '{}'", verb)));
        }

        let command = match (verb.to_ascii_lowercase().as_str(), argument) {
            ("start", None) => ConsoleCommand::Start,
            ("select", Some(target)) => ConsoleCommand::Select(match target.parse::<usize>() {
                Ok(index) => RecipeSelector::Index(index),
                Err(_) => RecipeSelector::Id(RecipeId::from(target)),
            }),
            ("select", None) => return Err(invalid("usage: select <index|recipe-id>")),
            ("stop", None) => ConsoleCommand::Stop,
            ("cancel", None) => ConsoleCommand::Cancel,
            ("approve", None) => ConsoleCommand::Approve,
            ("deny", None) => ConsoleCommand::Deny,
            ("connect", None) => ConsoleCommand::Connect,
            ("help" | "?", None) => ConsoleCommand::Help,
            ("quit" | "exit", None) => ConsoleCommand::Quit,
            (_, Some(_)) if is_known(verb) => {
                return Err(invalid(format!("'{}' takes no argument", verb)));
            }
            _ => return Err(invalid(format!("unknown command '{}'", verb))),
        };

        Ok(command)
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb.to_ascii_lowercase().as_str(),
        "start" | "stop" | "cancel" | "approve" | "deny" | "connect" | "help" | "?" | "quit" | "exit"
    )
}

#[track_caller]
fn invalid(reason: impl Into<String>) -> AppError {
    AppError::InvalidCommand {
        reason: reason.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}
