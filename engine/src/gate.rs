//! Initialization gate.
//!
//! Tracks whether the analytics backend has been given credentials. The
//! transition Uninitialized -> Initialized happens once and is never undone.

use crate::{error::Result, validate::is_blank, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials accepted by [`InitializationGate::open`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub game_key: String,
    pub secret_key: String,
}

impl Credentials {
    /// Create credentials, rejecting blank keys.
    pub fn new(game_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        let game_key = game_key.into();
        let secret_key = secret_key.into();
        if is_blank(&game_key) || is_blank(&secret_key) {
            return Err(Error::MissingCredentials);
        }
        Ok(Self {
            game_key,
            secret_key,
        })
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("game_key", &self.game_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Initialization state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initialized,
}

/// One-way gate from Uninitialized to Initialized.
#[derive(Debug, Clone, Default)]
pub struct InitializationGate {
    credentials: Option<Credentials>,
}

impl InitializationGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> InitState {
        if self.credentials.is_some() {
            InitState::Initialized
        } else {
            InitState::Uninitialized
        }
    }

    /// Whether the gate has been opened.
    pub fn is_initialized(&self) -> bool {
        self.credentials.is_some()
    }

    /// Credentials the gate was opened with.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Open the gate.
    ///
    /// Fails with [`Error::MissingCredentials`] when either key is blank and
    /// with [`Error::AlreadyInitialized`] on any call after the first success.
    /// Neither failure changes the state.
    pub fn open(&mut self, game_key: &str, secret_key: &str) -> Result<&Credentials> {
        if self.credentials.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let credentials = Credentials::new(game_key, secret_key)?;
        let credentials: &Credentials = self.credentials.insert(credentials);
        Ok(credentials)
    }
}
