//! Authorization for locking and unlocking notes.
//!
//! The core never prompts anyone itself. A caller supplies a
//! [`StrongAuthenticator`] (biometrics or similar) and a [`SecretPrompt`]
//! (password entry); [`Authorizer`] runs the flow and hands back an
//! [`Authorization`] that lock operations require.
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::{AppState, NoteError, Result};

/// Platform authentication such as biometrics.
pub trait StrongAuthenticator {
    fn is_available(&self) -> bool;

    /// Returns true when the user was verified.
    fn verify(&self, reason: &str) -> bool;
}

/// Asks the user for a secret. `None` means they cancelled.
pub trait SecretPrompt {
    fn ask(&self, message: &str) -> Option<String>;
}

/// A [`StrongAuthenticator`] for platforms without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStrongAuth;

impl StrongAuthenticator for NoStrongAuth {
    fn is_available(&self) -> bool {
        false
    }

    fn verify(&self, _reason: &str) -> bool {
        false
    }
}

/// Proof that the user was authorized to change or read one locked note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    note_id: String,
}

impl Authorization {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    /// Fails unless this proof was issued for `note_id`.
    pub fn check(&self, note_id: &str) -> Result<()> {
        if self.note_id == note_id {
            Ok(())
        } else {
            Err(NoteError::auth(format!(
                "authorization was issued for note {}",
                self.note_id
            )))
        }
    }
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub struct Authorizer<'a> {
    strong: &'a dyn StrongAuthenticator,
    prompt: &'a dyn SecretPrompt,
}

impl<'a> Authorizer<'a> {
    pub fn new(strong: &'a dyn StrongAuthenticator, prompt: &'a dyn SecretPrompt) -> Self {
        Authorizer { strong, prompt }
    }

    /// Authorizes a lock toggle.
    ///
    /// Uses strong authentication when available. Otherwise the shared
    /// password is verified, or set up (entered twice) if there is none
    /// yet; `state` then carries the new digest and must be saved.
    pub fn authorize_toggle(&self, state: &mut AppState, note_id: &str) -> Result<Authorization> {
        if self.strong.is_available() {
            return self.strong_auth(note_id);
        }

        if state.has_shared_secret() {
            return self.verify_secret(state, note_id);
        }

        let secret = self
            .prompt
            .ask("Set a password for locked notes")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NoteError::auth("no password was set"))?;
        let confirmation = self
            .prompt
            .ask("Confirm the password")
            .ok_or_else(|| NoteError::auth("password setup cancelled"))?;
        if confirmation != secret {
            return Err(NoteError::auth("passwords do not match"));
        }

        state.shared_secret_hash = Some(hash_secret(&secret));
        info!("Lock password set");
        Ok(Authorization {
            note_id: note_id.to_string(),
        })
    }

    /// Authorizes opening a locked note. Never sets up a password.
    pub fn authorize_unlock(&self, state: &AppState, note_id: &str) -> Result<Authorization> {
        if self.strong.is_available() {
            return self.strong_auth(note_id);
        }
        if !state.has_shared_secret() {
            return Err(NoteError::auth("no lock password has been set"));
        }
        self.verify_secret(state, note_id)
    }

    fn strong_auth(&self, note_id: &str) -> Result<Authorization> {
        if self.strong.verify("Authenticate to access locked notes") {
            debug!("Strong authentication accepted for {}", note_id);
            Ok(Authorization {
                note_id: note_id.to_string(),
            })
        } else {
            warn!("Strong authentication declined for {}", note_id);
            Err(NoteError::auth("authentication declined"))
        }
    }

    fn verify_secret(&self, state: &AppState, note_id: &str) -> Result<Authorization> {
        let entered = self
            .prompt
            .ask("Enter the password for locked notes")
            .ok_or_else(|| NoteError::auth("password entry cancelled"))?;

        if state.shared_secret_hash.as_deref() == Some(hash_secret(&entered).as_str()) {
            Ok(Authorization {
                note_id: note_id.to_string(),
            })
        } else {
            warn!("Wrong lock password entered for {}", note_id);
            Err(NoteError::auth("wrong password"))
        }
    }
}
