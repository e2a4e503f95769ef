//! Startup credential bootstrap

use tracing::{info, warn};

use super::SessionStore;
use crate::credential::{CredentialDecoder, SessionScheme};
use crate::error::Result;

/// What bootstrap found or did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// A stored session was already present; the configured credential was not used
    Existing,
    /// The configured credential was decoded and saved
    Restored(SessionScheme),
    /// Nothing stored and nothing configured
    PairingRequired,
}

/// Make sure the store holds a credential before the first connect
///
/// A stored session always wins over `SESSION_ID`. Malformed or unfetchable
/// credentials are errors; a missing one means the gateway must pair.
pub async fn bootstrap(
    store: &SessionStore,
    decoder: &CredentialDecoder,
    session_id: Option<&str>,
) -> Result<Bootstrap> {
    if store.exists() {
        info!("Using stored session in {}", store.dir().display());
        return Ok(Bootstrap::Existing);
    }

    let credential = match decoder.decode(session_id.unwrap_or_default()).await {
        Ok(credential) => credential,
        Err(e) if e.is_missing_credential() => {
            warn!("No SESSION_ID configured and no stored session, falling back to pairing");
            return Ok(Bootstrap::PairingRequired);
        }
        Err(e) => return Err(e),
    };

    store.persist(&credential.payload).await?;
    Ok(Bootstrap::Restored(credential.scheme))
}
