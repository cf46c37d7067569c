use crate::error::{ExporterError, Result};
use crate::types::{Candidate, SelectionPolicy};
use tracing::warn;

/// Pick exactly one server from a distance-ranked list.
///
/// Under `Closest` the first element wins. Under `Pinned` the server must be
/// offered with exactly the requested ID; otherwise fallback to `Closest` is
/// only taken when explicitly allowed.
pub fn select<'a>(candidates: &'a [Candidate], policy: &SelectionPolicy) -> Result<&'a Candidate> {
    match policy {
        SelectionPolicy::Closest => closest(candidates),
        SelectionPolicy::Pinned {
            server_id,
            allow_fallback,
        } => match candidates.iter().find(|c| c.id == *server_id) {
            Some(server) => Ok(server),
            None if *allow_fallback => {
                warn!(
                    server_id = %server_id,
                    "pinned server is not available, falling back to closest server"
                );
                closest(candidates)
            }
            None => Err(ExporterError::ServerNotFound(server_id.clone())),
        },
    }
}

fn closest(candidates: &[Candidate]) -> Result<&Candidate> {
    candidates.first().ok_or(ExporterError::NoServersAvailable)
}
