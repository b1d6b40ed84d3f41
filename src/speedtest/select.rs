use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{Server, SpeedtestBackend};
use crate::error::SelectionError;

/// Round trips used to check that a candidate answers at all.
const SELECTION_PING_COUNT: usize = 1;

/// Picks the first candidate, in catalog order, that is not blacklisted and
/// answers a single latency probe. At most `max_probes` candidates are probed;
/// blacklisted ones are skipped without counting.
pub async fn select_server<B>(
    backend: &B,
    candidates: &[Server],
    blacklist: &BTreeSet<String>,
    max_probes: usize,
) -> Result<Server, SelectionError>
where
    B: SpeedtestBackend + ?Sized,
{
    let mut probed = 0;

    for server in candidates {
        if blacklist.contains(&server.host) {
            debug!(host = %server.host, "server is blacklisted, skipping");
            continue;
        }
        if probed >= max_probes {
            break;
        }

        probed += 1;
        match backend.ping(server, SELECTION_PING_COUNT).await {
            Ok(latency) => {
                debug!(
                    host = %server.host,
                    sponsor = %server.sponsor,
                    distance_km = ?server.distance,
                    ?latency,
                    "server answered"
                );
                return Ok(server.clone());
            }
            Err(e) => {
                warn!(
                    "failed to connect to {}, trying another. Error: {}",
                    server.host, e
                );
            }
        }
    }

    Err(SelectionError::NoAvailableServer { probed })
}
