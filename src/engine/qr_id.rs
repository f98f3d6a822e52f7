use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;

use crate::error::AppError;
use crate::models::qr::{QrCode, QrId};

/// Draws random ids until one is free, then inserts the record built for it.
/// The vacancy check and the insert happen under the same shard lock.
pub fn insert_with_unique_id<R, F>(
    qr_codes: &DashMap<QrId, QrCode>,
    rng: &mut R,
    max_attempts: usize,
    build: F,
) -> Result<QrCode, AppError>
where
    R: Rng + ?Sized,
    F: FnOnce(QrId) -> QrCode,
{
    for attempt in 1..=max_attempts {
        let candidate = QrId::random(rng);

        match qr_codes.entry(candidate.clone()) {
            Entry::Vacant(slot) => {
                let code = build(candidate);
                slot.insert(code.clone());
                return Ok(code);
            }
            Entry::Occupied(_) => {
                debug!(qr_id = %candidate, attempt, "qr id collision; retrying");
            }
        }
    }

    Err(AppError::QrIdsExhausted(max_attempts))
}
