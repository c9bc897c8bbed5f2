use log::{ info, warn };
use std::fmt::Display;
use std::future::Future;

/// Runs `attempt` against each candidate in order and returns the first
/// success together with the candidate that produced it. Attempts never
/// overlap: candidate `i + 1` is only tried once candidate `i` has resolved.
/// Failures are logged and skipped. Returns `None` once every candidate has
/// failed.
pub async fn first_success<'a, C, T, E, F, Fut>(
    candidates: &'a [C],
    mut attempt: F
) -> Option<(&'a C, T)>
    where C: Display, E: Display, F: FnMut(&'a C) -> Fut, Fut: Future<Output = Result<T, E>>
{
    for (position, candidate) in candidates.iter().enumerate() {
        info!("Trying model {} ({}/{})", candidate, position + 1, candidates.len());
        match attempt(candidate).await {
            Ok(value) => {
                info!("Success with model: {}", candidate);
                return Some((candidate, value));
            }
            Err(e) => {
                warn!("Model {} failed: {}", candidate, e);
            }
        }
    }
    None
}
