//! Capability catalog and rotation
//!
//! Round-robin distribution of environment profiles across parallel workers.
//! The cursor is the only shared mutable state in the harness.

mod catalog;

pub use catalog::{catalog, endpoint_url, CapabilityProfile, BUILD_LABEL};

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::HarnessError;

/// Thread-safe round-robin scheduler over a fixed capability catalog.
///
/// One instance per process, injected into every worker. The lock is held
/// only for the read-compute-advance of the cursor, never across session
/// opening, so slow grid round trips don't serialize the run.
#[derive(Debug)]
pub struct CapabilityRotation {
    profiles: Vec<CapabilityProfile>,
    cursor: Mutex<usize>,
}

impl CapabilityRotation {
    /// Create a scheduler over the given catalog.
    ///
    /// An empty catalog is a fatal configuration error: every worker depends
    /// on the rotation, so there is nothing useful the run could do.
    pub fn new(profiles: Vec<CapabilityProfile>) -> Result<Self, HarnessError> {
        if profiles.is_empty() {
            return Err(HarnessError::Configuration(
                "capability catalog is empty".to_string(),
            ));
        }

        Ok(Self {
            profiles,
            cursor: Mutex::new(0),
        })
    }

    /// Hand out the next profile in catalog order, wrapping after the last.
    ///
    /// Under concurrent callers every catalog position is returned exactly
    /// once per window of `len()` calls; no two callers observe the same
    /// pre-advance cursor value.
    pub fn next(&self) -> CapabilityProfile {
        let profile = {
            let mut cursor = self.cursor.lock();
            let selected = self.profiles[*cursor].clone();
            *cursor = (*cursor + 1) % self.profiles.len();
            selected
        };

        debug!("Rotation assigned profile: {}", profile.name);
        profile
    }

    /// Number of profiles in the catalog.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use std::sync::Arc;

    fn rotation() -> CapabilityRotation {
        let creds = Credentials {
            username: "u".to_string(),
            access_key: "k".to_string(),
        };
        CapabilityRotation::new(catalog(&creds)).unwrap()
    }

    #[test]
    fn empty_catalog_is_a_fatal_configuration_error() {
        let err = CapabilityRotation::new(Vec::new()).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn sequential_calls_walk_the_catalog_in_order_and_wrap() {
        let rotation = rotation();
        let size = rotation.len();

        let first_pass: Vec<_> = (0..size).map(|_| rotation.next().name).collect();
        let expected: Vec<_> = catalog(&Credentials {
            username: "u".to_string(),
            access_key: "k".to_string(),
        })
        .into_iter()
        .map(|p| p.name)
        .collect();
        assert_eq!(first_pass, expected);

        // S+1th call wraps back to the first profile
        assert_eq!(rotation.next().name, expected[0]);
    }

    #[test]
    fn five_calls_over_three_profiles_yield_p0_p1_p2_p0_p1() {
        let rotation = rotation();
        let names: Vec<_> = (0..5).map(|_| rotation.next().name).collect();
        assert_eq!(
            names,
            vec![
                "Branded Google Chrome on Catalina",
                "Branded Microsoft Edge on Catalina",
                "Playwright Chromium on Catalina",
                "Branded Google Chrome on Catalina",
                "Branded Microsoft Edge on Catalina",
            ]
        );
    }

    #[test]
    fn concurrent_callers_never_duplicate_or_skip_positions() {
        let rotation = Arc::new(rotation());
        let size = rotation.len();
        let callers = 30; // 10 full windows over a 3-profile catalog

        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let rotation = rotation.clone();
                std::thread::spawn(move || rotation.next().name)
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            *counts.entry(handle.join().unwrap()).or_insert(0usize) += 1;
        }

        // 30 calls over 3 profiles: each profile exactly 10 times
        assert_eq!(counts.len(), size);
        assert!(counts.values().all(|&n| n == callers / size));
    }
}
