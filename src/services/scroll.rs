//! Scroll-driven expansion of lazily loaded result lists.

use std::time::Duration;

use crate::browser::PageDriver;
use crate::models::ScrollConfig;

/// What one expansion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollOutcome {
    /// Rounds started, including the one that saw no growth
    pub rounds: usize,
    /// Highest listing count observed
    pub listing_count: usize,
}

/// Scrolls a page until the listing count stops growing.
pub struct ScrollDriver {
    selector: String,
    max_rounds: usize,
    settle_delay: Duration,
    step_px: i64,
    quiescence_timeout: Duration,
}

impl ScrollDriver {
    pub fn new(
        selector: impl Into<String>,
        config: &ScrollConfig,
        quiescence_timeout: Duration,
    ) -> Self {
        Self {
            selector: selector.into(),
            max_rounds: config.max_rounds,
            settle_delay: config.settle_delay(),
            step_px: config.step_px,
            quiescence_timeout,
        }
    }

    /// Expand the page, stopping at the first round without strict growth.
    ///
    /// Never fails: a timed-out quiescence wait, a failed count or a failed
    /// scroll all count as "no growth" for the round.
    pub async fn expand(&self, page: &dyn PageDriver) -> ScrollOutcome {
        let mut outcome = ScrollOutcome::default();

        for round in 1..=self.max_rounds {
            outcome.rounds = round;
            tokio::time::sleep(self.settle_delay).await;

            let current = match self.scroll_and_count(page).await {
                Ok(count) => count,
                Err(e) => {
                    log::warn!("Scroll round {} treated as no growth: {}", round, e);
                    outcome.listing_count
                }
            };

            if current <= outcome.listing_count {
                log::debug!(
                    "Scroll round {}: {} listings, no growth; stopping",
                    round,
                    current
                );
                break;
            }

            log::debug!("Scroll round {}: {} listings", round, current);
            outcome.listing_count = current;
        }

        outcome
    }

    async fn scroll_and_count(&self, page: &dyn PageDriver) -> crate::error::Result<usize> {
        page.scroll_by(0, self.step_px).await?;
        page.wait_for_quiescence(self.quiescence_timeout).await?;
        page.count(&self.selector).await
    }
}
