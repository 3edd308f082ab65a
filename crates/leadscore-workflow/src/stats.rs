use leadscore_core::{Intent, Lead, Offer, ScoredResult};

/// Dashboard counts over the held state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_leads: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub offers: usize,
}

impl Stats {
    #[must_use]
    pub fn compute(offers: &[Offer], leads: &[Lead], results: &[ScoredResult]) -> Self {
        let count = |intent: Intent| results.iter().filter(|r| r.ai_intent == intent).count();
        Self {
            total_leads: leads.len(),
            high: count(Intent::High),
            medium: count(Intent::Medium),
            low: count(Intent::Low),
            offers: offers.len(),
        }
    }
}
