//! Gap limit tracking for seed-only address discovery
//!
//! Implements the BIP44 gap limit rule: a chain is exhausted once a run of
//! `limit` consecutive unused addresses has been observed.

/// Standard gap limit (BIP44 recommendation)
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Gap limit applied to the top-priority scheme
pub const DEFAULT_EXTENDED_GAP_LIMIT: u32 = 100;

/// Stages of gap limit processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapLimitStage {
    /// Addresses are still being checked
    Scanning,
    /// The gap limit has been reached
    Complete,
}

/// Gap limit tracker for a single address chain
#[derive(Debug, Clone)]
pub struct GapLimit {
    /// The gap limit value
    pub limit: u32,
    /// Current stage of processing
    pub stage: GapLimitStage,
    /// Count of consecutive unused addresses
    pub current_unused_count: u32,
}

impl GapLimit {
    /// Create a new gap limit tracker
    pub fn new(limit: u32) -> Self {
        let mut gap = Self {
            limit,
            stage: GapLimitStage::Scanning,
            current_unused_count: 0,
        };
        gap.update_stage();
        gap
    }

    /// Record that the next address holds funds or has history
    pub fn mark_used(&mut self) {
        self.current_unused_count = 0;
        self.update_stage();
    }

    /// Record that the next address is empty
    pub fn mark_unused(&mut self) {
        self.current_unused_count += 1;
        self.update_stage();
    }

    fn update_stage(&mut self) {
        self.stage = if self.current_unused_count >= self.limit {
            GapLimitStage::Complete
        } else {
            GapLimitStage::Scanning
        };
    }

    /// Whether the chain is exhausted
    pub fn limit_reached(&self) -> bool {
        self.stage == GapLimitStage::Complete
    }

    /// Check if we should check more addresses
    pub fn should_scan_more(&self) -> bool {
        !self.limit_reached()
    }
}
