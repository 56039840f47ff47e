//! Seams to subsystems owned by the host application.

use std::collections::HashMap;

use crate::models::User;

/// Basis points for a 1.0x multiplier.
pub const BPS_ONE: u32 = 10_000;

pub trait VerificationGate: Send + Sync {
    fn is_fully_verified(&self, user: &User) -> bool;
}

/// Requires both email and phone verification.
pub struct EmailAndPhoneVerified;

impl VerificationGate for EmailAndPhoneVerified {
    fn is_fully_verified(&self, user: &User) -> bool {
        user.email_verified && user.phone_verified
    }
}

pub trait MembershipDirectory: Send + Sync {
    /// Reward multiplier for the payee in basis points.
    fn multiplier_bps(&self, user: &User) -> u32;
}

/// Looks the payee's tier up in a fixed table; unknown tiers earn 1.0x.
pub struct TierTable {
    tiers: HashMap<String, u32>,
}

impl TierTable {
    pub fn new(tiers: HashMap<String, u32>) -> Self {
        let tiers = tiers
            .into_iter()
            .map(|(tier, bps)| (tier.to_lowercase(), bps))
            .collect();
        Self { tiers }
    }
}

impl MembershipDirectory for TierTable {
    fn multiplier_bps(&self, user: &User) -> u32 {
        self.tiers
            .get(&user.membership_tier.to_lowercase())
            .copied()
            .unwrap_or(BPS_ONE)
    }
}
