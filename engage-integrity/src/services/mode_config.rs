use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use engage_shared::errors::AppResult;

use crate::config::RewardConfig;
use crate::models::{EngagementType, PlatformMode, PlatformModeConfig};
use crate::store::EngineStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Caps {
    pub per_post: i64,
    pub daily: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardWeights {
    pub like: i64,
    pub comment: i64,
    pub share: i64,
}

impl RewardWeights {
    pub fn for_type(&self, kind: EngagementType) -> i64 {
        match kind {
            EngagementType::Like => self.like,
            EngagementType::Comment => self.comment,
            EngagementType::Share => self.share,
        }
    }
}

/// One consistent reading of the active reward regime. A reward computation
/// takes exactly one snapshot and uses it throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    pub mode: PlatformMode,
    pub caps: Caps,
    pub weights: RewardWeights,
}

impl From<&PlatformModeConfig> for ModeSnapshot {
    fn from(row: &PlatformModeConfig) -> Self {
        Self {
            mode: row.mode,
            caps: Caps {
                per_post: row.per_post_cap,
                daily: row.daily_cap,
            },
            weights: RewardWeights {
                like: row.like_reward,
                comment: row.comment_reward,
                share: row.share_reward,
            },
        }
    }
}

impl ModeSnapshot {
    pub fn from_defaults(rewards: &RewardConfig, mode: PlatformMode) -> Self {
        let d = rewards.defaults_for(mode);
        Self {
            mode,
            caps: Caps {
                per_post: d.per_post_cap,
                daily: d.daily_cap,
            },
            weights: RewardWeights {
                like: d.like_reward,
                comment: d.comment_reward,
                share: d.share_reward,
            },
        }
    }
}

pub trait ModeConfigProvider: Send + Sync {
    fn snapshot(&self) -> AppResult<ModeSnapshot>;

    /// Drop any cached reading so the next snapshot goes to the source.
    fn invalidate(&self) {}

    fn current_mode(&self) -> AppResult<PlatformMode> {
        Ok(self.snapshot()?.mode)
    }

    fn current_caps(&self) -> AppResult<Caps> {
        Ok(self.snapshot()?.caps)
    }
}

/// Reads the active `platform_mode_config` row, cached for a fixed TTL.
pub struct StoreModeConfig {
    store: Arc<dyn EngineStore>,
    fallback: ModeSnapshot,
    ttl: Duration,
    cached: RwLock<Option<(Instant, ModeSnapshot)>>,
}

impl StoreModeConfig {
    pub fn new(store: Arc<dyn EngineStore>, rewards: &RewardConfig) -> Self {
        Self {
            store,
            fallback: ModeSnapshot::from_defaults(rewards, rewards.default_mode),
            ttl: Duration::from_secs(rewards.mode_cache_ttl_secs),
            cached: RwLock::new(None),
        }
    }

    fn fresh(&self) -> Option<ModeSnapshot> {
        let guard = self.cached.read().ok()?;
        match *guard {
            Some((loaded_at, snapshot)) if loaded_at.elapsed() < self.ttl => Some(snapshot),
            _ => None,
        }
    }
}

impl ModeConfigProvider for StoreModeConfig {
    fn snapshot(&self) -> AppResult<ModeSnapshot> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let snapshot = match self.store.active_mode_config()? {
            Some(row) => ModeSnapshot::from(&row),
            None => {
                tracing::warn!(mode = %self.fallback.mode, "no active mode row; using configured default");
                self.fallback
            }
        };

        if let Ok(mut guard) = self.cached.write() {
            *guard = Some((Instant::now(), snapshot));
        }
        Ok(snapshot)
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.write() {
            *guard = None;
        }
    }
}

/// A provider pinned to one snapshot.
pub struct FixedModeConfig(pub ModeSnapshot);

impl ModeConfigProvider for FixedModeConfig {
    fn snapshot(&self) -> AppResult<ModeSnapshot> {
        Ok(self.0)
    }
}
