//! Heuristics for reward-farming patterns over a window of recent engagements.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::models::{Engagement, EngagementType, Post};

/// A post that crossed at least one detector threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspicion {
    pub post_id: Uuid,
    pub owner_id: Uuid,
    pub reasons: Vec<String>,
}

impl Suspicion {
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Run every detector and merge hits per post. Engagements on posts missing
/// from `posts`, and self-engagements, are ignored.
pub fn detect(
    engagements: &[Engagement],
    posts: &HashMap<Uuid, Post>,
    now: DateTime<Utc>,
    cfg: &DetectionConfig,
) -> Vec<Suspicion> {
    let relevant: Vec<&Engagement> = engagements
        .iter()
        .filter(|e| posts.get(&e.post_id).is_some_and(|p| p.author_id != e.actor_id))
        .collect();

    let mut hits: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
    for (post_id, reason) in velocity(&relevant, now, cfg)
        .into_iter()
        .chain(like_comment_ratio(&relevant, cfg))
        .chain(repeated_actors(&relevant, posts, cfg))
    {
        hits.entry(post_id).or_default().push(reason);
    }

    hits.into_iter()
        .filter_map(|(post_id, reasons)| {
            posts.get(&post_id).map(|post| Suspicion {
                post_id,
                owner_id: post.author_id,
                reasons,
            })
        })
        .collect()
}

fn velocity(engagements: &[&Engagement], now: DateTime<Utc>, cfg: &DetectionConfig) -> Vec<(Uuid, String)> {
    let since = now - Duration::minutes(cfg.velocity_window_minutes);
    let mut counts: BTreeMap<Uuid, usize> = BTreeMap::new();
    for e in engagements.iter().filter(|e| e.created_at >= since) {
        *counts.entry(e.post_id).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= cfg.velocity_threshold)
        .map(|(post_id, n)| {
            (post_id, format!("engagement velocity: {n} in {}m", cfg.velocity_window_minutes))
        })
        .collect()
}

fn like_comment_ratio(engagements: &[&Engagement], cfg: &DetectionConfig) -> Vec<(Uuid, String)> {
    let mut counts: BTreeMap<Uuid, (usize, usize)> = BTreeMap::new();
    for e in engagements {
        let entry = counts.entry(e.post_id).or_default();
        match e.engagement_type {
            EngagementType::Like => entry.0 += 1,
            EngagementType::Comment => entry.1 += 1,
            EngagementType::Share => {}
        }
    }
    counts
        .into_iter()
        .filter(|(_, (likes, comments))| {
            *likes >= cfg.ratio_min_likes && *likes >= cfg.like_comment_ratio * (*comments).max(1)
        })
        .map(|(post_id, (likes, comments))| {
            (post_id, format!("like/comment ratio: {likes} likes to {comments} comments"))
        })
        .collect()
}

/// Actors that keep showing up together across one creator's posts.
fn repeated_actors(
    engagements: &[&Engagement],
    posts: &HashMap<Uuid, Post>,
    cfg: &DetectionConfig,
) -> Vec<(Uuid, String)> {
    // creator -> actor -> posts of that creator the actor touched
    let mut by_creator: HashMap<Uuid, HashMap<Uuid, BTreeSet<Uuid>>> = HashMap::new();
    for e in engagements {
        let Some(post) = posts.get(&e.post_id) else { continue };
        by_creator
            .entry(post.author_id)
            .or_default()
            .entry(e.actor_id)
            .or_default()
            .insert(e.post_id);
    }

    let mut out = Vec::new();
    for actors in by_creator.values() {
        let ring: Vec<&BTreeSet<Uuid>> = actors
            .values()
            .filter(|touched| touched.len() >= cfg.repeat_post_min)
            .collect();
        if ring.len() < cfg.repeat_actor_min {
            continue;
        }
        let touched: BTreeSet<Uuid> = ring.iter().flat_map(|set| set.iter().copied()).collect();
        for post_id in &touched {
            out.push((
                *post_id,
                format!("repeated actor set: {} actors across {} posts", ring.len(), touched.len()),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::post_by;

    fn engagement(post_id: Uuid, actor_id: Uuid, kind: EngagementType, at: DateTime<Utc>) -> Engagement {
        Engagement {
            id: Uuid::new_v4(),
            post_id,
            actor_id,
            engagement_type: kind,
            created_at: at,
        }
    }

    fn index(posts: &[Post]) -> HashMap<Uuid, Post> {
        posts.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn burst_of_engagements_trips_velocity() {
        let now = Utc::now();
        let post = post_by(Uuid::new_v4());
        let cfg = DetectionConfig {
            velocity_threshold: 5,
            ..DetectionConfig::default()
        };
        let burst: Vec<_> = (0..5)
            .map(|_| engagement(post.id, Uuid::new_v4(), EngagementType::Share, now))
            .collect();

        let hits = detect(&burst, &index(&[post.clone()]), now, &cfg);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].reason().starts_with("engagement velocity: 5"));

        // The same burst two hours ago is outside the velocity window.
        let old: Vec<_> = burst
            .iter()
            .map(|e| engagement(e.post_id, e.actor_id, e.engagement_type, now - Duration::hours(2)))
            .collect();
        assert!(detect(&old, &index(&[post]), now, &cfg).is_empty());
    }

    #[test]
    fn likes_without_comments_trip_ratio() {
        let now = Utc::now();
        let post = post_by(Uuid::new_v4());
        let mut events: Vec<_> = (0..30)
            .map(|_| engagement(post.id, Uuid::new_v4(), EngagementType::Like, now - Duration::hours(3)))
            .collect();
        let cfg = DetectionConfig::default();

        let hits = detect(&events, &index(&[post.clone()]), now, &cfg);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].reason().contains("30 likes to 0 comments"));

        // 30 likes against 3 comments is under the 15:1 ratio.
        for _ in 0..3 {
            events.push(engagement(post.id, Uuid::new_v4(), EngagementType::Comment, now));
        }
        assert!(detect(&events, &index(&[post]), now, &cfg).is_empty());
    }

    #[test]
    fn ring_of_actors_flags_every_touched_post() {
        let now = Utc::now();
        let creator = Uuid::new_v4();
        let posts: Vec<Post> = (0..4).map(|_| post_by(creator)).collect();
        let ring: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let events: Vec<_> = ring
            .iter()
            .flat_map(|actor| posts.iter().map(move |p| engagement(p.id, *actor, EngagementType::Like, now)))
            .collect();

        let hits = detect(&events, &index(&posts), now, &DetectionConfig::default());
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| h.owner_id == creator));
        assert!(hits[0].reason().contains("3 actors across 4 posts"));
    }

    #[test]
    fn self_engagement_is_ignored() {
        let now = Utc::now();
        let author = Uuid::new_v4();
        let post = post_by(author);
        let cfg = DetectionConfig {
            velocity_threshold: 1,
            ..DetectionConfig::default()
        };
        let events = vec![engagement(post.id, author, EngagementType::Like, now)];
        assert!(detect(&events, &index(&[post]), now, &cfg).is_empty());
    }
}
