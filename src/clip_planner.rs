/*!
 * Selection of clip segments inside a source video.
 *
 * Segments come either from detected scene boundaries or from random offsets.
 * The random source is passed in, so a seeded generator reproduces a plan.
 */

use std::time::Duration;

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::media::SceneChange;

/// One planned clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedClip {
    /// Offset into the source
    pub start: Duration,
    /// Clip length
    pub length: Duration,
}

/// Clip count and length bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipPlanner {
    count: usize,
    min_secs: u64,
    max_secs: u64,
}

impl ClipPlanner {
    /// Planner for `count` clips of `min_secs..=max_secs` seconds.
    ///
    /// Bounds are reordered if given backwards; a zero minimum becomes one second.
    pub fn new(count: usize, min_secs: u64, max_secs: u64) -> Self {
        let (low, high) = if min_secs <= max_secs {
            (min_secs, max_secs)
        } else {
            (max_secs, min_secs)
        };
        Self {
            count,
            min_secs: low.max(1),
            max_secs: high.max(1),
        }
    }

    /// Plan from scene boundaries (needs at least two entries).
    ///
    /// A scene within the bounds becomes a clip as-is; a longer scene yields one
    /// clip of random length at a random offset inside it; shorter scenes are
    /// skipped. Candidates are shuffled and cut to the clip count.
    pub fn plan_from_scenes<R: Rng + ?Sized>(&self, scenes: &[SceneChange], rng: &mut R) -> Vec<PlannedClip> {
        let min = self.min_secs as f64;
        let max = self.max_secs as f64;
        let mut candidates = Vec::new();

        for pair in scenes.windows(2) {
            let scene_start = pair[0].timestamp_seconds;
            let scene_length = pair[1].timestamp_seconds - scene_start;

            if scene_length >= min && scene_length <= max {
                candidates.push(PlannedClip {
                    start: Duration::from_secs_f64(scene_start.max(0.0)),
                    length: Duration::from_secs_f64(scene_length),
                });
            } else if scene_length > max {
                let length = rng.random_range(self.min_secs..=self.max_secs) as f64;
                let offset = rng.random::<f64>() * (scene_length - length);
                candidates.push(PlannedClip {
                    start: Duration::from_secs_f64((scene_start + offset).max(0.0)),
                    length: Duration::from_secs_f64(length),
                });
            }
        }

        candidates.shuffle(rng);
        candidates.truncate(self.count);
        debug!("Selected {} clips from {} scene boundaries", candidates.len(), scenes.len());
        candidates
    }

    /// Plan random clips in a source of `total` length.
    ///
    /// Nothing is planned when the source is not longer than the minimum length.
    pub fn plan_random<R: Rng + ?Sized>(&self, total: Duration, rng: &mut R) -> Vec<PlannedClip> {
        let total_secs = total.as_secs_f64();
        if total_secs <= self.min_secs as f64 {
            return Vec::new();
        }

        let clips: Vec<PlannedClip> = (0..self.count)
            .map(|_| {
                let length = (rng.random_range(self.min_secs..=self.max_secs) as f64).min(total_secs);
                let start = rng.random::<f64>() * (total_secs - length);
                PlannedClip {
                    start: Duration::from_secs_f64(start),
                    length: Duration::from_secs_f64(length),
                }
            })
            .collect();
        debug!("Selected {} random clips", clips.len());
        clips
    }
}
