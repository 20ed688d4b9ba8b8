//! Cartesian expansion of video blocks.
//!
//! Combinations are enumerated lazily in odometer order: the last block
//! advances fastest, so index `i` is the `i`-th element of the
//! lexicographic product of the blocks in render order.

use std::path::{Path, PathBuf};

use rand::Rng;
use vmix_models::{combination_count, RequestError, RequestResult};

/// One clip per block, in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    pub index: usize,
    pub videos: Vec<PathBuf>,
}

/// Lazy iterator over every combination of `blocks`.
///
/// Only the current digit vector is held between items.
#[derive(Debug, Clone)]
pub struct CombinationIter<'a> {
    blocks: &'a [(String, Vec<PathBuf>)],
    digits: Option<Vec<usize>>,
    index: usize,
    total: usize,
}

impl<'a> CombinationIter<'a> {
    pub fn new(blocks: &'a [(String, Vec<PathBuf>)]) -> Self {
        let total = combination_count(blocks.iter().map(|(_, clips)| clips.len()))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX);
        let digits = (total > 0).then(|| vec![0; blocks.len()]);

        Self {
            blocks,
            digits,
            index: 0,
            total,
        }
    }

    /// Number of combinations the iterator yields in total.
    pub fn total(&self) -> usize {
        self.total
    }

    fn advance(&mut self) {
        let Some(digits) = self.digits.as_mut() else {
            return;
        };

        for pos in (0..digits.len()).rev() {
            digits[pos] += 1;
            if digits[pos] < self.blocks[pos].1.len() {
                return;
            }
            digits[pos] = 0;
        }
        // every digit wrapped
        self.digits = None;
    }
}

impl Iterator for CombinationIter<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let digits = self.digits.as_ref()?;
        let videos = digits
            .iter()
            .zip(self.blocks)
            .map(|(&d, (_, clips))| clips[d].clone())
            .collect();

        let combination = Combination {
            index: self.index,
            videos,
        };
        self.index += 1;
        self.advance();
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.digits.is_none() {
            return (0, Some(0));
        }
        let remaining = self.total.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

/// Plans combinations under an optional upper bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombinationPlanner {
    limit: Option<u64>,
}

impl CombinationPlanner {
    /// Planner with no bound.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max: u64) -> Self {
        Self { limit: Some(max) }
    }

    /// Count, check the bound, then hand back the lazy iterator.
    ///
    /// Nothing is yielded when the bound is exceeded.
    pub fn plan<'a>(&self, blocks: &'a [(String, Vec<PathBuf>)]) -> RequestResult<CombinationIter<'a>> {
        if let Some(max) = self.limit {
            let total = combination_count(blocks.iter().map(|(_, clips)| clips.len()));
            match total {
                Some(total) if total <= max => {}
                Some(total) => return Err(RequestError::CombinationLimitExceeded { total, max }),
                None => {
                    return Err(RequestError::CombinationLimitExceeded {
                        total: u64::MAX,
                        max,
                    })
                }
            }
        }

        Ok(CombinationIter::new(blocks))
    }
}

/// Pick one background track and one voiceover, independently and uniformly.
pub fn pick_tracks<R: Rng + ?Sized>(
    rng: &mut R,
    audio: &[PathBuf],
    voiceovers: &[PathBuf],
) -> Option<(PathBuf, PathBuf)> {
    let music = pick(rng, audio)?;
    let voice = pick(rng, voiceovers)?;
    Some((music.to_path_buf(), voice.to_path_buf()))
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &'a [PathBuf]) -> Option<&'a Path> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.random_range(0..items.len())].as_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blocks(spec: &[(&str, &[&str])]) -> Vec<(String, Vec<PathBuf>)> {
        spec.iter()
            .map(|(name, clips)| (name.to_string(), clips.iter().map(PathBuf::from).collect()))
            .collect()
    }

    #[test]
    fn test_two_blocks_yield_two_combinations() {
        let blocks = blocks(&[("block_1", &["a", "b"]), ("block_2", &["c"])]);
        let combos: Vec<_> = CombinationPlanner::new().plan(&blocks).unwrap().collect();

        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].index, 0);
        assert_eq!(combos[0].videos, vec![PathBuf::from("a"), PathBuf::from("c")]);
        assert_eq!(combos[1].index, 1);
        assert_eq!(combos[1].videos, vec![PathBuf::from("b"), PathBuf::from("c")]);
    }

    #[test]
    fn test_last_block_varies_fastest() {
        let blocks = blocks(&[("block_1", &["a", "b"]), ("block_2", &["x", "y", "z"])]);
        let seq: Vec<String> = CombinationIter::new(&blocks)
            .map(|c| {
                c.videos
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .collect();

        assert_eq!(seq, ["ax", "ay", "az", "bx", "by", "bz"]);
    }

    #[test]
    fn test_size_hint_tracks_remaining() {
        let blocks = blocks(&[("b1", &["a", "b"]), ("b2", &["c", "d"]), ("b3", &["e"])]);
        let mut iter = CombinationIter::new(&blocks);
        assert_eq!(iter.total(), 4);
        assert_eq!(iter.size_hint(), (4, Some(4)));
        iter.next();
        assert_eq!(iter.size_hint(), (3, Some(3)));
        assert_eq!(iter.count(), 3);
    }

    #[test]
    fn test_empty_block_yields_nothing() {
        let blocks = blocks(&[("b1", &["a"]), ("b2", &[])]);
        assert_eq!(CombinationIter::new(&blocks).count(), 0);
        assert_eq!(CombinationIter::new(&[]).count(), 0);
    }

    #[test]
    fn test_limit_rejects_before_yielding() {
        let clips: Vec<PathBuf> = (0..50).map(|i| PathBuf::from(format!("{i}.mp4"))).collect();
        let result = vec![
            ("b1".to_string(), clips.clone()),
            ("b2".to_string(), clips[..10].to_vec()),
            ("b3".to_string(), clips[..10].to_vec()),
        ];

        let err = CombinationPlanner::with_limit(4000).plan(&result).unwrap_err();
        assert!(matches!(
            err,
            RequestError::CombinationLimitExceeded { total: 5000, max: 4000 }
        ));
        assert_eq!(CombinationPlanner::with_limit(5000).plan(&result).unwrap().total(), 5000);
    }

    #[test]
    fn test_pick_tracks() {
        let mut rng = StdRng::seed_from_u64(7);
        let audio = vec![PathBuf::from("m1.mp3"), PathBuf::from("m2.mp3")];
        let voices = vec![PathBuf::from("v.mp3")];

        for _ in 0..20 {
            let (music, voice) = pick_tracks(&mut rng, &audio, &voices).unwrap();
            assert!(audio.contains(&music));
            assert_eq!(voice, PathBuf::from("v.mp3"));
        }
        assert!(pick_tracks(&mut rng, &[], &voices).is_none());
    }
}
