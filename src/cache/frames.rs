use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::foundation::core::FrameRgba;
use crate::foundation::error::{CountickError, CountickResult};

/// Read-only snapshot of how well the caches cover a requested duration.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheAnalysis {
    /// Frames required for the duration (`duration + 1`).
    pub total_required: u32,
    /// How many of those are present in the second-indexed tier.
    pub cached_count: u32,
    /// `cached_count / total_required` in `[0, 1]`.
    pub hit_rate: f64,
    /// `total_required - cached_count`.
    pub need_generation: u32,
    /// Absent remaining-seconds values, ascending.
    pub missing: Vec<u32>,
    /// Smallest cached clip duration strictly greater than the request, if any.
    pub donor: Option<u32>,
}

/// Frame counts per cache tier, for memory-accounting callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheSizeInfo {
    /// Entries in the second-indexed tier.
    pub second_frames: usize,
    /// Entries in the duration-indexed tier.
    pub clips: usize,
    /// Total frames held by duration-indexed entries (shared frames counted once per slot).
    pub clip_frames: usize,
    /// Approximate resident pixel bytes across both tiers.
    pub approx_bytes: u64,
}

/// Two-tier in-memory cache over rendered countdown frames.
///
/// The second-indexed tier maps a remaining-seconds value to its frame and lets a shorter
/// request reuse frames rendered for a longer one. The duration-indexed tier maps a total
/// requested duration to its complete countdown sequence and serves exact repeats without
/// touching individual frames. Entries live until an explicit clear; there is no automatic
/// expiry.
#[derive(Default)]
pub struct FrameCache {
    seconds: HashMap<u32, Arc<FrameRgba>>,
    clips: BTreeMap<u32, Vec<Arc<FrameRgba>>>,
}

impl FrameCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze coverage for `duration` without mutating any state. O(duration).
    ///
    /// The donor is the smallest cached clip whose duration strictly exceeds `duration`; its
    /// tail can be re-sliced via [`FrameCache::extract_subset`].
    pub fn analyze(&self, duration: u32) -> CacheAnalysis {
        let total_required = duration + 1;
        let mut missing = Vec::new();
        for s in 0..=duration {
            if !self.seconds.contains_key(&s) {
                missing.push(s);
            }
        }
        let cached_count = total_required - missing.len() as u32;
        let donor = self
            .clips
            .range((std::ops::Bound::Excluded(duration), std::ops::Bound::Unbounded))
            .next()
            .map(|(&d, _)| d);
        CacheAnalysis {
            total_required,
            cached_count,
            hit_rate: f64::from(cached_count) / f64::from(total_required),
            need_generation: total_required - cached_count,
            missing,
            donor,
        }
    }

    /// Assemble the countdown sequence for `duration` from the second-indexed tier.
    ///
    /// Element `i` of the result holds the frame for remaining value `duration - i`, so the
    /// sequence plays `duration, duration - 1, .., 0` and has length `duration + 1`. Fails with
    /// [`CountickError::MissingFrames`] listing every absent value when the tier has gaps;
    /// callers are expected to consult [`FrameCache::analyze`] first.
    pub fn assemble(&self, duration: u32) -> CountickResult<Vec<Arc<FrameRgba>>> {
        let mut missing = Vec::new();
        for s in 0..=duration {
            if !self.seconds.contains_key(&s) {
                missing.push(s);
            }
        }
        if !missing.is_empty() {
            return Err(CountickError::MissingFrames { missing });
        }

        let mut out = Vec::with_capacity(duration as usize + 1);
        for i in 0..=duration {
            let s = duration - i;
            // Presence was checked above; a gap here is unreachable.
            let frame = self
                .seconds
                .get(&s)
                .ok_or_else(|| CountickError::MissingFrames { missing: vec![s] })?;
            out.push(frame.clone());
        }
        Ok(out)
    }

    /// Re-slice a longer cached clip to serve a shorter request.
    ///
    /// The stride is `donor_frames.len() / donor_duration` (integer); output position `s`
    /// (`0..=target`) takes the donor frame at `len - (target - s + 1) * stride`, drawing the
    /// target sequence from the donor's tail. The result is always exactly `target + 1` frames
    /// or the call fails with [`CountickError::Extraction`] — never a silently short or long
    /// sequence. A zero donor duration is guarded explicitly rather than dividing by zero.
    pub fn extract_subset(
        donor_duration: u32,
        donor_frames: &[Arc<FrameRgba>],
        target: u32,
    ) -> CountickResult<Vec<Arc<FrameRgba>>> {
        if donor_duration == 0 {
            return Err(CountickError::extraction(
                "donor duration must be > 0 (stride would be degenerate)",
            ));
        }
        if donor_duration <= target {
            return Err(CountickError::extraction(format!(
                "donor duration {donor_duration} must exceed target duration {target}"
            )));
        }
        let len = donor_frames.len();
        let stride = len / donor_duration as usize;
        if stride == 0 {
            return Err(CountickError::extraction(format!(
                "donor sequence of {len} frames is shorter than its duration {donor_duration}"
            )));
        }

        let mut out = Vec::with_capacity(target as usize + 1);
        for s in 0..=target {
            let back = (target - s + 1) as usize * stride;
            let idx = len.checked_sub(back).ok_or_else(|| {
                CountickError::extraction(format!(
                    "computed donor index out of range at position {s} (len {len}, offset {back})"
                ))
            })?;
            out.push(donor_frames[idx].clone());
        }

        if out.len() != target as usize + 1 {
            return Err(CountickError::extraction(format!(
                "extracted {} frames, expected {}",
                out.len(),
                target + 1
            )));
        }
        Ok(out)
    }

    /// Store one frame under its remaining-seconds value. Overwrites idempotently.
    pub fn put_frame(&mut self, seconds: u32, frame: Arc<FrameRgba>) {
        self.seconds.insert(seconds, frame);
    }

    /// Look up the frame for a remaining-seconds value.
    pub fn frame(&self, seconds: u32) -> Option<Arc<FrameRgba>> {
        self.seconds.get(&seconds).cloned()
    }

    /// Store a complete countdown sequence under its total duration.
    ///
    /// Rejects sequences whose length is not `duration + 1`.
    pub fn put_clip(
        &mut self,
        duration: u32,
        frames: Vec<Arc<FrameRgba>>,
    ) -> CountickResult<()> {
        if frames.len() != duration as usize + 1 {
            return Err(CountickError::invalid_duration(format!(
                "clip for duration {duration} must hold {} frames, got {}",
                duration + 1,
                frames.len()
            )));
        }
        self.clips.insert(duration, frames);
        Ok(())
    }

    /// Look up the complete sequence for an exact duration.
    pub fn clip(&self, duration: u32) -> Option<&[Arc<FrameRgba>]> {
        self.clips.get(&duration).map(Vec::as_slice)
    }

    /// Drop every second-indexed entry.
    pub fn clear_frames(&mut self) {
        self.seconds.clear();
    }

    /// Drop every duration-indexed entry.
    pub fn clear_clips(&mut self) {
        self.clips.clear();
    }

    /// Drop both tiers.
    pub fn clear(&mut self) {
        self.clear_frames();
        self.clear_clips();
    }

    /// Frame counts and approximate resident bytes per tier.
    pub fn size_info(&self) -> CacheSizeInfo {
        let mut approx_bytes = 0u64;
        for f in self.seconds.values() {
            approx_bytes = approx_bytes.saturating_add(f.byte_len() as u64);
        }
        let mut clip_frames = 0usize;
        for frames in self.clips.values() {
            clip_frames += frames.len();
            for f in frames {
                approx_bytes = approx_bytes.saturating_add(f.byte_len() as u64);
            }
        }
        CacheSizeInfo {
            second_frames: self.seconds.len(),
            clips: self.clips.len(),
            clip_frames,
            approx_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked_frame(mark: u32) -> Arc<FrameRgba> {
        let mut f = FrameRgba::transparent(2, 2);
        f.data[0] = (mark % 251) as u8;
        f.data[1] = (mark / 251) as u8;
        Arc::new(f)
    }

    fn mark_of(f: &FrameRgba) -> u32 {
        u32::from(f.data[0]) + u32::from(f.data[1]) * 251
    }

    #[test]
    fn analyze_reports_counts_and_hit_rate() {
        let mut cache = FrameCache::new();
        for s in [0u32, 1, 3] {
            cache.put_frame(s, marked_frame(s));
        }

        let a = cache.analyze(4);
        assert_eq!(a.total_required, 5);
        assert_eq!(a.cached_count, 3);
        assert_eq!(a.need_generation, 2);
        assert_eq!(a.missing, vec![2, 4]);
        assert!((a.hit_rate - 0.6).abs() < 1e-9);
        assert_eq!(a.donor, None);
    }

    #[test]
    fn analyze_full_hit_iff_every_key_present() {
        let mut cache = FrameCache::new();
        for s in 0..=5 {
            cache.put_frame(s, marked_frame(s));
        }
        assert_eq!(cache.analyze(5).hit_rate, 1.0);
        assert_eq!(cache.analyze(5).need_generation, 0);
        assert!(cache.analyze(6).hit_rate < 1.0);
    }

    #[test]
    fn analyze_finds_smallest_donor_above_request() {
        let mut cache = FrameCache::new();
        let clip = |d: u32| (0..=d).map(|i| marked_frame(d - i)).collect::<Vec<_>>();
        cache.put_clip(14, clip(14)).unwrap();
        cache.put_clip(30, clip(30)).unwrap();

        assert_eq!(cache.analyze(10).donor, Some(14));
        assert_eq!(cache.analyze(14).donor, Some(30));
        assert_eq!(cache.analyze(30).donor, None);
    }

    #[test]
    fn assemble_is_countdown_ordered_and_exact_length() {
        let mut cache = FrameCache::new();
        for s in 0..=7 {
            cache.put_frame(s, marked_frame(s));
        }

        let seq = cache.assemble(7).unwrap();
        assert_eq!(seq.len(), 8);
        for (i, f) in seq.iter().enumerate() {
            assert_eq!(mark_of(f), 7 - i as u32);
        }
    }

    #[test]
    fn assemble_lists_every_missing_index() {
        let mut cache = FrameCache::new();
        for s in [0u32, 1, 4] {
            cache.put_frame(s, marked_frame(s));
        }

        match cache.assemble(5) {
            Err(CountickError::MissingFrames { missing }) => {
                assert_eq!(missing, vec![2, 3, 5]);
            }
            other => panic!("expected MissingFrames, got {other:?}"),
        }
    }

    #[test]
    fn extract_subset_takes_the_donor_tail() {
        // Donor: duration 14, 15 frames in countdown order (position j holds remaining 14 - j).
        let donor: Vec<_> = (0..=14u32).map(|j| marked_frame(14 - j)).collect();

        let out = FrameCache::extract_subset(14, &donor, 10).unwrap();
        assert_eq!(out.len(), 11);
        // Stride floor(15/14) = 1: positions 4..=14, i.e. remaining 10 down to 0.
        for (i, f) in out.iter().enumerate() {
            assert_eq!(mark_of(f), 10 - i as u32);
        }
    }

    #[test]
    fn extract_subset_rejects_zero_donor_duration() {
        let donor = vec![marked_frame(0)];
        assert!(matches!(
            FrameCache::extract_subset(0, &donor, 0),
            Err(CountickError::Extraction(_))
        ));
    }

    #[test]
    fn extract_subset_rejects_donor_not_longer_than_target() {
        let donor: Vec<_> = (0..=5u32).map(marked_frame).collect();
        assert!(matches!(
            FrameCache::extract_subset(5, &donor, 5),
            Err(CountickError::Extraction(_))
        ));
    }

    #[test]
    fn extract_subset_rejects_underfilled_donor_sequences() {
        // 3 frames claiming duration 10: stride floors to zero.
        let donor: Vec<_> = (0..3u32).map(marked_frame).collect();
        assert!(matches!(
            FrameCache::extract_subset(10, &donor, 2),
            Err(CountickError::Extraction(_))
        ));
    }

    #[test]
    fn put_clip_enforces_length_invariant() {
        let mut cache = FrameCache::new();
        let short: Vec<_> = (0..5u32).map(marked_frame).collect();
        assert!(matches!(
            cache.put_clip(5, short),
            Err(CountickError::InvalidDuration(_))
        ));
    }

    #[test]
    fn clear_variants_are_independent() {
        let mut cache = FrameCache::new();
        cache.put_frame(0, marked_frame(0));
        cache
            .put_clip(1, vec![marked_frame(1), marked_frame(0)])
            .unwrap();

        cache.clear_frames();
        assert_eq!(cache.size_info().second_frames, 0);
        assert_eq!(cache.size_info().clips, 1);

        cache.clear_clips();
        assert_eq!(cache.size_info().clips, 0);
    }

    #[test]
    fn size_info_accounts_bytes_across_tiers() {
        let mut cache = FrameCache::new();
        cache.put_frame(0, marked_frame(0));
        cache
            .put_clip(1, vec![marked_frame(1), marked_frame(0)])
            .unwrap();

        let info = cache.size_info();
        assert_eq!(info.second_frames, 1);
        assert_eq!(info.clips, 1);
        assert_eq!(info.clip_frames, 2);
        // 2x2 RGBA frames: 16 bytes each, three slots.
        assert_eq!(info.approx_bytes, 48);
    }
}
