use crate::foundation::error::{HullError, HullResult};

/// Bounds and spacing of the probed target bitrates, all in kbps.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Lowest rate ever probed.
    pub floor_kbps: u32,
    /// Highest rate ever probed, whatever the source rate.
    pub ceiling_kbps: u32,
    /// Every probed rate is a multiple of this (or of a multiple of it, see `max_points`).
    pub step_kbps: u32,
    /// Upper bound on the sequence length. When the plain step would produce `n` > `max_points`
    /// points the step is widened to `step_kbps * ceil(n / max_points)`.
    pub max_points: Option<usize>,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            floor_kbps: 150,
            ceiling_kbps: 20_000,
            step_kbps: 150,
            max_points: Some(20),
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> HullResult<()> {
        if self.step_kbps == 0 {
            return Err(HullError::validation("rate step must be non-zero"));
        }
        if self.floor_kbps == 0 {
            return Err(HullError::validation("rate floor must be non-zero"));
        }
        if self.ceiling_kbps < self.floor_kbps {
            return Err(HullError::validation(format!(
                "rate ceiling ({}) must be >= floor ({})",
                self.ceiling_kbps, self.floor_kbps
            )));
        }
        if self.max_points == Some(0) {
            return Err(HullError::validation(
                "max_points must be >= 1 when set",
            ));
        }
        Ok(())
    }

    /// Target rates for a source encoded at `source_kbps`, highest first.
    ///
    /// Rates are strictly below the source rate, at most the ceiling and at least the floor. A
    /// source at or below the floor yields an empty sequence.
    pub fn generate(&self, source_kbps: u32) -> HullResult<Vec<u32>> {
        self.validate()?;
        if source_kbps <= self.floor_kbps {
            return Ok(Vec::new());
        }

        let cap = (source_kbps - 1).min(self.ceiling_kbps);
        let mut step = self.step_kbps;
        if let Some(max_points) = self.max_points {
            let plain = span(self.floor_kbps, cap, step).len();
            if plain > max_points {
                // Every `factor`-th plain rate survives, so at most `max_points` and never none.
                let factor = plain.div_ceil(max_points);
                if let Some(wider) = u32::try_from(factor)
                    .ok()
                    .and_then(|f| f.checked_mul(self.step_kbps))
                {
                    step = wider;
                }
            }
        }

        let (top, bottom) = span(self.floor_kbps, cap, step).bounds();
        let mut out = Vec::new();
        let mut rate = top;
        while rate >= bottom && rate > 0 {
            out.push(rate);
            match rate.checked_sub(step) {
                Some(next) => rate = next,
                None => break,
            }
        }
        if let Some(max_points) = self.max_points {
            out.truncate(max_points);
        }
        Ok(out)
    }
}

/// Multiples of `step` inside `[floor, cap]`.
#[derive(Clone, Copy, Debug)]
struct Span {
    top: u32,
    bottom: u32,
    step: u32,
}

impl Span {
    fn len(self) -> usize {
        if self.top < self.bottom {
            0
        } else {
            ((self.top - self.bottom) / self.step) as usize + 1
        }
    }

    fn bounds(self) -> (u32, u32) {
        if self.len() == 0 {
            (0, 1)
        } else {
            (self.top, self.bottom)
        }
    }
}

fn span(floor: u32, cap: u32, step: u32) -> Span {
    let top = cap / step * step;
    let bottom = floor.div_ceil(step).saturating_mul(step);
    Span { top, bottom, step }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(floor: u32, ceiling: u32, step: u32, max_points: Option<usize>) -> RateConfig {
        RateConfig {
            floor_kbps: floor,
            ceiling_kbps: ceiling,
            step_kbps: step,
            max_points,
        }
    }

    fn assert_well_formed(rates: &[u32], c: &RateConfig, source: u32) {
        for pair in rates.windows(2) {
            assert!(pair[0] > pair[1], "not strictly decreasing: {rates:?}");
        }
        for &r in rates {
            assert!(r > 0);
            assert!(r >= c.floor_kbps, "{r} below floor in {rates:?}");
            assert!(r <= c.ceiling_kbps.min(source), "{r} above cap in {rates:?}");
            assert_eq!(r % c.step_kbps, 0);
        }
        if let Some(max) = c.max_points {
            assert!(rates.len() <= max);
        }
    }

    #[test]
    fn five_mbps_source_walks_half_megabit_steps() {
        let c = cfg(500, 50_000, 500, None);
        assert_eq!(
            c.generate(5000).unwrap(),
            vec![4500, 4000, 3500, 3000, 2500, 2000, 1500, 1000, 500]
        );
    }

    #[test]
    fn ceiling_caps_the_top_rate() {
        let c = cfg(500, 2000, 500, None);
        assert_eq!(c.generate(8000).unwrap(), vec![2000, 1500, 1000, 500]);
    }

    #[test]
    fn source_at_or_below_floor_yields_empty_sequence() {
        let c = cfg(500, 50_000, 500, None);
        assert!(c.generate(499).unwrap().is_empty());
        assert!(c.generate(500).unwrap().is_empty());
        assert!(c.generate(0).unwrap().is_empty());
        assert_eq!(c.generate(501).unwrap(), vec![500]);
    }

    #[test]
    fn floor_off_step_rounds_up_to_next_multiple() {
        let c = cfg(600, 50_000, 500, None);
        assert_eq!(c.generate(2600).unwrap(), vec![2500, 2000, 1500, 1000]);
    }

    #[test]
    fn max_points_widens_the_step() {
        let c = cfg(150, 20_000, 150, Some(20));
        let rates = c.generate(5000).unwrap();
        assert_well_formed(&rates, &c, 5000);
        assert_eq!(rates.first(), Some(&4800));
        assert_eq!(rates.last(), Some(&300));
        assert_eq!(rates.len(), 16);
    }

    #[test]
    fn max_points_widening_is_immediate_for_huge_ranges() {
        let c = cfg(1, u32::MAX, 1, Some(2));
        let started = std::time::Instant::now();
        let rates = c.generate(u32::MAX).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(rates, vec![4_294_967_294, 2_147_483_647]);
        assert_well_formed(&rates, &c, u32::MAX);

        let c = cfg(1, 200_000_000, 1, Some(3));
        let rates = c.generate(300_000_000).unwrap();
        assert_eq!(rates, vec![133_333_334, 66_666_667]);
        assert_well_formed(&rates, &c, 300_000_000);
    }

    #[test]
    fn sequences_are_well_formed_across_sources() {
        let configs = [
            RateConfig::default(),
            cfg(500, 50_000, 500, None),
            cfg(200, 6000, 100, Some(7)),
            cfg(1, 10, 1, None),
        ];
        for c in &configs {
            for source in [c.floor_kbps, c.floor_kbps + 1, 999, 4321, 12_000, 65_000] {
                let rates = c.generate(source).unwrap();
                assert_well_formed(&rates, c, source);
            }
        }
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(cfg(500, 5000, 0, None).generate(3000).is_err());
        assert!(cfg(0, 5000, 500, None).generate(3000).is_err());
        assert!(cfg(600, 500, 100, None).generate(3000).is_err());
        assert!(cfg(100, 500, 100, Some(0)).generate(3000).is_err());
    }
}
