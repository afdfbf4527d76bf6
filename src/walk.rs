use crate::{
    backend::QualityBackend,
    cancel::CancelToken,
    config::WalkConfig,
    foundation::{
        core::{Resolution, SourceAsset},
        error::{HullError, HullResult},
    },
    hull::ConvexHull,
    resolve::RatePointResolver,
};

/// A walk that stopped early.
///
/// `partial` holds every point resolved before the failing rate, in order; it is authoritative
/// and callers may persist or inspect it.
#[derive(thiserror::Error, Debug)]
#[error(
    "hull walk failed {} after {} point(s): {source}",
    describe_rate(*.rate_kbps),
    .partial.len()
)]
pub struct WalkFailure {
    pub partial: ConvexHull,
    /// Rate whose resolve failed; `None` when the walk failed before probing any rate.
    pub rate_kbps: Option<u32>,
    pub source: HullError,
}

impl WalkFailure {
    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    pub fn into_parts(self) -> (ConvexHull, HullError) {
        (self.partial, self.source)
    }
}

fn describe_rate(rate_kbps: Option<u32>) -> String {
    match rate_kbps {
        Some(r) => format!("at {r} kbps"),
        None => "before probing".to_string(),
    }
}

/// Drives the rate-point resolver down the target rate sequence of one asset.
///
/// Rates are strictly sequential: each step starts from the previous step's winner, so the hull
/// resolution never moves up. A walker holds no per-walk state and can serve many assets from
/// many threads at once.
pub struct HullWalker<B> {
    config: WalkConfig,
    backend: B,
}

impl<B: QualityBackend> HullWalker<B> {
    pub fn new(config: WalkConfig, backend: B) -> HullResult<Self> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Walk `source` using its probed resolution as reference and its probed bitrate as the
    /// rate ceiling.
    pub fn walk(&self, source: &SourceAsset, cancel: &CancelToken) -> Result<ConvexHull, WalkFailure> {
        self.walk_from(source, source.resolution, source.bitrate_kbps, cancel)
    }

    #[tracing::instrument(
        skip(self, source, reference_resolution, cancel),
        fields(source = %source.path.display(), reference = %reference_resolution)
    )]
    pub fn walk_from(
        &self,
        source: &SourceAsset,
        reference_resolution: Resolution,
        source_rate_kbps: u32,
        cancel: &CancelToken,
    ) -> Result<ConvexHull, WalkFailure> {
        let early = |e: HullError| WalkFailure {
            partial: ConvexHull::new(),
            rate_kbps: None,
            source: e,
        };
        reference_resolution.validate().map_err(early)?;
        let rates = self.config.rates.generate(source_rate_kbps).map_err(early)?;
        tracing::debug!(?rates, "generated target rates");

        let scratch_root = self.config.scratch_root();
        let resolver = RatePointResolver::new(&self.config.ladder, &self.backend, &scratch_root);

        let mut hull = ConvexHull::new();
        let mut current = reference_resolution;
        for rate in rates {
            let step = resolver
                .resolve(source, reference_resolution, rate, current, cancel)
                .and_then(|point| hull.push(point).map(|()| point));
            match step {
                Ok(point) => {
                    tracing::info!(
                        rate_kbps = rate,
                        resolution = %point.resolution,
                        quality = ?point.quality.score(),
                        "hull point"
                    );
                    current = point.resolution;
                }
                Err(e) => {
                    tracing::warn!(rate_kbps = rate, points = hull.len(), error = %e, "hull walk stopped");
                    return Err(WalkFailure {
                        partial: hull,
                        rate_kbps: Some(rate),
                        source: e,
                    });
                }
            }
        }
        Ok(hull)
    }
}
