use std::{path::PathBuf, sync::Mutex};

use ratehull::{
    CancelToken, EncodeJob, EncodedArtifact, HullError, HullResult, HullWalker, QualityBackend,
    Quality, RateConfig, Resolution, ResolutionLadder, ScoreJob, SourceAsset, WalkConfig,
};

const P1080: Resolution = Resolution::new(1080, 1920);
const P720: Resolution = Resolution::new(720, 1280);
const P480: Resolution = Resolution::new(480, 854);
const P360: Resolution = Resolution::new(360, 640);

type ScoreFn = Box<dyn Fn(Resolution, u32) -> f64 + Send + Sync>;

struct ScriptedBackend {
    score: ScoreFn,
    fail_encode_at_rate: Option<u32>,
    fail_score_at_rate: Option<u32>,
    /// `(reference path, reference resolution, scored resolution)` per score call.
    scored: Mutex<Vec<(PathBuf, Resolution, Resolution)>>,
}

impl ScriptedBackend {
    fn new(score: impl Fn(Resolution, u32) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            score: Box::new(score),
            fail_encode_at_rate: None,
            fail_score_at_rate: None,
            scored: Mutex::new(Vec::new()),
        }
    }
}

impl QualityBackend for ScriptedBackend {
    fn encode(&self, job: &EncodeJob<'_>, _cancel: &CancelToken) -> HullResult<EncodedArtifact> {
        std::fs::write(&job.out_path, b"stub encode").map_err(anyhow::Error::from)?;
        if self.fail_encode_at_rate == Some(job.rate_kbps) {
            return Err(HullError::encode(job.resolution, job.rate_kbps, "stub encoder failed"));
        }
        Ok(EncodedArtifact {
            path: job.out_path.clone(),
            resolution: job.resolution,
            rate_kbps: job.rate_kbps,
        })
    }

    fn score(&self, job: &ScoreJob<'_>, _cancel: &CancelToken) -> HullResult<f64> {
        std::fs::write(&job.log_path, b"{}").map_err(anyhow::Error::from)?;
        let a = job.artifact;
        self.scored.lock().unwrap().push((
            job.reference.path.clone(),
            job.reference_resolution,
            a.resolution,
        ));
        if self.fail_score_at_rate == Some(a.rate_kbps) {
            return Err(HullError::score(a.resolution, a.rate_kbps, "stub scorer failed"));
        }
        Ok((self.score)(a.resolution, a.rate_kbps))
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ratehull_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(scratch: &std::path::Path) -> WalkConfig {
    WalkConfig {
        ladder: ResolutionLadder::new(vec![P1080, P720, P480, P360]).unwrap(),
        rates: RateConfig {
            floor_kbps: 500,
            ceiling_kbps: 50_000,
            step_kbps: 500,
            max_points: None,
        },
        scratch_root: Some(scratch.to_path_buf()),
    }
}

fn source_1080p() -> SourceAsset {
    SourceAsset::new("videos/clip.mp4", P1080, 5000)
}

fn heights(points: &[ratehull::HullPoint]) -> Vec<u32> {
    points.iter().map(|p| p.resolution.height).collect()
}

fn assert_scratch_empty(dir: &std::path::Path) {
    let left: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
    assert!(left.is_empty(), "scratch leftovers: {left:?}");
}

#[test]
fn height_scorer_keeps_1080p_at_every_rate() {
    let scratch = temp_dir("walk_height");
    let backend = ScriptedBackend::new(|r, _| f64::from(r.height) / 12.0);
    let walker = HullWalker::new(config(&scratch), backend).unwrap();

    let hull = walker.walk(&source_1080p(), &CancelToken::new()).unwrap();
    assert_eq!(
        hull.rates().collect::<Vec<_>>(),
        vec![4500, 4000, 3500, 3000, 2500, 2000, 1500, 1000, 500]
    );
    assert!(hull.resolutions().all(|r| r == P1080));
    assert!(hull.points().iter().all(|p| p.quality == Quality::Measured(90.0)));
    assert_scratch_empty(&scratch);
}

#[test]
fn resolution_drops_to_720p_below_2000_kbps_and_stays_down() {
    let scratch = temp_dir("walk_drop");
    let backend = ScriptedBackend::new(|r, rate| match r.height {
        1080 => 80.0,
        720 if rate < 2000 => 90.0,
        720 => 70.0,
        480 => 60.0,
        _ => 50.0,
    });
    let walker = HullWalker::new(config(&scratch), backend).unwrap();

    let hull = walker.walk(&source_1080p(), &CancelToken::new()).unwrap();
    assert_eq!(
        heights(hull.points()),
        vec![1080, 1080, 1080, 1080, 1080, 1080, 720, 720, 720]
    );
    let first_720 = hull.points().iter().position(|p| p.resolution == P720).unwrap();
    assert_eq!(hull.points()[first_720].rate_kbps, 1500);
    assert_eq!(hull.points()[first_720].quality, Quality::Measured(90.0));

    // Every candidate, including those after the drop, is scored against the 1080p source.
    let scored = walker.backend().scored.lock().unwrap();
    assert_eq!(scored.len(), 2 * 9);
    assert!(scored.iter().any(|(_, _, candidate)| *candidate == P480));
    for (reference, reference_resolution, _) in scored.iter() {
        assert_eq!(reference, &PathBuf::from("videos/clip.mp4"));
        assert_eq!(*reference_resolution, P1080);
    }
}

#[test]
fn encode_failure_at_second_rate_returns_one_point_and_the_failure() {
    let scratch = temp_dir("walk_encode_fail");
    let mut backend = ScriptedBackend::new(|r, _| f64::from(r.height) / 12.0);
    backend.fail_encode_at_rate = Some(4000);
    let walker = HullWalker::new(config(&scratch), backend).unwrap();

    let failure = walker.walk(&source_1080p(), &CancelToken::new()).unwrap_err();
    assert_eq!(failure.partial.len(), 1);
    assert_eq!(failure.partial.points()[0].rate_kbps, 4500);
    assert_eq!(failure.rate_kbps, Some(4000));
    assert!(matches!(failure.source, HullError::Encode { rate_kbps: 4000, .. }));
    assert!(!failure.is_cancelled());
    assert_scratch_empty(&scratch);
}

#[test]
fn kth_failure_preserves_exactly_the_first_k_minus_one_points() {
    let rates = [4500, 4000, 3500, 3000, 2500, 2000, 1500, 1000, 500];
    for (k0, &rate) in rates.iter().enumerate() {
        let scratch = temp_dir("walk_kth");
        let mut backend = ScriptedBackend::new(|r, _| f64::from(r.height) / 12.0);
        if k0 % 2 == 0 {
            backend.fail_encode_at_rate = Some(rate);
        } else {
            backend.fail_score_at_rate = Some(rate);
        }
        let walker = HullWalker::new(config(&scratch), backend).unwrap();

        let failure = walker.walk(&source_1080p(), &CancelToken::new()).unwrap_err();
        assert_eq!(failure.partial.len(), k0, "failing rate {rate}");
        assert_eq!(
            failure.partial.rates().collect::<Vec<_>>(),
            rates[..k0].to_vec()
        );
        assert_eq!(failure.rate_kbps, Some(rate));
        assert_scratch_empty(&scratch);
    }
}

#[test]
fn resolution_never_moves_up_for_arbitrary_scores() {
    for seed in 0u64..16 {
        let scratch = temp_dir("walk_monotonic");
        let backend = ScriptedBackend::new(move |r, rate| {
            let h = u64::from(r.height)
                .wrapping_mul(2_654_435_761)
                .wrapping_add(u64::from(rate).wrapping_mul(40_503))
                .wrapping_add(seed.wrapping_mul(7_919));
            (h % 1001) as f64 / 10.0
        });
        let walker = HullWalker::new(config(&scratch), backend).unwrap();
        let hull = walker.walk(&source_1080p(), &CancelToken::new()).unwrap();

        assert_eq!(hull.len(), 9);
        let hs = heights(hull.points());
        for pair in hs.windows(2) {
            assert!(pair[0] >= pair[1], "seed {seed}: heights went up: {hs:?}");
        }
    }
}

#[test]
fn reaching_the_lowest_rung_yields_unmeasured_floor_points() {
    let scratch = temp_dir("walk_floor");
    let mut cfg = config(&scratch);
    cfg.ladder = ResolutionLadder::new(vec![P1080, P720]).unwrap();
    // The lower rung always wins, so the walk hits the bottom immediately.
    let backend = ScriptedBackend::new(|r, _| if r.height == 720 { 95.0 } else { 40.0 });
    let walker = HullWalker::new(cfg, backend).unwrap();

    let hull = walker.walk(&source_1080p(), &CancelToken::new()).unwrap();
    assert_eq!(hull.len(), 9);
    assert_eq!(hull.points()[0].resolution, P720);
    assert_eq!(hull.points()[0].quality, Quality::Measured(95.0));
    for p in &hull.points()[1..] {
        assert_eq!(p.resolution, P720);
        assert_eq!(p.quality, Quality::LadderFloor);
    }
}

#[test]
fn off_ladder_source_starts_from_its_own_resolution() {
    let scratch = temp_dir("walk_off_ladder");
    let backend = ScriptedBackend::new(|r, _| f64::from(r.height) / 12.0);
    let walker = HullWalker::new(config(&scratch), backend).unwrap();
    let source = SourceAsset::new("videos/odd.mp4", Resolution::new(800, 1422), 2100);

    let hull = walker.walk(&source, &CancelToken::new()).unwrap();
    assert_eq!(hull.rates().collect::<Vec<_>>(), vec![2000, 1500, 1000, 500]);
    assert!(hull.resolutions().all(|r| r == Resolution::new(800, 1422)));
}

#[test]
fn concurrent_walks_of_different_assets_do_not_interfere() {
    let scratch = temp_dir("walk_concurrent");
    let mut backend = ScriptedBackend::new(|r, rate| match r.height {
        1080 => 80.0,
        720 if rate < 2000 => 90.0,
        720 => 70.0,
        _ => 50.0,
    });
    // Only the 8000 kbps source ever probes 7500 kbps.
    backend.fail_encode_at_rate = Some(7500);
    let walker = HullWalker::new(config(&scratch), backend).unwrap();

    let sources: Vec<SourceAsset> = (0..6)
        .map(|i| {
            let rate = if i == 0 { 8000 } else { 5000 };
            SourceAsset::new(format!("videos/clip{i}.mp4"), P1080, rate)
        })
        .collect();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|s| {
                let walker = &walker;
                scope.spawn(move || walker.walk(s, &CancelToken::new()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let failed = results[0].as_ref().unwrap_err();
    assert_eq!(failed.rate_kbps, Some(7500));
    assert!(failed.partial.is_empty());
    for r in &results[1..] {
        let hull = r.as_ref().unwrap();
        assert_eq!(
            heights(hull.points()),
            vec![1080, 1080, 1080, 1080, 1080, 1080, 720, 720, 720]
        );
    }
    assert_scratch_empty(&scratch);
}

#[test]
fn cancellation_during_a_walk_keeps_points_already_resolved() {
    let scratch = temp_dir("walk_cancel");
    let cancel = CancelToken::new();
    let trip = cancel.clone();
    let backend = ScriptedBackend::new(move |r, rate| {
        if rate == 3500 {
            trip.cancel();
        }
        f64::from(r.height) / 12.0
    });
    let walker = HullWalker::new(config(&scratch), backend).unwrap();

    let failure = walker.walk(&source_1080p(), &cancel).unwrap_err();
    assert!(failure.is_cancelled());
    assert_eq!(failure.partial.rates().collect::<Vec<_>>(), vec![4500, 4000]);
    assert_eq!(failure.rate_kbps, Some(3500));
    assert_scratch_empty(&scratch);
}
