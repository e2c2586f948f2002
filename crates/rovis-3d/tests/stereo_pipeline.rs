use approx::assert_relative_eq;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use rovis_3d::{
    camera::build_intrinsics,
    metrics::{clouds_to_matched_list, mean_squared_distance},
    observation::{to_bearing_range, BearingRangeSource, LandmarkCloud, StereoObservation},
    pose::Pose3d,
    stereo::{project_matched_features, project_ordered_features, StereoParams},
};
use rovis_imgproc::features::{
    match_features, row_checking, Descriptor, DescriptorMetric, Feature, FeatureList,
    MatchingOptions,
};

const NUM_POINTS: usize = 40;

struct Scene {
    points: Vec<[f64; 3]>,
    left: FeatureList,
    right: FeatureList,
}

fn synthetic_scene(seed: u64, params: &StereoParams) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let k = &params.intrinsics;

    let mut points = Vec::with_capacity(NUM_POINTS);
    let mut left = Vec::with_capacity(NUM_POINTS);
    let mut right = Vec::with_capacity(NUM_POINTS);
    for i in 0..NUM_POINTS {
        let p = [
            rng.random_range(-1.5..1.5),
            rng.random_range(-1.0..1.0),
            rng.random_range(2.0..10.0),
        ];
        let descriptor: Vec<u8> = (0..32).map(|_| rng.random()).collect();

        let xl = k.fx() * p[0] / p[2] + k.cx();
        let xr = k.fx() * (p[0] - params.baseline) / p[2] + k.cx();
        let y = k.fy() * p[1] / p[2] + k.cy();

        left.push(
            Feature::new(i as u64, xl as f32, y as f32)
                .with_descriptor(Descriptor::Binary(descriptor.clone())),
        );
        right.push(
            Feature::new(1000 + i as u64, xr as f32, y as f32)
                .with_descriptor(Descriptor::Binary(descriptor)),
        );
        points.push(p);
    }
    right.shuffle(&mut rng);

    Scene {
        points,
        left: left.into(),
        right: right.into(),
    }
}

fn params() -> Result<StereoParams, Box<dyn std::error::Error>> {
    Ok(StereoParams {
        min_depth: 0.0,
        max_depth: 100.0,
        ..StereoParams::new(build_intrinsics(500.0, 500.0, 320.0, 240.0)?, 0.12)
    })
}

#[test]
fn match_and_triangulate() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let params = params()?;
    let scene = synthetic_scene(3, &params);

    let options = MatchingOptions {
        metric: DescriptorMetric::Hamming,
        ..Default::default()
    };
    let pairs = match_features(&scene.left, &scene.right, &options)?;
    assert_eq!(pairs.len(), NUM_POINTS);
    for pair in &pairs {
        assert_eq!(pair.distance, 0.0);
        assert_eq!(scene.right[pair.right].id.0, 1000 + scene.left[pair.left].id.0);
    }

    // reorder the right list into correspondence order and check the rows
    let mut left = FeatureList::new();
    let mut right = FeatureList::new();
    for pair in &pairs {
        left.push(scene.left[pair.left].clone());
        right.push(scene.right[pair.right].clone());
    }
    row_checking(&mut left, &mut right, 1.0)?;
    assert_eq!(left.len(), NUM_POINTS);

    let triangulation = project_ordered_features(&left, &right, &params)?;
    assert_eq!(triangulation.skipped_degenerate, 0);
    assert_eq!(triangulation.landmarks.len(), NUM_POINTS);

    for (_, landmark) in triangulation.landmarks.iter() {
        let expected = scene.points[landmark.feature_id.0 as usize];
        let tolerance = 1e-3 * expected[2] * expected[2];
        for i in 0..3 {
            assert_relative_eq!(landmark.position[i], expected[i], epsilon = tolerance);
        }
        assert!(landmark.covariance.is_some());
    }

    // the same pairs give the same landmarks without reordering
    let direct = project_matched_features(&scene.left, &scene.right, &pairs, &params)?;
    assert_eq!(direct.landmarks.positions(), triangulation.landmarks.positions());
    Ok(())
}

#[test]
fn bearing_range_from_all_sources() -> Result<(), Box<dyn std::error::Error>> {
    let params = StereoParams {
        sensor_pose: Pose3d::from_ypr(0.1, 0.0, 1.2, -std::f64::consts::FRAC_PI_2, 0.0, -std::f64::consts::FRAC_PI_2),
        ..params()?
    };
    let scene = synthetic_scene(9, &params);
    let options = MatchingOptions {
        metric: DescriptorMetric::Hamming,
        ..Default::default()
    };
    let matches = match_features(&scene.left, &scene.right, &options)?;

    let observation = StereoObservation {
        left_features: scene.left,
        right_features: scene.right,
        matches,
        intrinsics: params.intrinsics,
        baseline: params.baseline,
        sensor_pose: params.sensor_pose,
    };
    let from_pair = to_bearing_range(BearingRangeSource::StereoImagePair {
        observation: &observation,
        sigmas: [1.0, 1.0, 1.0],
    })?;
    assert_eq!(from_pair.measurements.len(), NUM_POINTS);

    let triangulation = project_matched_features(
        &observation.left_features,
        &observation.right_features,
        &observation.matches,
        &params,
    )?;
    let cloud = LandmarkCloud {
        landmarks: triangulation.landmarks,
        sensor_pose: params.sensor_pose,
    };
    let from_cloud = to_bearing_range(BearingRangeSource::LandmarkCloud(&cloud))?;
    assert_eq!(from_cloud.measurements.len(), NUM_POINTS);
    assert_relative_eq!(
        from_cloud.max_sensor_distance,
        from_pair.max_sensor_distance,
        epsilon = 1e-9
    );
    for (a, b) in from_cloud.measurements.iter().zip(&from_pair.measurements) {
        assert_eq!(a.feature_id, b.feature_id);
        assert_relative_eq!(a.range, b.range, epsilon = 1e-9);
        assert_relative_eq!(a.yaw, b.yaw, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn registration_error_of_two_views() -> Result<(), Box<dyn std::error::Error>> {
    let params = params()?;
    let scene = synthetic_scene(21, &params);
    let options = MatchingOptions {
        metric: DescriptorMetric::Hamming,
        ..Default::default()
    };
    let pairs = match_features(&scene.left, &scene.right, &options)?;
    let first = project_matched_features(&scene.left, &scene.right, &pairs, &params)?;

    // the same view seen from a displaced rig
    let motion = Pose3d::from_ypr(0.3, 0.0, -0.2, 0.05, 0.0, 0.0);
    let moved = StereoParams {
        sensor_pose: motion,
        ..params
    };
    let second = project_matched_features(&scene.left, &scene.right, &pairs, &moved)?;

    let correspondences = clouds_to_matched_list(&second.landmarks, &first.landmarks);
    assert_eq!(correspondences.len(), NUM_POINTS);
    let msd_identity = mean_squared_distance(&correspondences, &Pose3d::identity())?;
    let msd_motion = mean_squared_distance(&correspondences, &motion)?;
    assert_relative_eq!(msd_motion, 0.0, epsilon = 1e-12);
    assert!(msd_identity > msd_motion);
    Ok(())
}
