use approx::assert_relative_eq;
use nalgebra::Vector3;
use tubecal::synthetic::{SyntheticBank, SyntheticScan};
use tubecal::{
    CalibrationError, CalibrationParams, Stage, StripTilt, TubeAxis, TubeCalibrator, TubeId,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn faulty_scan() -> SyntheticScan {
    SyntheticScan {
        dead_pixels: vec![(TubeId(1), 10)],
        ..SyntheticScan::default()
    }
}

#[test]
fn three_disjoint_strips_calibrate_every_tube() {
    init_logger();
    let scan = SyntheticScan::default();
    let mut input = scan.build().expect("synthetic scan");
    let params = scan.params();

    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .expect("calibration");

    assert_eq!(result.table.len(), 4 * 128);
    assert_eq!(result.known_edges.len(), 6);
    assert!(result.cvalues.is_nominal());
    assert_eq!(result.cvalues.records.len(), 4);
    assert!(result.skipped.is_empty());
    for record in &result.cvalues.records {
        assert_relative_eq!(record.cvalue, 0.004 * 127.0, epsilon = 1e-3);
    }
    for diag in &result.diagnostics {
        assert_eq!(diag.guesses.len(), 6);
        assert!(diag.residuals.iter().all(|r| r.abs() < 1e-5));
    }

    // The synthetic geometry is already correct, so calibration reproduces it.
    for (base, calibrated) in input.bank.base_positions.iter().zip(&input.bank.positions) {
        assert_relative_eq!(base, calibrated, epsilon = 1e-4);
    }

    let stages: Vec<Stage> = result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Init,
            Stage::Loaded,
            Stage::Merged,
            Stage::PerTubeLoop,
            Stage::Calibrated
        ]
    );
}

#[test]
fn faulty_tube_is_skipped_when_allowed() {
    init_logger();
    let scan = faulty_scan();
    let mut input = scan.build().unwrap();
    let params = CalibrationParams {
        skip_tubes_on_error: true,
        ..scan.params()
    };

    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .expect("calibration with one skipped tube");

    assert_eq!(result.table.len(), 128 * 3);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].tube, TubeId(1));
    assert_eq!(result.skipped_messages().len(), 1);
    assert!(result.skipped[0].message.contains("found 8 edges, expected 6"));

    // The skipped tube keeps its uncalibrated positions.
    let range = input.bank.tube_range(TubeId(1)).unwrap();
    assert_eq!(
        input.bank.positions[range.clone()],
        input.bank.base_positions[range]
    );
}

#[test]
fn faulty_tube_aborts_by_default() {
    init_logger();
    let scan = faulty_scan();
    let mut input = scan.build().unwrap();
    let before = input.bank.positions.clone();

    let err = TubeCalibrator::new(scan.params())
        .calibrate(&mut input.bank, &input.measurements)
        .unwrap_err();

    assert!(matches!(
        err,
        CalibrationError::EdgeCountMismatch {
            found: 8,
            expected: 6,
            ..
        }
    ));
    assert_eq!(input.bank.positions, before);
}

#[test]
fn collapsed_tube_geometry_is_skipped_when_allowed() {
    init_logger();
    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let range = input.bank.tube_range(TubeId(2)).unwrap();
    input.bank.base_positions[range.end - 1] = input.bank.base_positions[range.start];
    let untouched = input.bank.positions[range.clone()].to_vec();

    let err = TubeCalibrator::new(scan.params())
        .calibrate(&mut input.bank.clone(), &input.measurements)
        .unwrap_err();
    assert!(matches!(err, CalibrationError::DegenerateTube { .. }));

    let params = CalibrationParams {
        skip_tubes_on_error: true,
        ..scan.params()
    };
    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .expect("calibration with a collapsed tube");

    assert_eq!(result.table.len(), 128 * 3);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].tube, TubeId(2));
    assert!(result.skipped[0].message.contains("degenerate tube geometry"));
    assert_eq!(input.bank.positions[range], untouched[..]);
}

#[test]
fn vertical_tubes_calibrate_along_y() {
    init_logger();
    let scan = SyntheticScan {
        bank: SyntheticBank {
            axis: TubeAxis::Y,
            tubes_per_module: 2,
            ..SyntheticBank::default()
        },
        ..SyntheticScan::default()
    };
    let mut input = scan.build().unwrap();

    let result = TubeCalibrator::new(scan.params())
        .calibrate(&mut input.bank, &input.measurements)
        .expect("calibration of a vertical bank");

    assert_eq!(result.table.len(), 4 * 128);
    assert_eq!(result.cvalues.records[3].name, "rear-module01-tube02");
    for (base, calibrated) in input.bank.base_positions.iter().zip(&input.bank.positions) {
        assert_relative_eq!(base, calibrated, epsilon = 1e-4);
    }
}

#[test]
fn failed_report_write_leaves_the_bank_untouched() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("missing").join("cvalues.txt");

    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let offset = Vector3::new(0.05, 0.0, 0.0);
    for p in &mut input.bank.positions {
        *p += offset;
    }
    let before = input.bank.positions.clone();
    let params = CalibrationParams {
        cvalue_report_path: Some(report_path.clone()),
        ..scan.params()
    };

    let err = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .unwrap_err();

    match &err {
        CalibrationError::Persist { path, .. } => assert_eq!(path, &report_path),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(input.bank.positions, before);
}

#[test]
fn every_tube_failing_is_a_calibration_error() {
    init_logger();
    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let params = CalibrationParams {
        skip_tubes_on_error: true,
        threshold: 5000.0,
        ..scan.params()
    };

    let err = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .unwrap_err();
    assert!(matches!(err, CalibrationError::CalibrationApply(_)));
}

#[test]
fn plateau_fits_reproduce_the_geometry() {
    init_logger();
    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let params = CalibrationParams {
        fit_edges: false,
        background: scan.profile.open,
        ..scan.params()
    };

    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .expect("plateau calibration");

    assert_eq!(result.table.len(), 4 * 128);
    for diag in &result.diagnostics {
        assert_eq!(diag.expected.len(), 3);
    }
    for (base, calibrated) in input.bank.base_positions.iter().zip(&input.bank.positions) {
        assert_relative_eq!(base, calibrated, epsilon = 1e-3);
    }
}

#[test]
fn tilt_shifts_calibrated_positions_along_the_tube() {
    init_logger();
    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let params = CalibrationParams {
        strip_tilt: Some(StripTilt {
            first: 0.0,
            last: 0.003,
        }),
        vertical_offset: 0.1,
        ..scan.params()
    };

    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .expect("tilted calibration");

    for diag in &result.diagnostics {
        let expected_shift = 0.001 * diag.tube.index() as f64;
        for s in &diag.shift {
            assert_relative_eq!(*s, expected_shift, epsilon = 1e-4);
        }
    }
    let n = input.bank.pixels_per_tube;
    let last_tube = 3 * n;
    assert_relative_eq!(
        input.bank.positions[last_tube].y,
        input.bank.base_positions[last_tube].y + 0.1,
        epsilon = 1e-12
    );
}

#[test]
fn missing_measurement_is_a_configuration_error() {
    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    input.measurements.pop();

    let err = TubeCalibrator::new(scan.params())
        .calibrate(&mut input.bank, &input.measurements)
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Configuration(_)));
}

#[test]
fn cvalue_and_snapshot_files_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let cvalue_path = dir.path().join("cvalues.txt");
    let snapshot_path = dir.path().join("bank.json");

    let scan = SyntheticScan::default();
    let mut input = scan.build().unwrap();
    let params = CalibrationParams {
        cvalue_threshold: 0.1,
        cvalue_report_path: Some(cvalue_path.clone()),
        output_path: Some(snapshot_path.clone()),
        ..scan.params()
    };

    let result = TubeCalibrator::new(params)
        .calibrate(&mut input.bank, &input.measurements)
        .unwrap();
    assert_eq!(result.cvalues.warnings.len(), 4);

    let text = std::fs::read_to_string(&cvalue_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("rear-module00-tube01\t"));

    let snapshot: tubecal::DetectorBank =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    assert_eq!(snapshot.positions.len(), 4 * 128);
}
