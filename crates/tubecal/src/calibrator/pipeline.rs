use super::report::{CvalueRecord, CvalueReport};
use super::result::{SkippedTube, TubeDiagnostics, TubeOutcome};
use super::stage::StageTracker;
use super::{CalibrationError, CalibrationParams, CalibrationResult};
use crate::io::write_json;
use log::{debug, error, info, warn};
use std::borrow::Cow;
use tubecal_core::{
    detect_edges, merge_measurements, project_tube, CalibrationTable, DetectorBank, EdgePair,
    MergedMeasurement, StripMeasurement, TubeId,
};
use tubecal_fit::{
    correct_tube, fit_edge, fit_peak, mean_resolution, FitMode, FitParams, PeakFit,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Read-only state shared by every per-tube computation.
struct TubeContext<'a> {
    bank: &'a DetectorBank,
    merged: &'a MergedMeasurement,
    params: &'a CalibrationParams,
    fit: FitParams,
    mode: FitMode,
}

/// Results folded in tube order.
#[derive(Default)]
struct Accumulator {
    table: CalibrationTable,
    cvalues: Vec<CvalueRecord>,
    diagnostics: Vec<TubeDiagnostics>,
    skipped: Vec<SkippedTube>,
}

/// Strip-scan calibration of one detector bank.
pub struct TubeCalibrator {
    params: CalibrationParams,
}

impl TubeCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Calibrate `bank` from strip measurements and apply the result to it.
    ///
    /// The bank is only written once every tube has been processed and the
    /// cvalue report and snapshot are on disk; on error it keeps its previous
    /// positions.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, bank, measurements), fields(bank = %bank.name))
    )]
    pub fn calibrate(
        &self,
        bank: &mut DetectorBank,
        measurements: &[StripMeasurement],
    ) -> Result<CalibrationResult, CalibrationError> {
        let mut stages = StageTracker::new();
        match self.run(&mut stages, bank, measurements) {
            Ok(mut result) => {
                result.stages = stages.into_timings();
                Ok(result)
            }
            Err(err) => {
                error!("calibration failed in stage {}: {err}", stages.current());
                stages.abort();
                Err(err)
            }
        }
    }

    fn run(
        &self,
        stages: &mut StageTracker,
        bank: &mut DetectorBank,
        measurements: &[StripMeasurement],
    ) -> Result<CalibrationResult, CalibrationError> {
        let params = &self.params;
        bank.validate()?;
        params.validate(bank)?;

        stages.advance();
        let selected = self.select_measurements(measurements)?;
        let geometry = params.geometry();
        let pairs = params
            .strip_positions
            .iter()
            .zip(&selected)
            .map(|(&position, m)| Ok((&**m, geometry.edges_for(position, m)?)))
            .collect::<Result<Vec<(&StripMeasurement, EdgePair)>, CalibrationError>>()?;
        for (m, pair) in &pairs {
            debug!(
                "strip {}: edges ({:.5}, {:.5}) m",
                m.id, pair.left, pair.right
            );
        }

        stages.advance();
        let merged = merge_measurements(&pairs, &bank.axial_coordinates())?;
        let mode = params.fit_mode();
        if mode.expected_positions(&merged.known_edges).is_none() {
            return Err(CalibrationError::Configuration(format!(
                "peak fitting needs an even number of known edges, got {}",
                merged.known_edges.len()
            )));
        }
        info!(
            "merged {} strips into {} known edges",
            pairs.len(),
            merged.known_edges.len()
        );

        stages.advance();
        let ctx = TubeContext {
            bank: &*bank,
            merged: &merged,
            params,
            fit: params.fit_params(),
            mode,
        };
        let acc = self.calibrate_tubes(&ctx)?;

        stages.advance();
        if acc.table.is_empty() {
            return Err(CalibrationError::CalibrationApply(
                "no tube produced calibrated positions".into(),
            ));
        }
        let mut calibrated = bank.clone();
        let applied = calibrated
            .apply_calibration(&acc.table)
            .map_err(|e| CalibrationError::CalibrationApply(e.to_string()))?;

        stages.advance();
        let cvalues = CvalueReport::new(acc.cvalues, params.cvalue_threshold);
        cvalues.log();
        if !acc.skipped.is_empty() {
            let messages: Vec<&str> = acc.skipped.iter().map(|s| s.message.as_str()).collect();
            warn!(
                "{} tubes were not calibrated:\n{}",
                acc.skipped.len(),
                messages.join("\n")
            );
        }
        if let Some(path) = &params.cvalue_report_path {
            cvalues.write_text(path)?;
        }
        if let Some(path) = &params.output_path {
            write_json(&calibrated, path)?;
        }
        *bank = calibrated;
        info!("applied {applied} calibrated positions to bank {}", bank.name);

        Ok(CalibrationResult {
            table: acc.table,
            cvalues,
            diagnostics: acc.diagnostics,
            skipped: acc.skipped,
            known_edges: merged.known_edges,
            stages: Vec::new(),
        })
    }

    /// Measurements in strip order, rescaled when a reference intensity is set.
    fn select_measurements<'m>(
        &self,
        measurements: &'m [StripMeasurement],
    ) -> Result<Vec<Cow<'m, StripMeasurement>>, CalibrationError> {
        self.params
            .data_ids
            .iter()
            .map(|id| {
                let m = measurements.iter().find(|m| &m.id == id).ok_or_else(|| {
                    CalibrationError::Configuration(format!("no measurement with id {id}"))
                })?;
                Ok(match self.params.reference_intensity {
                    Some(reference) => Cow::Owned(m.rescaled_to(reference)?),
                    None => Cow::Borrowed(m),
                })
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn calibrate_tubes(&self, ctx: &TubeContext<'_>) -> Result<Accumulator, CalibrationError> {
        let outcomes = ctx
            .bank
            .tubes()
            .map(|tube| (tube, calibrate_tube(ctx, tube)));
        self.fold_outcomes(ctx, outcomes)
    }

    #[cfg(feature = "parallel")]
    fn calibrate_tubes(&self, ctx: &TubeContext<'_>) -> Result<Accumulator, CalibrationError> {
        let outcomes: Vec<_> = (0..ctx.bank.num_tubes)
            .into_par_iter()
            .map(|t| (TubeId(t), calibrate_tube(ctx, TubeId(t))))
            .collect();
        self.fold_outcomes(ctx, outcomes)
    }

    /// Fold per-tube outcomes in tube order, applying the skip/abort policy.
    fn fold_outcomes<I>(&self, ctx: &TubeContext<'_>, outcomes: I) -> Result<Accumulator, CalibrationError>
    where
        I: IntoIterator<Item = (TubeId, Result<TubeOutcome, CalibrationError>)>,
    {
        let skip = self.params.skip_tubes_on_error;
        outcomes
            .into_iter()
            .try_fold(Accumulator::default(), |mut acc, (tube, outcome)| {
                match outcome {
                    Ok(outcome) => {
                        acc.table.extend(outcome.rows);
                        acc.cvalues.push(outcome.cvalue);
                        acc.diagnostics.push(outcome.diagnostics);
                    }
                    Err(err) if skip && err.is_tube_level() => {
                        warn!("skipping {}: {err}", ctx.bank.tube_name(tube));
                        acc.skipped.push(SkippedTube {
                            tube,
                            name: ctx.bank.tube_name(tube),
                            message: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err),
                }
                Ok(acc)
            })
    }
}

/// Detect, fit, correct and project one tube.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(tube = tube.index())))]
fn calibrate_tube(ctx: &TubeContext<'_>, tube: TubeId) -> Result<TubeOutcome, CalibrationError> {
    let bank = ctx.bank;
    let params = ctx.params;
    let name = bank.tube_name(tube);
    let range = bank.tube_range(tube)?;
    let n = bank.pixels_per_tube;
    let profile = &ctx.merged.counts[range.clone()];

    let guesses = detect_edges(
        profile,
        params.threshold,
        params.starting_pixel,
        params.scan_end(n),
    );
    let known = &ctx.merged.known_edges;
    if guesses.len() != known.len() {
        return Err(CalibrationError::EdgeCountMismatch {
            tube: name,
            found: guesses.len(),
            expected: known.len(),
        });
    }

    let offset = params.tilt_offset(tube, bank.num_tubes);
    let shifted: Vec<f64> = known.iter().map(|k| k + offset).collect();
    let guess_px: Vec<f64> = guesses.iter().map(|&g| g as f64).collect();
    let odd_edges = || {
        CalibrationError::Configuration(format!("{name}: odd number of edges in peak mode"))
    };
    let expected = ctx.mode.expected_positions(&shifted).ok_or_else(odd_edges)?;
    let seeds = ctx.mode.expected_positions(&guess_px).ok_or_else(odd_edges)?;

    let fits = match ctx.mode {
        FitMode::Edge => seeds
            .iter()
            .map(|&g| fit_edge(profile, g, &ctx.fit))
            .collect::<Result<Vec<PeakFit>, _>>(),
        FitMode::Peak => seeds
            .iter()
            .zip(guess_px.chunks_exact(2))
            .map(|(&g, pair)| fit_peak(profile, g, Some(pair[1] - pair[0]), &ctx.fit))
            .collect::<Result<Vec<PeakFit>, _>>(),
    }
    .map_err(|e| CalibrationError::from_fit(&name, e))?;

    let fitted: Vec<f64> = fits.iter().map(|f| f.centre).collect();
    let corrected =
        correct_tube(&fitted, &expected, n).map_err(|e| CalibrationError::from_fit(&name, e))?;

    let (first, last) = bank.tube_end_points(tube)?;
    let rows = project_tube(
        first,
        last,
        &corrected.positions,
        bank.tube_detector_ids(tube)?,
        bank.axis,
        params.vertical_offset,
    )
    .map_err(|e| CalibrationError::from_projection(&name, e))?;

    let cvalue = mean_resolution(&fits);
    debug!(
        "{name}: {} fits, cvalue {cvalue:.4}, quadratic ({:.6}, {:.6}, {:.6})",
        fits.len(),
        corrected.poly.a0,
        corrected.poly.a1,
        corrected.poly.a2
    );

    let residuals = fitted
        .iter()
        .zip(&expected)
        .filter(|(x, _)| **x > 0.0 && **x < n as f64)
        .map(|(&x, &k)| k - corrected.poly.eval(x))
        .collect();
    let shift = rows
        .iter()
        .zip(&bank.base_positions[range])
        .map(|(row, base)| bank.axis.component(&row.position) - bank.axis.component(base))
        .collect();
    let diagnostics = TubeDiagnostics {
        tube,
        name: name.clone(),
        profile: profile.to_vec(),
        guesses,
        expected,
        curves: fits.iter().map(PeakFit::curve).collect(),
        fits,
        poly: corrected.poly,
        residuals,
        shift,
    };

    Ok(TubeOutcome {
        rows,
        cvalue: CvalueRecord { tube, name, cvalue },
        diagnostics,
    })
}
