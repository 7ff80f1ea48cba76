//! End-to-end checks of the analysis lifecycle and the trial runner on synthetic
//! datasets.

mod common;

use common::*;
use sky_core::{Error, RandomStateService, TimeLord};
use sky_inference::{
    AnalysisConfig, AnalysisState, LlhRatioAnalysis, PdfRatioAttachment, TimeIntegratedSingleSourceAnalysis,
};
use sky_llh::math::angular_distance;
use sky_llh::{
    CutoffPowerLawFlux, DecBandEventSelectionMethod, EnergySigOverBkgPdfRatio, PdfRatio,
    PointLikeSource, SpatialSigOverBkgPdfRatio,
};
use std::sync::Arc;

// ── Trial tables ─────────────────────────────────────────────────────────

#[test]
fn test_do_trials_returns_one_row_per_trial() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(1);
    let table = ana.do_trials(&mut rss, 6, None, 0.0, Some(2), None).unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(table.field_names(), vec!["n_sig", "TS", "ns", "gamma"]);
    for r in table.records() {
        assert_eq!(r.fitparam_values.len(), 2);
        assert!(r.ts.is_finite());
    }
}

#[test]
fn test_zero_trials_is_empty_with_schema() {
    let ana = constructed_analysis(1, 100);
    let mut rss = RandomStateService::from_seed(2);
    let table = ana.do_trials(&mut rss, 0, None, 0.0, None, None).unwrap();
    assert!(table.is_empty());
    assert_eq!(table.field_names(), vec!["n_sig", "TS", "ns", "gamma"]);
    assert_eq!(table.n_nonconverged, 0);
}

#[test]
fn test_background_only_trials_inject_nothing() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(3);
    let means = [Some(80.0), Some(120.0)];
    let table = ana.do_trials(&mut rss, 200, Some(means.as_slice()), 0.0, Some(4), None).unwrap();
    assert_eq!(table.len(), 200);
    assert!(table.n_sig().iter().all(|&n| n == 0));
    assert!(table.records().iter().all(|r| r.ts.is_finite()));
}

#[test]
fn test_background_only_event_count_follows_background_mean() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(13);
    let means = [Some(80.0), Some(120.0)];
    let n_draws = 2000;
    let mut totals = [0u64; 2];
    for _ in 0..n_draws {
        let pd = ana.generate_pseudo_data(&mut rss, Some(means.as_slice()), 0.0).unwrap();
        assert_eq!(pd.n_sig, 0);
        totals[0] += pd.n_events_list[0];
        totals[1] += pd.n_events_list[1];
    }
    for (total, mu) in totals.iter().zip([80.0, 120.0]) {
        let mean = *total as f64 / n_draws as f64;
        assert!((mean - mu).abs() < 1.0, "mean n_events {mean}, expected {mu}");
    }
}

#[test]
fn test_trials_independent_of_worker_count() {
    let ana = constructed_analysis(2, 100);
    let one = ana
        .do_trials(&mut RandomStateService::from_seed(4), 6, None, 3.0, Some(1), None)
        .unwrap();
    let many = ana
        .do_trials(&mut RandomStateService::from_seed(4), 6, None, 3.0, Some(3), None)
        .unwrap();
    assert_eq!(one, many);
}

#[test]
fn test_do_trial_is_reproducible() {
    let ana = constructed_analysis(2, 100);
    let a = ana.do_trial(&mut RandomStateService::from_seed(5), None, 4.0, None).unwrap();
    let b = ana.do_trial(&mut RandomStateService::from_seed(5), None, 4.0, None).unwrap();
    assert_eq!(a.record, b.record);
    assert_eq!(a.status, b.status);
}

#[test]
fn test_time_lord_records_trial_tasks() {
    let ana = constructed_analysis(1, 100);
    let tl = TimeLord::new();
    ana.do_trials(&mut RandomStateService::from_seed(6), 3, None, 0.0, Some(1), Some(&tl))
        .unwrap();
    for task in [
        "Generating pseudo data.",
        "Initializing trial.",
        "Maximizing LLH ratio function.",
        "Calculating test statistic.",
    ] {
        assert_eq!(tl.summary(task).map(|s| s.count), Some(3), "task {task}");
    }
}

// ── Pseudo data ──────────────────────────────────────────────────────────

#[test]
fn test_signal_count_follows_poisson_mean() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(7);
    let mu = 5.0;
    let n_draws = 2000;
    let mut total = 0u64;
    for _ in 0..n_draws {
        let pd = ana.generate_pseudo_data(&mut rss, None, mu).unwrap();
        let injected: u64 = pd.n_events_list.iter().map(|n| n - 100).sum();
        assert_eq!(injected, pd.n_sig);
        for (events, &n) in pd.events_list.iter().zip(&pd.n_events_list) {
            assert_eq!(events.n_events() as u64, n);
        }
        total += pd.n_sig;
    }
    let mean = total as f64 / n_draws as f64;
    assert!((mean - mu).abs() < 0.25, "mean n_sig {mean}");
}

#[test]
fn test_background_mean_per_dataset() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(8);
    let means = [Some(0.0), None];
    let pd = ana.generate_pseudo_data(&mut rss, Some(means.as_slice()), 0.0).unwrap();
    assert_eq!(pd.n_events_list, vec![0, 100]);
    assert_eq!(pd.n_sig, 0);

    let err = ana.generate_pseudo_data(&mut rss, Some([None].as_slice()), 0.0).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_invalid_background_mean_is_rejected() {
    let ana = constructed_analysis(2, 100);
    let mut rss = RandomStateService::from_seed(9);
    for bad in [-1.0, f64::NAN, f64::INFINITY] {
        let means = [None, Some(bad)];
        let err = ana.generate_pseudo_data(&mut rss, Some(means.as_slice()), 0.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "mean {bad}");
        let err = ana
            .do_trials(&mut rss, 2, Some(means.as_slice()), 0.0, Some(1), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "mean {bad}");
    }
}

#[test]
fn test_generators_are_built_once() {
    let ana = constructed_analysis(1, 100);
    let a: *const _ = ana.ensure_background_generator().unwrap();
    let b: *const _ = ana.ensure_background_generator().unwrap();
    assert_eq!(a, b);
    let s1: *const _ = ana.ensure_signal_generator().unwrap();
    let s2: *const _ = ana.ensure_signal_generator().unwrap();
    assert_eq!(s1, s2);
}

// ── Trial initialization ─────────────────────────────────────────────────

#[test]
fn test_pure_background_count_is_complement_of_selection() {
    let shg = shg_mgr(1);
    let selection = DecBandEventSelectionMethod::new(Arc::clone(&shg), 0.2).unwrap();
    let mut ana = analysis_with(shg, PdfRatioAttachment::SpatialEnergy)
        .with_event_selection_method(Box::new(selection));
    for j in 0..2 {
        ana.add_spatial_energy_dataset(dataset(j), synthetic_data(20 + j as u64, 100, 3000))
            .unwrap();
    }
    ana.construct_llhratio().unwrap();

    let mut rss = RandomStateService::from_seed(9);
    let pd = ana.generate_pseudo_data(&mut rss, None, 0.0).unwrap();
    let mut llhratio = ana.llhratio().unwrap().clone();
    ana.initialize_trial(&mut llhratio, pd.events_list, Some(pd.n_events_list.as_slice())).unwrap();
    for (j, llh) in llhratio.llhratios().iter().enumerate() {
        let tdm = llh.tdm();
        assert!(tdm.n_selected() < 100);
        assert_eq!(tdm.n_selected() as u64 + tdm.n_pure_bkg_events(), pd.n_events_list[j]);
    }
    assert!(!ana.llhratio().unwrap().is_initialized());
}

#[test]
fn test_event_count_below_selection_is_rejected() {
    let ana = constructed_analysis(1, 100);
    let mut llhratio = ana.llhratio().unwrap().clone();
    let events = vec![ana.core().data_list()[0].exp().clone()];
    let err = ana.initialize_trial(&mut llhratio, events, Some([50].as_slice())).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_maximize_uninitialized_is_state_error() {
    let ana = constructed_analysis(1, 100);
    let llhratio = ana.llhratio().unwrap().clone();
    let err = ana
        .maximize_llhratio(&llhratio, &mut RandomStateService::from_seed(10))
        .unwrap_err();
    assert!(matches!(err, Error::State(_)));
}

// ── Construction errors ──────────────────────────────────────────────────

#[test]
fn test_two_yield_methods_for_three_datasets_is_configuration_error() {
    let mut ana = analysis_with(shg_mgr(2), PdfRatioAttachment::SpatialEnergy);
    for j in 0..3 {
        ana.add_spatial_energy_dataset(dataset(j), synthetic_data(30 + j as u64, 100, 500))
            .unwrap();
    }
    let err = ana.construct_llhratio().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(ana.state(), AnalysisState::DatasetsAdded);
}

#[test]
fn test_one_yield_method_per_dataset_is_accepted() {
    let mut ana = analysis_with(shg_mgr(2), PdfRatioAttachment::SpatialEnergy);
    for j in 0..2 {
        ana.add_spatial_energy_dataset(dataset(j), synthetic_data(40 + j as u64, 100, 2000))
            .unwrap();
    }
    ana.construct_llhratio().unwrap();
    assert_eq!(ana.state(), AnalysisState::LlhRatioConstructed);
    assert_eq!(ana.llhratio().unwrap().n_datasets(), 2);
}

#[test]
fn test_unsupported_flux_model_is_configuration_error() {
    let flux = CutoffPowerLawFlux::new(1e-18, 1e3, 2.0, 1e5).unwrap();
    let mut ana = analysis_with(shg_mgr_with(Arc::new(flux), 1), PdfRatioAttachment::Generic);
    ana.add_spatial_energy_dataset(dataset(0), synthetic_data(50, 100, 500)).unwrap();
    let err = ana.construct_llhratio().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_spatial_ratio_in_energy_slot_is_configuration_error() {
    let mut ana = analysis_with(shg_mgr(1), PdfRatioAttachment::SpatialEnergy);
    let data = synthetic_data(60, 100, 500);
    let spatial: Arc<dyn PdfRatio> =
        Arc::new(SpatialSigOverBkgPdfRatio::with_default_binning(data.exp()).unwrap());
    let err = ana
        .add_dataset(dataset(0), Arc::clone(&data), vec![Arc::clone(&spatial), spatial], None)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(ana.state(), AnalysisState::Created);
    assert_eq!(ana.core().n_datasets(), 0);

    let energy: Arc<dyn PdfRatio> =
        Arc::new(EnergySigOverBkgPdfRatio::with_default_binning(data.exp()).unwrap());
    let err = ana.add_dataset(dataset(0), data, vec![energy], None).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_single_multidim_analysis_runs_trials() {
    let mut ana: TimeIntegratedSingleSourceAnalysis =
        analysis_with(shg_mgr(1), PdfRatioAttachment::SingleMultiDim);
    ana.add_multidim_dataset(dataset(0), synthetic_data(70, 100, 3000)).unwrap();
    ana.construct_llhratio().unwrap();
    let table = ana
        .do_trials(&mut RandomStateService::from_seed(11), 3, None, 2.0, Some(1), None)
        .unwrap();
    assert_eq!(table.len(), 3);
}

#[test]
fn test_spatial_ratio_in_multidim_slot_is_configuration_error() {
    let mut ana = analysis_with(shg_mgr(1), PdfRatioAttachment::SingleMultiDim);
    let data = synthetic_data(71, 100, 500);
    let spatial: Arc<dyn PdfRatio> =
        Arc::new(SpatialSigOverBkgPdfRatio::with_default_binning(data.exp()).unwrap());
    let err = ana.add_dataset(dataset(0), data, vec![spatial], None).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(ana.core().n_datasets(), 0);
}

// ── Configuration ────────────────────────────────────────────────────────

#[test]
fn test_config_drives_trial_batch() {
    let cfg = AnalysisConfig::from_json_str(
        r#"{
            "minimizer": {"max_repetitions": 2},
            "trials": {"seed": 21, "ncpu": 2, "n_trials": 4, "sig_mean": 3.0,
                       "bkg_mean_list": [null, 90.0]}
        }"#,
    )
    .unwrap();
    let ana = cfg.configure(constructed_analysis(2, 100));
    assert_eq!(ana.core().minimizer().max_repetitions(), 2);

    let table = cfg.run_trials(&ana, None).unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table, cfg.run_trials(&ana, None).unwrap());

    let means = [None, Some(90.0)];
    let direct = ana
        .do_trials(&mut RandomStateService::from_seed(21), 4, Some(means.as_slice()), 3.0, Some(1), None)
        .unwrap();
    assert_eq!(table, direct);
}

// ── Lifecycle ────────────────────────────────────────────────────────────

#[test]
fn test_change_source_before_construction_is_state_error() {
    let mut ana = analysis_with(shg_mgr(1), PdfRatioAttachment::SpatialEnergy);
    ana.add_spatial_energy_dataset(dataset(0), synthetic_data(80, 100, 500)).unwrap();
    let err = ana.change_source(PointLikeSource::new(0.4, -0.2).unwrap()).unwrap_err();
    assert!(matches!(err, Error::State(_)));
}

#[test]
fn test_change_source_moves_injected_signal() {
    let mut ana = constructed_analysis(2, 100);
    ana.ensure_signal_generator().unwrap();
    let new_src = PointLikeSource::new(4.0, -0.5).unwrap();
    ana.change_source(new_src).unwrap();

    assert_eq!(*ana.llhratio().unwrap().llhratios()[0].source(), new_src);
    let mut rss = RandomStateService::from_seed(12);
    let pd = ana.generate_pseudo_data(&mut rss, Some([Some(0.0), Some(0.0)].as_slice()), 20.0).unwrap();
    assert!(pd.n_sig > 0);
    for events in &pd.events_list {
        let ra = events.column("ra").unwrap();
        let dec = events.column("dec").unwrap();
        for (&r, &d) in ra.iter().zip(dec) {
            assert!(angular_distance(r, d, new_src.ra(), new_src.dec()) < 0.1);
        }
    }
}

#[test]
fn test_late_dataset_drops_llhratio() {
    let mut ana = constructed_analysis(1, 100);
    ana.add_spatial_energy_dataset(dataset(1), synthetic_data(90, 100, 3000)).unwrap();
    assert_eq!(ana.state(), AnalysisState::DatasetsAdded);
    assert!(matches!(ana.llhratio().unwrap_err(), Error::State(_)));
    ana.construct_llhratio().unwrap();
    assert_eq!(ana.llhratio().unwrap().n_datasets(), 2);
}

// ── Unblinding ───────────────────────────────────────────────────────────

#[test]
fn test_unblind_two_datasets() {
    let ana = constructed_analysis(2, 100);
    let (ts, fitparams, status) = ana.unblind(&mut RandomStateService::from_seed(13)).unwrap();
    assert!(ts >= 0.0, "TS {ts}, {status}");
    assert!(fitparams["ns"] >= 0.0);
    assert!((1.0..=4.0).contains(&fitparams["gamma"]));
    assert_eq!(fitparams.len(), 2);
}
