//! Synthetic datasets and analysis builders shared by the integration tests.

#![allow(dead_code)]

use rand::prelude::*;
use rand_distr::Normal;
use sky_core::FitParameter;
use sky_inference::{LlhRatioAnalysis, PdfRatioAttachment, TimeIntegratedSingleSourceAnalysis};
use sky_llh::{
    Dataset, DatasetData, DetSigYieldImplMethod, EventArray, FluxModel,
    PointLikeSource, PointLikeSourceSignalGenerationMethod, PowerLawDetSigYieldImplMethod,
    PowerLawFlux, SingleSourceFitParameterMapper, SourceHypoGroup, SourceHypoGroupManager,
};
use std::f64::consts::TAU;
use std::sync::Arc;

pub const SRC_RA: f64 = 1.2;
pub const SRC_DEC: f64 = 0.3;

/// Isotropic experimental events with a soft energy spectrum, and MC events over the
/// full sky with 0.01 rad point spread.
pub fn synthetic_data(seed: u64, n_exp: usize, n_mc: usize) -> Arc<DatasetData> {
    let mut rng = StdRng::seed_from_u64(seed);
    let psf = Normal::new(0.0, 0.01).unwrap();
    let eres = Normal::new(0.0, 0.2).unwrap();

    let mut exp: Vec<(String, Vec<f64>)> =
        ["ra", "dec", "ang_err", "log_energy"].iter().map(|n| (n.to_string(), Vec::new())).collect();
    for _ in 0..n_exp {
        exp[0].1.push(rng.random::<f64>() * TAU);
        exp[1].1.push((rng.random::<f64>() * 2.0 - 1.0).asin());
        exp[2].1.push(0.005 + 0.015 * rng.random::<f64>());
        exp[3].1.push(2.0 + 2.5 * rng.random::<f64>().powi(2));
    }

    let names = [
        "ra", "dec", "ang_err", "log_energy", "true_ra", "true_dec", "true_energy", "mcweight",
    ];
    let mut mc: Vec<(String, Vec<f64>)> = names.iter().map(|n| (n.to_string(), Vec::new())).collect();
    for _ in 0..n_mc {
        let true_ra = rng.random::<f64>() * TAU;
        let true_dec = (rng.random::<f64>() * 2.0 - 1.0).asin();
        let log_true_e = 2.0 + 4.0 * rng.random::<f64>();
        mc[0].1.push(true_ra + psf.sample(&mut rng));
        mc[1].1.push((true_dec + psf.sample(&mut rng)).clamp(-1.5, 1.5));
        mc[2].1.push(0.01);
        mc[3].1.push(log_true_e + eres.sample(&mut rng));
        mc[4].1.push(true_ra);
        mc[5].1.push(true_dec);
        mc[6].1.push(10f64.powf(log_true_e));
        mc[7].1.push(1e8);
    }
    Arc::new(
        DatasetData::new(EventArray::from_columns(exp).unwrap(), EventArray::from_columns(mc).unwrap())
            .unwrap(),
    )
}

pub fn source() -> PointLikeSource {
    PointLikeSource::new(SRC_RA, SRC_DEC).unwrap()
}

pub fn shg_mgr_with(
    fluxmodel: Arc<dyn FluxModel>,
    n_methods: usize,
) -> Arc<SourceHypoGroupManager> {
    let methods: Vec<Arc<dyn DetSigYieldImplMethod>> = (0..n_methods)
        .map(|_| Arc::new(PowerLawDetSigYieldImplMethod::default()) as Arc<dyn DetSigYieldImplMethod>)
        .collect();
    let group = SourceHypoGroup::new(
        vec![source()],
        fluxmodel,
        methods,
        Some(Arc::new(PointLikeSourceSignalGenerationMethod::default())),
    )
    .unwrap();
    Arc::new(SourceHypoGroupManager::single(group))
}

pub fn shg_mgr(n_methods: usize) -> Arc<SourceHypoGroupManager> {
    shg_mgr_with(Arc::new(PowerLawFlux::new(1e-18, 1e3, 2.0).unwrap()), n_methods)
}

/// Analysis fitting `ns` (starting at 0) and `gamma`.
pub fn analysis_with(
    shg_mgr: Arc<SourceHypoGroupManager>,
    attachment: PdfRatioAttachment,
) -> TimeIntegratedSingleSourceAnalysis {
    let mut mapper = SingleSourceFitParameterMapper::new();
    mapper.def_fit_parameter(FitParameter::new("gamma", 1.0, 4.0, 2.0).unwrap(), "gamma").unwrap();
    TimeIntegratedSingleSourceAnalysis::new(
        shg_mgr,
        mapper,
        FitParameter::new("ns", 0.0, 100.0, 0.0).unwrap(),
        attachment,
    )
    .unwrap()
}

pub fn dataset(j: usize) -> Dataset {
    Dataset::new(format!("sample_{j}"), 200.0 + 100.0 * j as f64).unwrap()
}

/// Spatial-energy analysis over `n_datasets` datasets of `n_exp` events each, with the
/// LLH ratio constructed.
pub fn constructed_analysis(n_datasets: usize, n_exp: usize) -> TimeIntegratedSingleSourceAnalysis {
    let mut ana = analysis_with(shg_mgr(1), PdfRatioAttachment::SpatialEnergy);
    for j in 0..n_datasets {
        ana.add_spatial_energy_dataset(dataset(j), synthetic_data(10 + j as u64, n_exp, 3000))
            .unwrap();
    }
    ana.construct_llhratio().unwrap();
    ana
}
