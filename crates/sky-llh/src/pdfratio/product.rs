use super::{PdfKind, PdfRatio, check_out_len};
use crate::event_store::EventArray;
use crate::source::{PointLikeSource, SourceParams};
use sky_core::{Error, Result};
use std::sync::Arc;

/// Product of several ratios, treated as one multi-dimensional ratio.
#[derive(Debug, Clone)]
pub struct MultiDimPdfRatio {
    ratios: Vec<Arc<dyn PdfRatio>>,
    param_names: Vec<String>,
}

impl MultiDimPdfRatio {
    /// Combine at least one ratio.
    pub fn new(ratios: Vec<Arc<dyn PdfRatio>>) -> Result<Self> {
        if ratios.is_empty() {
            return Err(Error::Validation("multi-dimensional PDF ratio needs components".into()));
        }
        let mut param_names: Vec<String> = Vec::new();
        for r in &ratios {
            for p in r.param_names() {
                if !param_names.contains(p) {
                    param_names.push(p.clone());
                }
            }
        }
        Ok(Self { ratios, param_names })
    }

    /// Component ratios.
    pub fn components(&self) -> &[Arc<dyn PdfRatio>] {
        &self.ratios
    }
}

impl PdfRatio for MultiDimPdfRatio {
    fn kind(&self) -> PdfKind {
        PdfKind::MultiDim
    }

    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn required_fields(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for f in self.ratios.iter().flat_map(|r| r.required_fields()) {
            if !out.contains(&f) {
                out.push(f);
            }
        }
        out
    }

    fn evaluate(
        &self,
        events: &EventArray,
        source: &PointLikeSource,
        params: &SourceParams,
        out: &mut [f64],
    ) -> Result<()> {
        check_out_len(events, out)?;
        out.fill(1.0);
        let mut buf = vec![0.0; out.len()];
        for r in &self.ratios {
            r.evaluate(events, source, params, &mut buf)?;
            for (o, v) in out.iter_mut().zip(&buf) {
                *o *= v;
            }
        }
        Ok(())
    }

    fn gradient(
        &self,
        events: &EventArray,
        source: &PointLikeSource,
        params: &SourceParams,
        param: &str,
        out: &mut [f64],
    ) -> Result<()> {
        check_out_len(events, out)?;
        out.fill(0.0);
        let n = out.len();
        let values = self
            .ratios
            .iter()
            .map(|r| {
                let mut v = vec![0.0; n];
                r.evaluate(events, source, params, &mut v)?;
                Ok(v)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut term = vec![0.0; n];
        for (k, r) in self.ratios.iter().enumerate() {
            if !r.depends_on(param) {
                continue;
            }
            r.gradient(events, source, params, param, &mut term)?;
            for (l, v) in values.iter().enumerate() {
                if l != k {
                    for (t, x) in term.iter_mut().zip(v) {
                        *t *= x;
                    }
                }
            }
            for (o, t) in out.iter_mut().zip(&term) {
                *o += t;
            }
        }
        Ok(())
    }
}
