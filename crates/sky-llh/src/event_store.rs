//! Columnar event storage for trial data.

use sky_core::{Error, Result};
use std::collections::HashMap;

/// Columnar event array (Structure-of-Arrays / SoA) with named `f64` columns.
///
/// All columns have the same length. Column order is the insertion order and is
/// preserved by every transformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventArray {
    n_events: usize,
    column_names: Vec<String>,
    columns: Vec<Vec<f64>>,
    name_to_index: HashMap<String, usize>,
}

impl EventArray {
    /// Create an [`EventArray`] from already materialized columns.
    pub fn from_columns(columns: impl IntoIterator<Item = (String, Vec<f64>)>) -> Result<Self> {
        let mut out = Self::default();
        let mut n_events: Option<usize> = None;
        for (name, col) in columns {
            if out.name_to_index.contains_key(&name) {
                return Err(Error::Validation(format!("duplicate event column '{name}'")));
            }
            match n_events {
                Some(ne) if ne != col.len() => {
                    return Err(Error::Validation(format!(
                        "column length mismatch for '{name}': expected {ne}, got {}",
                        col.len()
                    )));
                }
                Some(_) => {}
                None => n_events = Some(col.len()),
            }
            out.name_to_index.insert(name.clone(), out.columns.len());
            out.column_names.push(name);
            out.columns.push(col);
        }
        out.n_events = n_events.unwrap_or(0);
        Ok(out)
    }

    /// Zero-length array with the given columns.
    pub fn empty<S: AsRef<str>>(column_names: &[S]) -> Result<Self> {
        Self::from_columns(column_names.iter().map(|n| (n.as_ref().to_string(), Vec::new())))
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Alias of [`EventArray::n_events`].
    pub fn len(&self) -> usize {
        self.n_events
    }

    /// Whether the array holds no events.
    pub fn is_empty(&self) -> bool {
        self.n_events == 0
    }

    /// Names of stored columns (stable order).
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.name_to_index.get(name).copied()?;
        self.columns.get(idx).map(|c| c.as_slice())
    }

    /// Get a column by name, failing with a validation error if it is missing.
    pub fn require_column(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| Error::Validation(format!("missing event column '{name}'")))
    }

    /// Fail unless every named column exists.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for n in names {
            self.require_column(n.as_ref())?;
        }
        Ok(())
    }

    /// Insert or replace a column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && values.len() != self.n_events {
            return Err(Error::Validation(format!(
                "column '{name}' has length {}, expected {}",
                values.len(),
                self.n_events
            )));
        }
        if self.columns.is_empty() {
            self.n_events = values.len();
        }
        match self.name_to_index.get(&name) {
            Some(&idx) => self.columns[idx] = values,
            None => {
                self.name_to_index.insert(name.clone(), self.columns.len());
                self.column_names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// New array holding the rows at `indices` (repetitions allowed).
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_events) {
            return Err(Error::Validation(format!(
                "event index {bad} out of range for {} events",
                self.n_events
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| indices.iter().map(|&i| c[i]).collect::<Vec<f64>>())
            .collect();
        Ok(Self {
            n_events: indices.len(),
            column_names: self.column_names.clone(),
            columns,
            name_to_index: self.name_to_index.clone(),
        })
    }

    /// New array holding the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_events {
            return Err(Error::Validation(format!(
                "mask length {} does not match {} events",
                mask.len(),
                self.n_events
            )));
        }
        let indices: Vec<usize> =
            mask.iter().enumerate().filter_map(|(i, &keep)| keep.then_some(i)).collect();
        self.select(&indices)
    }

    /// Append the rows of `other`, which must carry the same set of columns.
    pub fn append(&mut self, other: &EventArray) -> Result<()> {
        if other.column_names.len() != self.column_names.len()
            || other.column_names.iter().any(|n| !self.has_column(n))
        {
            return Err(Error::Validation(format!(
                "cannot append events with columns {:?} to events with columns {:?}",
                other.column_names, self.column_names
            )));
        }
        for (name, col) in other.column_names.iter().zip(&other.columns) {
            let idx = self.name_to_index[name];
            self.columns[idx].extend_from_slice(col);
        }
        self.n_events += other.n_events;
        Ok(())
    }

    /// New array with only the named columns, in the given order.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let cols = names
            .iter()
            .map(|n| Ok((n.as_ref().to_string(), self.require_column(n.as_ref())?.to_vec())))
            .collect::<Result<Vec<_>>>()?;
        let mut out = Self::from_columns(cols)?;
        out.n_events = self.n_events;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventArray {
        EventArray::from_columns(vec![
            ("ra".to_string(), vec![0.1, 0.2, 0.3]),
            ("dec".to_string(), vec![-0.5, 0.0, 0.5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_validates_lengths() {
        let err = EventArray::from_columns(vec![
            ("a".to_string(), vec![1.0]),
            ("b".to_string(), vec![1.0, 2.0]),
        ]);
        assert!(err.is_err());
        let dup = EventArray::from_columns(vec![
            ("a".to_string(), vec![1.0]),
            ("a".to_string(), vec![1.0]),
        ]);
        assert!(dup.is_err());
    }

    #[test]
    fn test_select_filter_project() {
        let ev = sample();
        assert_eq!(ev.n_events(), 3);

        let sel = ev.select(&[2, 0, 2]).unwrap();
        assert_eq!(sel.column("ra").unwrap(), &[0.3, 0.1, 0.3]);
        assert!(ev.select(&[3]).is_err());

        let f = ev.filter(&[true, false, true]).unwrap();
        assert_eq!(f.column("dec").unwrap(), &[-0.5, 0.5]);

        let p = ev.project(&["dec"]).unwrap();
        assert_eq!(p.column_names(), &["dec".to_string()]);
        assert!(ev.project(&["missing"]).is_err());
    }

    #[test]
    fn test_append_requires_same_columns() {
        let mut a = sample();
        let b = sample().project(&["dec", "ra"]).unwrap();
        a.append(&b).unwrap();
        assert_eq!(a.n_events(), 6);
        assert_eq!(a.column("ra").unwrap()[3], 0.1);

        let c = sample().project(&["ra"]).unwrap();
        assert!(a.append(&c).is_err());
    }

    #[test]
    fn test_set_column() {
        let mut ev = sample();
        ev.set_column("sin_dec", vec![0.0; 3]).unwrap();
        assert!(ev.has_column("sin_dec"));
        assert!(ev.set_column("bad", vec![0.0; 2]).is_err());

        let mut empty = EventArray::default();
        empty.set_column("x", vec![1.0, 2.0]).unwrap();
        assert_eq!(empty.n_events(), 2);
    }
}
