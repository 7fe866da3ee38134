//! Min-max normalisation, score combination and the ranked output table

use crate::error::{ScreeningError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;

/// Added to the normalisation range so a constant column maps to 0
pub const NORM_EPSILON: f64 = 1e-12;

/// Output columns, in order
pub const COLUMNS: [&str; 8] = [
    "rank_order",
    "feature",
    "interaction_with",
    "pdp_cross_mixed_deriv",
    "shap_pair_interaction_mean_abs",
    "pdp_cross_mixed_deriv_norm01",
    "shap_pair_interaction_mean_abs_norm01",
    "interaction_score_combined",
];

/// How the two normalised scores are averaged when one is undefined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinePolicy {
    /// Average the defined scores; undefined only when both are
    #[default]
    SkipUndefined,
    /// Any undefined score makes the combined score undefined
    Propagate,
}

impl CombinePolicy {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match (self, a.is_nan(), b.is_nan()) {
            (_, false, false) => (a + b) / 2.0,
            (CombinePolicy::Propagate, _, _) => f64::NAN,
            (CombinePolicy::SkipUndefined, true, false) => b,
            (CombinePolicy::SkipUndefined, false, true) => a,
            (CombinePolicy::SkipUndefined, true, true) => f64::NAN,
        }
    }
}

impl std::str::FromStr for CombinePolicy {
    type Err = ScreeningError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip_undefined" | "skip" => Ok(CombinePolicy::SkipUndefined),
            "propagate" => Ok(CombinePolicy::Propagate),
            other => Err(ScreeningError::InvalidParameter {
                name: "combine_policy".to_string(),
                value: other.to_string(),
                reason: "expected skip_undefined or propagate".to_string(),
            }),
        }
    }
}

/// One candidate feature scored against the interaction feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// 1-based position in the input feature order
    pub rank_order: usize,
    pub feature: String,
    pub interaction_with: String,
    pub pdp_cross_mixed_deriv: f64,
    pub shap_pair_interaction_mean_abs: f64,
    pub pdp_cross_mixed_deriv_norm01: f64,
    pub shap_pair_interaction_mean_abs_norm01: f64,
    pub interaction_score_combined: f64,
}

impl FeatureRecord {
    /// Record with raw scores only; derived fields stay undefined until ranking
    pub fn new(
        rank_order: usize,
        feature: impl Into<String>,
        interaction_with: impl Into<String>,
        pdp_cross_mixed_deriv: f64,
        shap_pair_interaction_mean_abs: f64,
    ) -> Self {
        Self {
            rank_order,
            feature: feature.into(),
            interaction_with: interaction_with.into(),
            pdp_cross_mixed_deriv,
            shap_pair_interaction_mean_abs,
            pdp_cross_mixed_deriv_norm01: f64::NAN,
            shap_pair_interaction_mean_abs_norm01: f64::NAN,
            interaction_score_combined: f64::NAN,
        }
    }
}

/// `(v - min) / (max - min + eps)` over the defined values. NaN stays NaN and
/// a column without any defined value comes back entirely NaN.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if min > max {
        return vec![f64::NAN; values.len()];
    }
    let range = max - min + NORM_EPSILON;
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Descending by combined score, undefined scores last; ties keep input order
fn by_combined_desc(a: &FeatureRecord, b: &FeatureRecord) -> Ordering {
    let (x, y) = (a.interaction_score_combined, b.interaction_score_combined);
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
    }
}

/// Feature records sorted by combined interaction score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTable {
    records: Vec<FeatureRecord>,
}

impl RankedTable {
    /// Normalise both raw columns, combine them under `policy` and sort
    pub fn rank(mut records: Vec<FeatureRecord>, policy: CombinePolicy) -> Self {
        let pdp: Vec<f64> = records.iter().map(|r| r.pdp_cross_mixed_deriv).collect();
        let shap: Vec<f64> = records.iter().map(|r| r.shap_pair_interaction_mean_abs).collect();
        let pdp_norm = min_max_normalize(&pdp);
        let shap_norm = min_max_normalize(&shap);

        for ((record, p), s) in records.iter_mut().zip(pdp_norm).zip(shap_norm) {
            record.pdp_cross_mixed_deriv_norm01 = p;
            record.shap_pair_interaction_mean_abs_norm01 = s;
            record.interaction_score_combined = policy.combine(p, s);
        }

        // `sort_by` is stable
        records.sort_by(by_combined_desc);
        Self { records }
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First `k` rows (fewer when the table is shorter)
    pub fn top(&self, k: usize) -> &[FeatureRecord] {
        &self.records[..k.min(self.records.len())]
    }

    /// Table as a DataFrame; undefined scores become nulls
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let float = |f: fn(&FeatureRecord) -> f64| -> Vec<Option<f64>> {
            self.records
                .iter()
                .map(|r| Some(f(r)).filter(|v| !v.is_nan()))
                .collect()
        };

        let df = df!(
            COLUMNS[0] => self.records.iter().map(|r| r.rank_order as i64).collect::<Vec<_>>(),
            COLUMNS[1] => self.records.iter().map(|r| r.feature.clone()).collect::<Vec<_>>(),
            COLUMNS[2] => self.records.iter().map(|r| r.interaction_with.clone()).collect::<Vec<_>>(),
            COLUMNS[3] => float(|r| r.pdp_cross_mixed_deriv),
            COLUMNS[4] => float(|r| r.shap_pair_interaction_mean_abs),
            COLUMNS[5] => float(|r| r.pdp_cross_mixed_deriv_norm01),
            COLUMNS[6] => float(|r| r.shap_pair_interaction_mean_abs_norm01),
            COLUMNS[7] => float(|r| r.interaction_score_combined)
        )?;
        Ok(df)
    }

    /// Write as UTF-8 CSV with a byte-order mark and a header row
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_bom(true)
            .include_header(true)
            .finish(&mut df)?;
        Ok(())
    }

    /// Read a table written by [`RankedTable::write_csv`], keeping its row order
    pub fn read_csv(path: &Path) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        Self::from_dataframe(&df)
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let ranks = int_column(df, COLUMNS[0])?;
        let features = str_column(df, COLUMNS[1])?;
        let with = str_column(df, COLUMNS[2])?;
        let floats: Vec<Vec<f64>> = COLUMNS[3..]
            .iter()
            .map(|name| float_column(df, name))
            .collect::<Result<_>>()?;

        let records = (0..df.height())
            .map(|i| FeatureRecord {
                rank_order: ranks[i],
                feature: features[i].clone(),
                interaction_with: with[i].clone(),
                pdp_cross_mixed_deriv: floats[0][i],
                shap_pair_interaction_mean_abs: floats[1][i],
                pdp_cross_mixed_deriv_norm01: floats[2][i],
                shap_pair_interaction_mean_abs_norm01: floats[3][i],
                interaction_score_combined: floats[4][i],
            })
            .collect();

        Ok(Self { records })
    }
}

/// Column lookup that tolerates a leading byte-order mark on the header
fn find_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.get_columns()
        .iter()
        .find(|s| s.name().trim_start_matches('\u{feff}') == name)
        .ok_or_else(|| ScreeningError::FeatureNotFound(name.to_string()))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = find_column(df, name)?.cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<usize>> {
    let series = find_column(df, name)?.cast(&DataType::Int64)?;
    series
        .i64()?
        .into_iter()
        .map(|v| match v {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(ScreeningError::DataError(format!("invalid {} value {:?}", name, v))),
        })
        .collect()
}

fn str_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = find_column(df, name)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(pdp: &[f64], shap: &[f64]) -> Vec<FeatureRecord> {
        pdp.iter()
            .zip(shap)
            .enumerate()
            .map(|(i, (&p, &s))| FeatureRecord::new(i + 1, format!("f{}", i + 1), "SEP", p, s))
            .collect()
    }

    #[test]
    fn test_min_max_normalize() {
        let norm = min_max_normalize(&[1.0, 3.0, f64::NAN, 2.0]);
        assert!(norm[0].abs() < 1e-9);
        assert!((norm[1] - 1.0).abs() < 1e-9);
        assert!(norm[2].is_nan());
        assert!((norm[3] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_constant_column_normalizes_to_zero() {
        assert_eq!(min_max_normalize(&[4.0, 4.0, 4.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_all_undefined_column_stays_undefined() {
        assert!(min_max_normalize(&[f64::NAN, f64::NAN]).iter().all(|v| v.is_nan()));
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_combine_policies() {
        assert_eq!(CombinePolicy::SkipUndefined.combine(0.2, 0.6), 0.4);
        assert_eq!(CombinePolicy::SkipUndefined.combine(f64::NAN, 0.6), 0.6);
        assert!(CombinePolicy::SkipUndefined.combine(f64::NAN, f64::NAN).is_nan());
        assert_eq!(CombinePolicy::Propagate.combine(0.2, 0.6), 0.4);
        assert!(CombinePolicy::Propagate.combine(0.2, f64::NAN).is_nan());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("propagate".parse::<CombinePolicy>().unwrap(), CombinePolicy::Propagate);
        assert_eq!("skip_undefined".parse::<CombinePolicy>().unwrap(), CombinePolicy::SkipUndefined);
        assert!("mean".parse::<CombinePolicy>().is_err());
    }

    #[test]
    fn test_rank_orders_by_combined_score() {
        let table = RankedTable::rank(records(&[0.0, 2.0, 1.0], &[0.0, 4.0, 2.0]), CombinePolicy::default());
        let order: Vec<usize> = table.records().iter().map(|r| r.rank_order).collect();
        assert_eq!(order, vec![2, 3, 1]);

        let top = &table.records()[0];
        assert!((top.interaction_score_combined - 1.0).abs() < 1e-9);
        for r in table.records() {
            assert!((0.0..=1.0).contains(&r.pdp_cross_mixed_deriv_norm01));
            assert!((0.0..=1.0).contains(&r.shap_pair_interaction_mean_abs_norm01));
        }
    }

    #[test]
    fn test_rank_is_stable_and_puts_undefined_last() {
        let table = RankedTable::rank(
            records(&[f64::NAN, 1.0, 1.0, f64::NAN], &[f64::NAN, 1.0, 1.0, f64::NAN]),
            CombinePolicy::SkipUndefined,
        );
        let order: Vec<usize> = table.records().iter().map(|r| r.rank_order).collect();
        assert_eq!(order, vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_skip_undefined_uses_defined_score() {
        let table = RankedTable::rank(
            records(&[0.0, 1.0], &[f64::NAN, f64::NAN]),
            CombinePolicy::SkipUndefined,
        );
        let top = &table.records()[0];
        assert_eq!(top.rank_order, 2);
        assert!((top.interaction_score_combined - top.pdp_cross_mixed_deriv_norm01).abs() < 1e-12);
        assert!(top.shap_pair_interaction_mean_abs_norm01.is_nan());

        let propagated = RankedTable::rank(records(&[0.0, 1.0], &[f64::NAN, f64::NAN]), CombinePolicy::Propagate);
        assert!(propagated.records().iter().all(|r| r.interaction_score_combined.is_nan()));
    }

    #[test]
    fn test_top_is_bounded() {
        let table = RankedTable::rank(records(&[1.0, 2.0], &[1.0, 2.0]), CombinePolicy::default());
        assert_eq!(table.top(10).len(), 2);
        assert_eq!(table.top(1)[0].feature, "f2");
    }

    #[test]
    fn test_to_dataframe_columns() {
        let table = RankedTable::rank(records(&[1.0, f64::NAN], &[1.0, 2.0]), CombinePolicy::default());
        let df = table.to_dataframe().unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(df.column("pdp_cross_mixed_deriv").unwrap().null_count(), 1);
    }
}
