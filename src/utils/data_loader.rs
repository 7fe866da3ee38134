//! Data loading utilities

use crate::error::{ScreeningError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// CSV loader
pub struct DataLoader {
    /// Rows used for schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self { infer_schema_length: 1000 }
    }

    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n.max(1);
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        if !path.exists() {
            return Err(ScreeningError::DataError(format!(
                "data file not found: {}",
                path.display()
            )));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        info!(path = %path.display(), rows = df.height(), cols = df.width(), "dataset loaded");
        Ok(df)
    }
}

/// Numeric design matrix split off a DataFrame
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    /// Every column except `target` becomes a feature, in frame order.
    /// Feature nulls become NaN; a null target is an error.
    pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<Self> {
        let target_series = df
            .column(target)
            .map_err(|_| ScreeningError::FeatureNotFound(target.to_string()))?;
        let y = Array1::from_vec(column_values(target_series)?);
        if y.iter().any(|v| v.is_nan()) {
            return Err(ScreeningError::DataError(format!(
                "dependent column {} has missing values",
                target
            )));
        }

        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|s| s.to_string())
            .collect();
        if feature_names.is_empty() {
            return Err(ScreeningError::DataError("no feature columns".to_string()));
        }

        let x = columns_to_array2(df, &feature_names)?;
        Ok(Self { x, y, feature_names })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn feature_index(&self, name: &str) -> Result<usize> {
        self.feature_names
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| ScreeningError::FeatureNotFound(name.to_string()))
    }

    /// Rows selected by `indices`, same feature names
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}

fn column_values(series: &Series) -> Result<Vec<f64>> {
    let series_f64 = series
        .cast(&DataType::Float64)
        .map_err(|e| ScreeningError::DataError(e.to_string()))?;
    Ok(series_f64
        .f64()
        .map_err(|e| ScreeningError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Extract named columns into a row-major `Array2<f64>`
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            let series = df
                .column(name)
                .map_err(|_| ScreeningError::FeatureNotFound(name.clone()))?;
            column_values(series)
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((df.height(), col_names.len()), |(r, c)| col_data[c][r]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "A,Y,SEP").unwrap();
        writeln!(file, "1,10.5,3").unwrap();
        writeln!(file, ",20.0,4").unwrap();
        writeln!(file, "3,30.5,5").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_csv();
        let df = DataLoader::new().load_csv(file.path()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_missing_file() {
        let result = DataLoader::new().load_csv(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(ScreeningError::DataError(_))));
    }

    #[test]
    fn test_feature_matrix_drops_target_and_keeps_nan() {
        let file = create_test_csv();
        let df = DataLoader::new().load_csv(file.path()).unwrap();
        let data = FeatureMatrix::from_dataframe(&df, "Y").unwrap();

        assert_eq!(data.feature_names, vec!["A".to_string(), "SEP".to_string()]);
        assert_eq!(data.y.to_vec(), vec![10.5, 20.0, 30.5]);
        assert!(data.x[[1, 0]].is_nan());
        assert_eq!(data.x[[2, 1]], 5.0);
        assert_eq!(data.feature_index("SEP").unwrap(), 1);
    }

    #[test]
    fn test_missing_target() {
        let df = df!("A" => &[1.0, 2.0]).unwrap();
        assert!(matches!(
            FeatureMatrix::from_dataframe(&df, "Y"),
            Err(ScreeningError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_select_rows() {
        let df = df!("A" => &[1.0, 2.0, 3.0], "Y" => &[4.0, 5.0, 6.0]).unwrap();
        let data = FeatureMatrix::from_dataframe(&df, "Y").unwrap().select_rows(&[2, 0]);
        assert_eq!(data.x.column(0).to_vec(), vec![3.0, 1.0]);
        assert_eq!(data.y.to_vec(), vec![6.0, 4.0]);
    }
}
