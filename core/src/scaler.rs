//! Standardization fitted on the training partition.
//!
//! RULE: fit() only ever sees training rows. The fitted parameters
//! are applied unchanged to every later matrix, test rows included.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Matrix columns this scaler touches; all others pass through.
    columns: Vec<usize>,
    mean: Vec<f64>,
    /// Population std per column, 1.0 where the column is constant.
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>, columns: &[usize]) -> Self {
        let mut mean = Vec::with_capacity(columns.len());
        let mut scale = Vec::with_capacity(columns.len());
        for &c in columns {
            let column = x.index_axis(Axis(1), c);
            mean.push(column.mean().unwrap_or(0.0));
            let std = column.std(0.0);
            scale.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }
        Self {
            columns: columns.to_vec(),
            mean,
            scale,
        }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for ((&c, &mean), &scale) in self.columns.iter().zip(&self.mean).zip(&self.scale) {
            out.column_mut(c).mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn fitted_columns_have_zero_mean_unit_variance() {
        let x = array![[1.0, 10.0, 1.0], [2.0, 20.0, 0.0], [3.0, 60.0, 1.0], [6.0, 30.0, 0.0]];
        let scaler = StandardScaler::fit(&x, &[0, 1]);
        let z = scaler.transform(&x);

        for c in 0..2 {
            let col = z.column(c);
            assert!(col.mean().unwrap().abs() < 1e-12);
            assert!((col.var(0.0) - 1.0).abs() < 1e-12);
        }
        // Untouched column.
        assert_eq!(z.column(2), x.column(2));
    }

    #[test]
    fn constant_column_is_centered_not_divided_by_zero() {
        let x = array![[5.0], [5.0], [5.0]];
        let scaler = StandardScaler::fit(&x, &[0]);
        assert_eq!(scaler.scale(), &[1.0]);
        assert!(scaler.transform(&x).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn second_matrix_reuses_fitted_parameters() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0], [6.0]];
        let scaler = StandardScaler::fit(&train, &[0]);
        let z = scaler.transform(&test);
        // mean 1, std 1 from train.
        assert_eq!(z, array![[3.0], [5.0]]);
        assert!(z.column(0).mean().unwrap() != 0.0);
    }
}
