//! Applying prior models to the parameter table of a grid.
//!
//! Weights are always written back as float columns; rows are never
//! reordered. Priors that depend on the spacing of the grid (`flat_log`
//! ages, IMF mass weights) are evaluated on the distinct values of their
//! column, and for mass only within one isochrone (rows sharing age and
//! metallicity) at a time.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use crate::grid::{Column, GridBackend, GridError};
use crate::priors::{ConfigError, PriorConfig, PriorError, PriorModel};

/// Column the combined prior of [`apply_prior_config`] is written to
pub const PRIOR_WEIGHT: &str = "prior_weight";

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
    #[error("Prior error in column {column}: {source}")]
    Prior {
        column: String,
        #[source]
        source: PriorError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn prior_error(column: &str) -> impl FnOnce(PriorError) -> WeightError + '_ {
    move |source| WeightError::Prior {
        column: column.to_string(),
        source,
    }
}

/// Values of a parameter column as f64, alias aware.
fn numeric_values(
    backend: &mut dyn GridBackend,
    column: &str,
) -> Result<Array1<f64>, WeightError> {
    let values = backend.column(column)?;
    values.to_f64().ok_or_else(|| {
        WeightError::Grid(GridError::ColumnType {
            column: column.to_string(),
            expected: "numeric",
            found: values.type_name(),
        })
    })
}

/// Whether a column can be found by name or alias
fn has_column(backend: &mut dyn GridBackend, column: &str) -> Result<bool, WeightError> {
    match backend.resolve_column(column) {
        Ok(_) => Ok(true),
        Err(GridError::ColumnNotFound(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Evaluate a prior directly on every row of one column.
///
/// # Arguments
/// * `backend` - Grid to read from
/// * `column` - Column name or alias
/// * `model` - Prior to evaluate
///
/// # Returns
/// One weight per model, in row order
///
/// # Errors
/// * `GridError::ColumnNotFound` - no such column or alias
/// * `GridError::ColumnType` - the column holds text
pub fn apply_prior(
    backend: &mut dyn GridBackend,
    column: &str,
    model: &PriorModel,
) -> Result<Array1<f64>, WeightError> {
    let values = numeric_values(backend, column)?;
    model.weights(values.view()).map_err(prior_error(column))
}

/// Evaluate a prior on the distinct values of a column and map the result
/// back onto every row.
pub fn apply_prior_by_value(
    backend: &mut dyn GridBackend,
    column: &str,
    model: &PriorModel,
) -> Result<Array1<f64>, WeightError> {
    let values = numeric_values(backend, column)?;
    let rows: Vec<usize> = (0..values.len()).collect();
    let mut weights = Array1::zeros(values.len());
    weigh_distinct(&values, &rows, model, &mut weights).map_err(prior_error(column))?;
    Ok(weights)
}

/// Age prior evaluated on the distinct ages within each metallicity.
///
/// Without a metallicity column the whole grid is one group.
pub fn apply_age_prior(
    backend: &mut dyn GridBackend,
    age_column: &str,
    metallicity_column: &str,
    model: &PriorModel,
) -> Result<Array1<f64>, WeightError> {
    let ages = numeric_values(backend, age_column)?;
    let groups = group_columns(backend, &[metallicity_column], ages.len())?;

    let mut weights = Array1::zeros(ages.len());
    for rows in groups.values() {
        weigh_distinct(&ages, rows, model, &mut weights).map_err(prior_error(age_column))?;
    }
    Ok(weights)
}

/// Mass prior evaluated along one isochrone at a time.
///
/// Rows sharing the same values of every column in `isochrone_columns`
/// (typically age and metallicity) form one group; the IMF weights of each
/// group are computed from the distinct masses of that group only. Group
/// columns missing from the grid are ignored.
pub fn apply_mass_prior_per_isochrone(
    backend: &mut dyn GridBackend,
    mass_column: &str,
    isochrone_columns: &[&str],
    model: &PriorModel,
) -> Result<Array1<f64>, WeightError> {
    let masses = numeric_values(backend, mass_column)?;
    let groups = group_columns(backend, isochrone_columns, masses.len())?;
    log::debug!(
        "Weighting {} masses in {} isochrone(s)",
        masses.len(),
        groups.len()
    );

    let mut weights = Array1::zeros(masses.len());
    for rows in groups.values() {
        weigh_distinct(&masses, rows, model, &mut weights).map_err(prior_error(mass_column))?;
    }
    Ok(weights)
}

/// Multiply weights into a float column, creating it first (all ones) if
/// it does not exist.
///
/// # Errors
/// * `GridError::LengthMismatch` - one weight per model is required
/// * `GridError::ColumnType` - the existing column is not a float column
pub fn multiply_weights(
    backend: &mut dyn GridBackend,
    weight_column: &str,
    weights: ArrayView1<f64>,
) -> Result<(), WeightError> {
    let table = backend.grid_mut()?;
    if weights.len() != table.len() {
        return Err(GridError::LengthMismatch {
            what: format!("weights for {weight_column}"),
            expected: table.len(),
            found: weights.len(),
        }
        .into());
    }

    match table.column_mut(weight_column) {
        Some(Column::Float(existing)) => *existing *= &weights,
        Some(other) => {
            return Err(GridError::ColumnType {
                column: weight_column.to_string(),
                expected: "float",
                found: other.type_name(),
            }
            .into())
        }
        None => {
            let mut column = Array1::ones(weights.len());
            column *= &weights;
            table.add_column(weight_column, Column::Float(column))?;
        }
    }
    Ok(())
}

/// Apply every prior of a configuration into [`PRIOR_WEIGHT`].
///
/// Ages are weighted within each metallicity, masses along each
/// isochrone, metallicity and distance on their distinct values and dust
/// parameters pointwise. Quantities without a prior are skipped.
///
/// # Returns
/// The combined weights, also stored in the `prior_weight` column
pub fn apply_prior_config(
    backend: &mut dyn GridBackend,
    config: &PriorConfig,
) -> Result<Array1<f64>, WeightError> {
    let plan = config.validate()?;
    let nrows = backend.len()?;
    let cols = &config.columns;

    let mut steps: Vec<(&str, &PriorModel, Array1<f64>)> = Vec::new();
    if let Some((column, model)) = &plan.age {
        let weights = apply_age_prior(backend, column, &cols.metallicity, model)?;
        steps.push((column.as_str(), model, weights));
    }
    if let Some((column, model)) = &plan.mass {
        let weights = apply_mass_prior_per_isochrone(
            backend,
            column,
            &[cols.age.as_str(), cols.metallicity.as_str()],
            model,
        )?;
        steps.push((column.as_str(), model, weights));
    }
    for (column, model) in [&plan.metallicity, &plan.distance].into_iter().flatten() {
        let weights = apply_prior_by_value(backend, column, model)?;
        steps.push((column.as_str(), model, weights));
    }
    for (column, model) in &plan.dust {
        let weights = apply_prior(backend, column, model)?;
        steps.push((column.as_str(), model, weights));
    }

    let mut total = Array1::ones(nrows);
    for (column, model, weights) in &steps {
        log::info!(
            "Applied {} {} prior on {column} to {} models",
            model.quantity(),
            model.kind(),
            weights.len()
        );
        total *= weights;
    }

    if let Some(existing) = backend.grid_mut()?.column_mut(PRIOR_WEIGHT) {
        log::warn!("Replacing existing {PRIOR_WEIGHT} column");
        *existing = Column::Float(Array1::ones(nrows));
    }
    multiply_weights(backend, PRIOR_WEIGHT, total.view())?;
    Ok(total)
}

/// Row groups keyed by the values of the given columns.
///
/// Columns that do not exist are skipped; with none left every row is in a
/// single group.
fn group_columns(
    backend: &mut dyn GridBackend,
    columns: &[&str],
    nrows: usize,
) -> Result<BTreeMap<Vec<u64>, Vec<usize>>, WeightError> {
    let mut keys: Vec<Array1<f64>> = Vec::new();
    for &column in columns {
        if has_column(backend, column)? {
            keys.push(numeric_values(backend, column)?);
        } else {
            log::debug!("Grouping column {column} not in grid, skipped");
        }
    }

    let mut groups: BTreeMap<Vec<u64>, Vec<usize>> = BTreeMap::new();
    for row in 0..nrows {
        // +0.0 folds -0.0 into 0.0
        let key = keys.iter().map(|k| (k[row] + 0.0).to_bits()).collect();
        groups.entry(key).or_default().push(row);
    }
    Ok(groups)
}

/// Weigh the distinct values of `values[rows]` and scatter the result to
/// those rows of `out`.
fn weigh_distinct(
    values: &Array1<f64>,
    rows: &[usize],
    model: &PriorModel,
    out: &mut Array1<f64>,
) -> Result<(), PriorError> {
    let mut distinct: Vec<f64> = rows.iter().map(|&i| values[i]).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);

    let weights = model.weights(ArrayView1::from(&distinct[..]))?;
    for &row in rows {
        if let Ok(pos) = distinct.binary_search_by(|candidate| candidate.total_cmp(&values[row])) {
            out[row] = weights[pos];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{MemoryBackend, ParamTable};
    use crate::priors::{PriorSpec, Quantity};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn backend(table: ParamTable) -> MemoryBackend {
        let n = table.len();
        MemoryBackend::from_arrays(
            array![1.0, 2.0],
            Some(Array2::ones((n, 2))),
            Some(table),
            None,
            None,
        )
        .unwrap()
    }

    fn isochrone_grid() -> MemoryBackend {
        let table = ParamTable::new()
            .with_column("logA", Column::Float(array![6.0, 6.0, 6.0, 7.0, 7.0, 7.0]))
            .unwrap()
            .with_column("M_ini", Column::Float(array![1.0, 2.0, 4.0, 1.0, 2.0, 4.0]))
            .unwrap()
            .with_column("Z", Column::Float(Array1::from_elem(6, 0.02)))
            .unwrap()
            .with_column("Av", Column::Float(array![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]))
            .unwrap()
            .with_column("label", Column::Str(vec!["a".to_string(); 6]))
            .unwrap();
        backend(table)
    }

    #[test]
    fn test_apply_prior_text_column() {
        let mut grid = isochrone_grid();
        let model = PriorModel::dust(PriorSpec::flat()).unwrap();
        assert!(matches!(
            apply_prior(&mut grid, "label", &model),
            Err(WeightError::Grid(GridError::ColumnType { .. }))
        ));
        assert!(matches!(
            apply_prior(&mut grid, "nope", &model),
            Err(WeightError::Grid(GridError::ColumnNotFound(_)))
        ));
    }

    #[test]
    fn test_apply_prior_via_alias() {
        let mut aliases = crate::grid::Aliases::new();
        aliases.insert("A_V".to_string(), "Av".to_string());
        let mut grid = isochrone_grid().with_aliases(&aliases);

        let model = PriorModel::dust(PriorSpec::Exponential { tau: 1.0 }).unwrap();
        let weights = apply_prior(&mut grid, "A_V", &model).unwrap();
        assert_relative_eq!(weights[1], (-1.0f64).exp(), epsilon = 1e-12);
        assert_eq!(weights[0], 1.0);
    }

    #[test]
    fn test_mass_weights_per_isochrone() {
        let mut grid = isochrone_grid();
        let model = PriorModel::new(PriorSpec::Salpeter, Quantity::Mass).unwrap();
        let weights =
            apply_mass_prior_per_isochrone(&mut grid, "M_ini", &["logA", "Z"], &model).unwrap();

        // Both isochrones have the same masses, so the same weights
        for i in 0..3 {
            assert_relative_eq!(weights[i], weights[i + 3], epsilon = 1e-12);
        }
        let first = weights.slice(ndarray::s![0..3]);
        assert_relative_eq!(first.mean().unwrap(), 1.0, epsilon = 1e-12);
        assert!(weights[0] > weights[2]);
    }

    #[test]
    fn test_missing_group_column_is_ignored() {
        let mut grid = isochrone_grid();
        let model = PriorModel::mass(PriorSpec::Kroupa).unwrap();
        let weights =
            apply_mass_prior_per_isochrone(&mut grid, "M_ini", &["logA", "feh"], &model).unwrap();
        assert_eq!(weights.len(), 6);
    }

    #[test]
    fn test_age_prior_on_distinct_ages() {
        let mut grid = isochrone_grid();
        let model = PriorModel::age(PriorSpec::FlatLog).unwrap();
        let weights = apply_age_prior(&mut grid, "logA", "Z", &model).unwrap();

        // Two distinct ages; the younger one covers the narrower linear bin
        assert_eq!(weights[0], weights[1]);
        assert_eq!(weights[3], weights[5]);
        assert_relative_eq!(weights[0] + weights[3], 1.0, epsilon = 1e-12);
        assert!(weights[0] > weights[3]);
    }

    #[test]
    fn test_multiply_weights_creates_and_multiplies() {
        let mut grid = isochrone_grid();
        multiply_weights(&mut grid, "weight", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0].view())
            .unwrap();
        multiply_weights(&mut grid, "weight", Array1::from_elem(6, 2.0).view()).unwrap();

        let weight = grid.grid().unwrap().numeric_column("weight").unwrap();
        assert_eq!(weight, array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);

        assert!(matches!(
            multiply_weights(&mut grid, "label", Array1::from_elem(6, 1.0).view()),
            Err(WeightError::Grid(GridError::ColumnType { .. }))
        ));
        assert!(matches!(
            multiply_weights(&mut grid, "weight", Array1::from_elem(2, 1.0).view()),
            Err(WeightError::Grid(GridError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_apply_prior_config() {
        let mut grid = isochrone_grid();
        let config = PriorConfig::from_json_str(
            r#"{"mass": {"name": "kroupa"},
                "met": {"name": "flat"},
                "av": {"name": "flat", "amp": 0.5}}"#,
        )
        .unwrap();

        let total = apply_prior_config(&mut grid, &config).unwrap();
        let stored = grid.grid().unwrap().numeric_column(PRIOR_WEIGHT).unwrap();
        assert_eq!(total, stored);
        assert_relative_eq!(total.mean().unwrap(), 0.5, epsilon = 1e-12);

        // Applying again replaces the column rather than compounding it
        let again = apply_prior_config(&mut grid, &config).unwrap();
        let stored = grid.grid().unwrap().numeric_column(PRIOR_WEIGHT).unwrap();
        assert_eq!(again, stored);
        assert_eq!(total, stored);
    }

    #[test]
    fn test_apply_prior_config_missing_column() {
        let mut grid = isochrone_grid();
        let config = PriorConfig::from_json_str(r#"{"distance": {"name": "flat"}}"#).unwrap();
        assert!(matches!(
            apply_prior_config(&mut grid, &config),
            Err(WeightError::Grid(GridError::ColumnNotFound(_)))
        ));
    }
}
