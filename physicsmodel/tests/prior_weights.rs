//! Prior weights applied to grids loaded from disk.

use approx::assert_relative_eq;
use ndarray::{array, Array1};
use physicsmodel::algo::compute_bin_boundaries;
use physicsmodel::grid::{
    CacheBackend, Column, DiskBackend, GridBackend, MemoryBackend, ParamTable,
};
use physicsmodel::priors::{PriorConfig, PriorError, PriorModel, PriorSpec, Quantity};
use physicsmodel::weights::{
    apply_mass_prior_per_isochrone, apply_prior, apply_prior_config, multiply_weights,
    PRIOR_WEIGHT,
};
use tempfile::TempDir;
use test_helpers::{isochrone_columns, synthetic_lamb, synthetic_seds, unique_output_path};

const MASSES: [f64; 4] = [0.3, 0.8, 2.0, 6.0];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three ages x four masses x two metallicities, with a dust column
fn isochrone_grid() -> MemoryBackend {
    let (ages, masses, z) = isochrone_columns(&[6.0, 7.0, 8.0], &MASSES, &[0.004, 0.019]);
    let n = ages.len();
    let av: Array1<f64> = (0..n).map(|i| (i % 3) as f64 * 0.5).collect();
    let lamb = synthetic_lamb(2);
    let seds = synthetic_seds(n, &lamb);

    let table = ParamTable::new()
        .with_column("logA", Column::Float(ages))
        .unwrap()
        .with_column("M_ini", Column::Float(masses))
        .unwrap()
        .with_column("Z", Column::Float(z))
        .unwrap()
        .with_column("Av", Column::Float(av))
        .unwrap();
    MemoryBackend::from_arrays(lamb, Some(seds), Some(table), None, None).unwrap()
}

const CONFIG: &str = r#"{
    "age": {"name": "flat_log"},
    "mass": {"name": "kroupa"},
    "met": {"name": "flat"},
    "av": {"name": "lognormal", "mean": 0.5, "sigma": 0.5}
}"#;

#[test]
fn test_bin_boundaries_follow_input_order() {
    let ascending = compute_bin_boundaries(array![1.0, 2.0, 4.0].view()).unwrap();
    assert_eq!(ascending, array![0.5, 1.5, 3.0, 5.0]);

    let descending = compute_bin_boundaries(array![4.0, 2.0, 1.0].view()).unwrap();
    assert_eq!(descending, array![5.0, 3.0, 1.5, 0.5]);
    assert!(compute_bin_boundaries(array![1.0].view()).is_err());
}

#[test]
fn test_mass_prior_normalized_per_isochrone() {
    let mut grid = isochrone_grid();
    let model = PriorModel::new(PriorSpec::Kroupa, Quantity::Mass).unwrap();
    let weights =
        apply_mass_prior_per_isochrone(&mut grid, "M_ini", &["logA", "Z"], &model).unwrap();

    assert_eq!(weights.len(), 24);
    for isochrone in weights.exact_chunks(MASSES.len()) {
        assert_relative_eq!(isochrone.mean().unwrap(), 1.0, epsilon = 1e-10);
        // Low masses are more common
        assert!(isochrone[0] > isochrone[3]);
    }
}

#[test]
fn test_mass_rejects_lognormal_but_dust_accepts_it() {
    let spec = PriorSpec::Lognormal {
        mean: 1.0,
        sigma: 0.3,
    };
    assert!(matches!(
        PriorModel::new(spec.clone(), Quantity::Mass),
        Err(PriorError::NotAllowed { .. })
    ));
    let dust = PriorModel::new(spec, Quantity::Dust).unwrap();
    let mut grid = isochrone_grid();
    let weights = apply_prior(&mut grid, "Av", &dust).unwrap();
    assert!(weights.iter().all(|&w| w >= 0.0));
    // Av = 0 gives zero density
    assert_eq!(weights[0], 0.0);
}

#[test]
fn test_config_weights_survive_hdf_roundtrip() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("grid.hdf5");
    isochrone_grid().write(&source).unwrap();

    let config = PriorConfig::from_json_str(CONFIG).unwrap();
    let mut cache = CacheBackend::new(&source).unwrap();
    let weights = apply_prior_config(&mut cache, &config).unwrap();
    assert_eq!(weights.len(), 24);
    assert!(weights.iter().all(|w| w.is_finite() && *w >= 0.0));

    let weighted = dir.path().join("weighted.hdf5");
    cache.write(&weighted).unwrap();

    let mut disk = DiskBackend::open(&weighted).unwrap();
    assert!(disk.keys().unwrap().contains(&PRIOR_WEIGHT.to_string()));
    let stored = disk.grid().unwrap().numeric_column(PRIOR_WEIGHT).unwrap();
    for (a, b) in stored.iter().zip(weights.iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
}

#[test]
fn test_config_weights_written_to_fits() {
    let path = unique_output_path("prior_weights", "fits");
    let config = PriorConfig::from_json_str(CONFIG).unwrap();

    let mut grid = isochrone_grid();
    let weights = apply_prior_config(&mut grid, &config).unwrap();
    grid.write_fits(&path, true).unwrap();

    let mut back = MemoryBackend::from_file(&path).unwrap();
    assert_eq!(back.column(PRIOR_WEIGHT).unwrap(), Column::Float(weights));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_multiply_weights_on_loaded_grid() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("grid.fits");
    isochrone_grid().write(&source).unwrap();

    let mut cache = CacheBackend::new(&source).unwrap();
    let flat = PriorModel::new(PriorSpec::Flat { amp: Some(3.0) }, Quantity::Distance).unwrap();
    let ones = Array1::ones(24);
    let weights = flat.weights(ones.view()).unwrap();

    multiply_weights(&mut cache, "weight", weights.view()).unwrap();
    multiply_weights(&mut cache, "weight", weights.view()).unwrap();
    let column = cache.grid().unwrap().numeric_column("weight").unwrap();
    assert!(column.iter().all(|&w| w == 9.0));

    // The file itself is untouched until written
    let mut fresh = CacheBackend::new(&source).unwrap();
    assert!(!fresh.keys().unwrap().contains(&"weight".to_string()));
    assert_eq!(cache.seds().unwrap().dim(), (24, 2));
}
