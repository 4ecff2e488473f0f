//! The shipped configuration file stays in step with the built-in defaults.

use forecast_pipeline::{BandIndex, ForecastHorizon, PipelineConfig};
use test_utils::workspace_root;

fn shipped() -> PipelineConfig {
    let path = workspace_root().join("config/gfs.yaml");
    let yaml = std::fs::read_to_string(&path).expect("config/gfs.yaml should exist");
    PipelineConfig::from_yaml(&yaml).expect("config/gfs.yaml should parse")
}

#[test]
fn test_shipped_config_is_valid() {
    let config = shipped();
    assert!(config.validate().is_ok());
    assert_eq!(config.horizons, PipelineConfig::default().horizons);
    assert_eq!(config.extent, PipelineConfig::default().extent);
}

#[test]
fn test_shipped_variables_match_builtin_table() {
    let from_file = shipped().band_index();
    let builtin = BandIndex::gfs_0p25();

    assert_eq!(from_file.len(), builtin.len());
    for name in builtin.names() {
        for analysis in [true, false] {
            let a = from_file.bands_for(name, analysis);
            let b = builtin.bands_for(name, analysis);
            match (a, b) {
                (Ok(a), Ok(b)) => assert_eq!(a, b, "{} (analysis: {})", name, analysis),
                (Err(_), Err(_)) => {}
                (a, b) => panic!("{} differs: {:?} vs {:?}", name, a, b),
            }
        }
    }
}

#[test]
fn test_every_default_horizon_is_published() {
    for h in PipelineConfig::default().horizons {
        assert!(ForecastHorizon::new(h).is_ok(), "{} is not a horizon", h);
    }
}
