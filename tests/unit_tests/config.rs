use hybridization::config::{
    FormCompilerParameters, HybridizationConfig, InnerSolverOptions, KspType, OptionsDatabase, PcType,
};
use hybridization::error::ConfigurationError;

#[test]
fn options_are_parsed_from_arguments() {
    let options = OptionsDatabase::from_args([
        "program",
        "-pc_hybridization_ksp_type",
        "preonly",
        "-monitor",
        "-shift",
        "-1.5",
        "-pc_hybridization_pc_type",
        "cholesky",
        "-trailing",
    ]);
    assert_eq!(options.get("pc_hybridization_ksp_type"), Some("preonly"));
    assert_eq!(options.get("pc_hybridization_pc_type"), Some("cholesky"));
    assert_eq!(options.get("monitor"), Some(""));
    assert_eq!(options.get("shift"), Some("-1.5"));
    assert_eq!(options.get("trailing"), Some(""));
    assert!(!options.contains("program"));
    assert_eq!(options.get_parsed::<f64>("shift"), Ok(Some(-1.5)));
    assert_eq!(options.get_parsed::<f64>("missing"), Ok(None));
}

#[test]
fn defaults_apply_without_options() {
    let config = HybridizationConfig::from_options(&OptionsDatabase::new(), "").unwrap();
    assert_eq!(config, HybridizationConfig::default());
    assert_eq!(config.inner_solver.ksp_type, KspType::Cg);
    assert_eq!(config.inner_solver.pc_type, PcType::Jacobi);
    assert_eq!(config.inner_solver.rtol, 1e-10);
    assert_eq!(config.inner_solver.max_it, 10000);
    assert_eq!(config.projector_tolerance, 1e-8);
    assert_eq!(FormCompilerParameters::default().quadrature_degree, None);
}

#[test]
fn options_are_read_under_the_prefix() {
    let mut options = OptionsDatabase::new();
    options.set("fs_hybridization_ksp_type", "preonly");
    options.set("fs_hybridization_pc_type", "cholesky");
    options.set("fs_hybridization_ksp_rtol", "1e-6");
    options.set("fs_hybridization_ksp_max_it", " 25 ");
    options.set("fs_hybridization_projector_tolerance", "1e-12");
    // Options under other prefixes are ignored
    options.set("hybridization_pc_type", "none");

    let config = HybridizationConfig::from_options(&options, "fs_").unwrap();
    assert_eq!(
        config,
        HybridizationConfig {
            inner_solver: InnerSolverOptions {
                ksp_type: KspType::PreOnly,
                pc_type: PcType::Cholesky,
                rtol: 1e-6,
                max_it: 25,
            },
            projector_tolerance: 1e-12,
        }
    );

    let unprefixed = HybridizationConfig::from_options(&options, "").unwrap();
    assert_eq!(unprefixed.inner_solver.pc_type, PcType::None);
    assert_eq!(unprefixed.inner_solver.ksp_type, KspType::Cg);
}

#[test]
fn invalid_values_are_rejected() {
    let config_with = |key: &str, value: &str| {
        let mut options = OptionsDatabase::new();
        options.set(key, value);
        HybridizationConfig::from_options(&options, "")
    };

    assert_eq!(
        config_with("hybridization_ksp_type", "gmres"),
        Err(ConfigurationError::InvalidOption {
            key: "hybridization_ksp_type".to_string(),
            value: "gmres".to_string(),
            reason: "unknown solver name",
        })
    );
    assert!(matches!(
        config_with("hybridization_pc_type", "ilu"),
        Err(ConfigurationError::InvalidOption { .. })
    ));
    assert_eq!(
        config_with("hybridization_ksp_rtol", "tight"),
        Err(ConfigurationError::InvalidOption {
            key: "hybridization_ksp_rtol".to_string(),
            value: "tight".to_string(),
            reason: "could not parse value",
        })
    );
    assert!(matches!(
        config_with("hybridization_ksp_rtol", "-1e-8"),
        Err(ConfigurationError::InvalidOption { .. })
    ));
    assert!(matches!(
        config_with("hybridization_ksp_max_it", "0"),
        Err(ConfigurationError::InvalidOption { .. })
    ));
    assert!(matches!(
        config_with("hybridization_ksp_max_it", "-3"),
        Err(ConfigurationError::InvalidOption { .. })
    ));
    assert!(matches!(
        config_with("hybridization_projector_tolerance", "inf"),
        Err(ConfigurationError::InvalidOption { .. })
    ));
}

#[test]
fn unsupported_solver_combinations_are_rejected() {
    let mut options = OptionsDatabase::new();
    options.set("hybridization_ksp_type", "preonly");
    options.set("hybridization_pc_type", "jacobi");
    assert_eq!(
        HybridizationConfig::from_options(&options, ""),
        Err(ConfigurationError::UnsupportedSolver {
            ksp_type: "preonly".to_string(),
            pc_type: "jacobi".to_string(),
        })
    );

    for pc_type in [PcType::Jacobi, PcType::None, PcType::Cholesky] {
        let options = InnerSolverOptions {
            pc_type,
            ..InnerSolverOptions::default()
        };
        assert_eq!(options.validate(), Ok(()));
    }
}

#[test]
fn configuration_round_trips_through_serde() {
    let config = HybridizationConfig {
        inner_solver: InnerSolverOptions {
            ksp_type: KspType::PreOnly,
            pc_type: PcType::Cholesky,
            rtol: 1e-9,
            max_it: 7,
        },
        projector_tolerance: 1e-11,
    };
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"preonly\""));
    assert!(json.contains("\"cholesky\""));
    let deserialized: HybridizationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);

    // Missing fields fall back to their defaults
    let partial: HybridizationConfig = serde_json::from_str(r#"{ "inner_solver": { "pc_type": "none" } }"#).unwrap();
    assert_eq!(partial.inner_solver.pc_type, PcType::None);
    assert_eq!(partial.inner_solver.ksp_type, KspType::Cg);
    assert_eq!(partial.projector_tolerance, 1e-8);

    let options = OptionsDatabase::from_args(["-a", "1"]);
    let json = serde_json::to_string(&options).unwrap();
    assert_eq!(serde_json::from_str::<OptionsDatabase>(&json).unwrap(), options);
}
