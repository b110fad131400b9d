//! Loading and running scenario files from disk.

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use traffic_core::error::TrafficError;
use traffic_headless::{run_batch, run_scenario, BatchConfig, Scenario, ScenarioError};
use traffic_test_utils::determinism::verify_determinism;

fn bundled(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn bundled_scenarios_validate() {
    for name in ["single_ban.ron", "road_sections.ron"] {
        let scenario = Scenario::load(bundled(name)).unwrap();
        scenario.validate().unwrap();
    }

    let single = Scenario::load(bundled("single_ban.ron")).unwrap();
    let protected: Vec<_> = single
        .config
        .templates
        .iter()
        .filter(|template| template.protected)
        .map(|template| template.name.as_str())
        .collect();
    assert_eq!(protected, ["ambulance"]);

    let sections = Scenario::load(bundled("road_sections.ron")).unwrap();
    assert_eq!(sections.config.resolved_groups().len(), 3);
    assert!(sections.config.ban.weight_growth);
    assert_eq!(sections.config.ban.weight_growth_per_second, 0.1);
    assert!(sections.config.ban.guard_outgoing);
    assert_eq!(sections.config.lanes[0].length, 30.0);
}

#[test]
fn strict_metadata_rejects_missing_sign_image() {
    let file = write_temp(
        r#"(
            name: "missing image",
            config: (
                templates: [
                    (id: 0, name: "sedan", display_asset: Some("signs/sedan.png")),
                    (id: 1, name: "ghost"),
                ],
                lanes: [(id: 0, anchor: (x: -5.0, y: 0.0, z: 0.0))],
                spawn: (cooldown_count: 0),
                ban: (display: Image),
            ),
        )"#,
    );
    let scenario = Scenario::load(file.path()).unwrap();
    match scenario.validate() {
        Err(ScenarioError::Invalid(TrafficError::MissingTemplateMetadata { name, .. })) => {
            assert_eq!(name, "ghost");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn lenient_metadata_runs_without_banning_template() {
    let file = write_temp(
        r#"(
            name: "lenient",
            config: (
                templates: [
                    (id: 0, name: "sedan", display_asset: Some("signs/sedan.png")),
                    (id: 1, name: "ghost"),
                ],
                lanes: [
                    (id: 0, anchor: (x: -5.0, y: 0.0, z: 0.0)),
                    (id: 1, anchor: (x: 5.0, y: 0.0, z: 2.0)),
                ],
                spawn: (cooldown_count: 1),
                ban: (display: Image, strict_metadata: false),
            ),
        )"#,
    );
    let scenario = Scenario::load(file.path()).unwrap();
    scenario.validate().unwrap();

    let metrics = run_scenario(&scenario, 5, 3000, 0.05).unwrap();
    assert!(metrics.spawns > 0);
    assert_eq!(metrics.rotations, 0);
}

#[test]
fn broken_file_reports_parse_error() {
    let file = write_temp("(name: \"broken\", config: (templates: [)");
    assert!(matches!(
        Scenario::load(file.path()),
        Err(ScenarioError::ParseError(_))
    ));
}

#[test]
fn scenario_rounds_are_reproducible() {
    let scenario = Scenario::load(bundled("road_sections.ron")).unwrap();
    let result = verify_determinism(
        3,
        1,
        || (),
        |_| {},
        |_| run_scenario(&scenario, 11, 3000, 0.02).unwrap().final_state_hash,
    );
    result.assert_deterministic();
}

#[test]
fn batch_matches_individual_runs() {
    let scenario = Scenario::load(bundled("single_ban.ron")).unwrap();
    let config = BatchConfig {
        seeds: 4,
        start_seed: 20,
        ticks: 1200,
        dt: 0.05,
    };
    let results = run_batch(&scenario, config);
    assert!(results.errors.is_empty());

    for run in &results.runs {
        let single = run_scenario(&scenario, run.seed, config.ticks, config.dt).unwrap();
        assert_eq!(&single, run);
    }
}
