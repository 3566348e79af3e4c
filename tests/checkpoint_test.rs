//! Checkpoint round trips through the engine facade.

use std::fs;
use std::path::PathBuf;

use les_rs::{Config, ConfigError, Engine, EngineError, Network};

fn unique_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("les_rs_it_{tag}_{}", std::process::id()))
}

fn test_config(dir: &PathBuf) -> Config {
    let mut config = Config::default();
    config.grid.itot = 16;
    config.grid.jtot = 16;
    config.grid.ktot = 16;
    config.physics.scalars = vec!["th".into()];
    config.init.rndamp = 1e-2;
    config.init.seed = 99;
    config.time.dt_max = 0.05;
    config.time.checkpoint_dir = dir.clone();
    config
}

#[test]
fn test_save_at_step_zero_then_restart() {
    let dir = unique_dir("step0");
    let config = test_config(&dir);

    let mut engine = Engine::initialize(config.clone(), Network::single()).unwrap();
    engine.create_fields().unwrap();
    // The initial on-disk record, before any stepping.
    engine.save(0).unwrap();

    let mut restarted = Engine::initialize(config, Network::single()).unwrap();
    restarted.load(0).unwrap();

    assert_eq!(restarted.step_index(), 0);
    assert_eq!(restarted.time(), 0.0);
    assert_eq!(
        engine.fields().u.data, restarted.fields().u.data,
        "initial velocity must restore exactly"
    );

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_round_trip_preserves_state_and_trajectory() {
    let dir = unique_dir("trajectory");
    let config = test_config(&dir);

    let mut engine = Engine::initialize(config.clone(), Network::single()).unwrap();
    engine.create_fields().unwrap();
    for _ in 0..3 {
        engine.step().unwrap();
    }
    let saved_time = engine.time();
    engine.save(3).unwrap();

    // A freshly constructed engine with identical configuration.
    let mut restarted = Engine::initialize(config, Network::single()).unwrap();
    restarted.load(3).unwrap();
    assert_eq!(restarted.step_index(), 3);
    assert_eq!(restarted.time().to_bits(), saved_time.to_bits());
    for name in engine.fields().field_names() {
        let a = &engine.fields().field(&name).unwrap().data;
        let b = &restarted.fields().field(&name).unwrap().data;
        assert_eq!(a, b, "field {name} must restore exactly, ghosts included");
    }

    // The restored engine continues on the identical trajectory.
    let s_orig = engine.step().unwrap();
    let s_rest = restarted.step().unwrap();
    assert_eq!(s_orig.dt.to_bits(), s_rest.dt.to_bits());
    assert_eq!(engine.fields().u.data, restarted.fields().u.data);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_load_with_wrong_grid_is_config_error() {
    let dir = unique_dir("wronggrid");
    let config = test_config(&dir);

    let mut engine = Engine::initialize(config.clone(), Network::single()).unwrap();
    engine.create_fields().unwrap();
    engine.save(0).unwrap();

    let mut other = config.clone();
    other.grid.ktot = 32;
    let mut mismatched = Engine::initialize(other, Network::single()).unwrap();
    let result = mismatched.load(0);
    assert!(matches!(
        result,
        Err(EngineError::Config(ConfigError::CheckpointMismatch { .. }))
    ));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_periodic_checkpointing_during_stepping() {
    let dir = unique_dir("interval");
    let mut config = test_config(&dir);
    config.time.checkpoint_interval = 2;

    let mut engine = Engine::initialize(config, Network::single()).unwrap();
    engine.create_fields().unwrap();
    for _ in 0..4 {
        engine.step().unwrap();
    }

    // Steps 2 and 4 are recorded, steps 1 and 3 are not.
    for (step, expected) in [(1u64, false), (2, true), (3, false), (4, true)] {
        let path = les_rs::io::checkpoint::state_path(&dir, step, 0);
        assert_eq!(path.exists(), expected, "step {step}");
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_multi_rank_round_trip() {
    let dir = unique_dir("multirank");
    let mut config = test_config(&dir);
    config.grid.npx = 2;
    config.grid.npy = 2;

    let snapshots = Network::run(2, 2, |comm| {
        let mut engine = Engine::initialize(config.clone(), comm).unwrap();
        engine.create_fields().unwrap();
        engine.step().unwrap();
        engine.save(1).unwrap();
        engine.fields().u.data.clone()
    });

    let restored = Network::run(2, 2, |comm| {
        let mut engine = Engine::initialize(config.clone(), comm).unwrap();
        engine.load(1).unwrap();
        assert_eq!(engine.step_index(), 1);
        engine.fields().u.data.clone()
    });

    for (rank, (a, b)) in snapshots.iter().zip(&restored).enumerate() {
        assert_eq!(a, b, "rank {rank} state must restore exactly");
    }

    fs::remove_dir_all(&dir).ok();
}
