//! Versioned binary checkpoints of the full model state.
//!
//! One file per rank per step, containing a grid header, the simulation
//! time and step index, and one contiguous block per field: interior
//! values only, row-major over the local extents (k outer, j, i inner),
//! little-endian doubles. The file is written to a temporary name and
//! renamed into place, so a checkpoint either exists completely or not at
//! all; no partial state is ever visible under the final name.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::EngineError;
use crate::fields::FieldStore;
use crate::grid::Grid;

const MAGIC: &[u8; 4] = b"LESC";
const VERSION: u32 = 1;

/// Error type for checkpoint file handling.
///
/// Grid disagreements are not represented here: a header that does not
/// match the configured grid is a [`ConfigError`], because the problem is
/// the configuration of the restarted run, not the file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// I/O failure reading or writing a state file.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a checkpoint or uses an unsupported layout version.
    #[error("malformed checkpoint: {0}")]
    Format(String),
}

/// Path of the state file for `step` and `rank`.
pub fn state_path(dir: &Path, step: u64, rank: usize) -> PathBuf {
    dir.join(format!("state.{step:08}.r{rank:03}"))
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64(w: &mut impl Write, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Write the full state atomically.
///
/// Callable at step 0 to establish the initial on-disk record before any
/// stepping happens.
pub fn save(
    dir: &Path,
    step: u64,
    grid: &Grid,
    store: &FieldStore,
    time: f64,
) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir)?;
    let path = state_path(dir, step, grid.rank);
    // Append rather than with_extension: the rank suffix must survive so
    // concurrent ranks never share a temporary file.
    let tmp = dir.join(format!("state.{step:08}.r{:03}.tmp", grid.rank));

    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        for v in [
            grid.itot as u64,
            grid.jtot as u64,
            grid.ktot as u64,
            grid.npx as u64,
            grid.npy as u64,
            grid.rank as u64,
        ] {
            write_u64(&mut w, v)?;
        }
        write_u64(&mut w, step)?;
        write_f64(&mut w, time)?;

        let names = store.field_names();
        w.write_all(&(names.len() as u32).to_le_bytes())?;

        let mut packed = Vec::new();
        for name in &names {
            let field = store.field(name).expect("named field exists");
            w.write_all(&(name.len() as u32).to_le_bytes())?;
            w.write_all(name.as_bytes())?;
            field.pack_interior(grid, &mut packed);
            for &v in &packed {
                write_f64(&mut w, v)?;
            }
        }
        w.flush()?;
    }

    // The rename is the commit point.
    fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Read the full state back; returns (time, step).
///
/// Ghost cells are not restored; the caller refreshes them with boundary
/// conditions and a halo exchange.
pub fn load(
    dir: &Path,
    step: u64,
    grid: &Grid,
    store: &mut FieldStore,
) -> Result<(f64, u64), EngineError> {
    let path = state_path(dir, step, grid.rank);
    let mut r = BufReader::new(File::open(&path).map_err(CheckpointError::Io)?);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(CheckpointError::Io)?;
    if &magic != MAGIC {
        return Err(CheckpointError::Format(format!(
            "bad magic in {}",
            path.display()
        ))
        .into());
    }
    let mut version = [0u8; 4];
    r.read_exact(&mut version).map_err(CheckpointError::Io)?;
    let version = u32::from_le_bytes(version);
    if version != VERSION {
        return Err(CheckpointError::Format(format!("unsupported version {version}")).into());
    }

    let mut header = [0u64; 6];
    for h in header.iter_mut() {
        *h = read_u64(&mut r).map_err(CheckpointError::Io)?;
    }
    let expected = [
        grid.itot as u64,
        grid.jtot as u64,
        grid.ktot as u64,
        grid.npx as u64,
        grid.npy as u64,
        grid.rank as u64,
    ];
    if header != expected {
        return Err(ConfigError::CheckpointMismatch {
            expected: format!("{expected:?}"),
            found: format!("{header:?}"),
        }
        .into());
    }

    let file_step = read_u64(&mut r).map_err(CheckpointError::Io)?;
    let time = read_f64(&mut r).map_err(CheckpointError::Io)?;

    let mut n_fields = [0u8; 4];
    r.read_exact(&mut n_fields).map_err(CheckpointError::Io)?;
    let n_fields = u32::from_le_bytes(n_fields) as usize;

    let names = store.field_names();
    if n_fields != names.len() {
        return Err(ConfigError::CheckpointMismatch {
            expected: format!("{} fields", names.len()),
            found: format!("{n_fields} fields"),
        }
        .into());
    }

    let interior = grid.interior_len();
    let mut packed = vec![0.0; interior];
    for expected_name in &names {
        let mut len = [0u8; 4];
        r.read_exact(&mut len).map_err(CheckpointError::Io)?;
        let len = u32::from_le_bytes(len) as usize;
        let mut name = vec![0u8; len];
        r.read_exact(&mut name).map_err(CheckpointError::Io)?;
        let name = String::from_utf8(name)
            .map_err(|_| CheckpointError::Format("field name is not UTF-8".into()))?;
        if &name != expected_name {
            return Err(ConfigError::CheckpointMismatch {
                expected: expected_name.clone(),
                found: name,
            }
            .into());
        }

        for v in packed.iter_mut() {
            *v = read_f64(&mut r).map_err(CheckpointError::Io)?;
        }
        store
            .field_mut(&name)
            .expect("named field exists")
            .unpack_interior(grid, &packed);
    }

    Ok((time, file_step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup(dir_tag: &str) -> (Config, Grid, FieldStore, PathBuf) {
        let mut config = Config::default();
        config.grid.itot = 8;
        config.grid.jtot = 8;
        config.grid.ktot = 8;
        config.physics.scalars = vec!["th".into()];
        let dir = std::env::temp_dir().join(format!("les_rs_ckpt_{dir_tag}_{}", std::process::id()));
        config.time.checkpoint_dir = dir.clone();
        let grid = Grid::from_config(&config, 0).unwrap();
        let store = FieldStore::new(&grid, &config);
        (config, grid, store, dir)
    }

    fn fill_pattern(store: &mut FieldStore, grid: &Grid) {
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    store.u.data[ijk] = ijk as f64 * 0.5;
                    store.v.data[ijk] = ijk as f64 - 7.0;
                    store.w.data[ijk] = (ijk as f64).sin();
                    store.p.data[ijk] = 1.0 / (1.0 + ijk as f64);
                    store.scalars.get_mut("th").unwrap().data[ijk] = (ijk % 17) as f64;
                }
            }
        }
    }

    #[test]
    fn test_round_trip_restores_everything_exactly() {
        let (_, grid, mut store, dir) = setup("roundtrip");
        fill_pattern(&mut store, &grid);
        let time = 12.345678;

        save(&dir, 42, &grid, &store, time).unwrap();

        let mut config2 = Config::default();
        config2.grid.itot = 8;
        config2.grid.jtot = 8;
        config2.grid.ktot = 8;
        config2.physics.scalars = vec!["th".into()];
        let mut restored = FieldStore::new(&grid, &config2);
        let (rtime, rstep) = load(&dir, 42, &grid, &mut restored).unwrap();

        assert_eq!(rtime.to_bits(), time.to_bits());
        assert_eq!(rstep, 42);
        for name in store.field_names() {
            let a = &store.field(&name).unwrap().data;
            let b = &restored.field(&name).unwrap().data;
            for k in grid.kstart..grid.kend {
                for j in grid.jstart..grid.jend {
                    for i in grid.istart..grid.iend {
                        let ijk = grid.ijk(i, j, k);
                        assert_eq!(a[ijk].to_bits(), b[ijk].to_bits(), "field {name}");
                    }
                }
            }
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_grid_mismatch_is_config_error() {
        let (_, grid, mut store, dir) = setup("mismatch");
        fill_pattern(&mut store, &grid);
        save(&dir, 0, &grid, &store, 0.0).unwrap();

        // Same file, different configured grid.
        let mut config2 = Config::default();
        config2.grid.itot = 16;
        config2.grid.jtot = 8;
        config2.grid.ktot = 8;
        config2.physics.scalars = vec!["th".into()];
        let grid2 = Grid::from_config(&config2, 0).unwrap();
        let mut store2 = FieldStore::new(&grid2, &config2);

        // Rank files are keyed identically, so grid2 reads grid's file.
        let result = load(&dir, 0, &grid2, &mut store2);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::CheckpointMismatch { .. }))
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_io_error() {
        let (_, grid, mut store, dir) = setup("missing");
        let result = load(&dir, 999, &grid, &mut store);
        assert!(matches!(
            result,
            Err(EngineError::Checkpoint(CheckpointError::Io(_)))
        ));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (_, grid, mut store, dir) = setup("tmpfile");
        fill_pattern(&mut store, &grid);
        let path = save(&dir, 7, &grid, &store, 1.0).unwrap();
        assert!(path.exists());
        assert!(!dir.join("state.00000007.r000.tmp").exists());
        fs::remove_dir_all(&dir).ok();
    }
}
