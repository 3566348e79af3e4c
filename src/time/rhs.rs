//! Right-hand-side tendencies: advection, diffusion, buoyancy.
//!
//! Second-order central differences in flux form on the staggered grid.
//! Every stencil reads at most one cell beyond the interior, so fresh
//! ghost cells (vertical boundary conditions plus horizontal halos) are a
//! precondition for every routine here. Tendencies are accumulated with
//! `+=`; the integrator owns the substage scaling.

use crate::fields::FieldStore;
use crate::grid::Grid;

#[inline(always)]
fn i2(a: f64, b: f64) -> f64 {
    0.5 * (a + b)
}

/// Accumulate advective and diffusive tendencies for the three momentum
/// components.
///
/// Wall faces of `w` (bottom and top) carry no tendency; the vertical loop
/// for `w` covers interior faces only.
pub fn momentum_tendencies(store: &mut FieldStore, grid: &Grid, visc: f64) {
    let FieldStore {
        u, v, w, ut, vt, wt, ..
    } = store;
    let (u, v, w) = (&u.data, &v.data, &w.data);

    let ii = 1usize;
    let jj = grid.icells;
    let kk = grid.ijcells;
    let dxi = grid.dxi;
    let dyi = grid.dyi;
    let dxidxi = dxi * dxi;
    let dyidyi = dyi * dyi;

    for k in grid.kstart..grid.kend {
        let dzi = grid.dzi[k];
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = grid.ijk(i, j, k);

                ut[ijk] += -(i2(u[ijk], u[ijk + ii]) * i2(u[ijk], u[ijk + ii])
                    - i2(u[ijk - ii], u[ijk]) * i2(u[ijk - ii], u[ijk]))
                    * dxi
                    - (i2(v[ijk - ii + jj], v[ijk + jj]) * i2(u[ijk], u[ijk + jj])
                        - i2(v[ijk - ii], v[ijk]) * i2(u[ijk - jj], u[ijk]))
                        * dyi
                    - (i2(w[ijk - ii + kk], w[ijk + kk]) * i2(u[ijk], u[ijk + kk])
                        - i2(w[ijk - ii], w[ijk]) * i2(u[ijk - kk], u[ijk]))
                        * dzi
                    + visc
                        * ((u[ijk + ii] - 2.0 * u[ijk] + u[ijk - ii]) * dxidxi
                            + (u[ijk + jj] - 2.0 * u[ijk] + u[ijk - jj]) * dyidyi
                            + ((u[ijk + kk] - u[ijk]) * grid.dzhi[k + 1]
                                - (u[ijk] - u[ijk - kk]) * grid.dzhi[k])
                                * dzi);

                vt[ijk] += -(i2(u[ijk - jj + ii], u[ijk + ii]) * i2(v[ijk], v[ijk + ii])
                    - i2(u[ijk - jj], u[ijk]) * i2(v[ijk - ii], v[ijk]))
                    * dxi
                    - (i2(v[ijk], v[ijk + jj]) * i2(v[ijk], v[ijk + jj])
                        - i2(v[ijk - jj], v[ijk]) * i2(v[ijk - jj], v[ijk]))
                        * dyi
                    - (i2(w[ijk - jj + kk], w[ijk + kk]) * i2(v[ijk], v[ijk + kk])
                        - i2(w[ijk - jj], w[ijk]) * i2(v[ijk - kk], v[ijk]))
                        * dzi
                    + visc
                        * ((v[ijk + ii] - 2.0 * v[ijk] + v[ijk - ii]) * dxidxi
                            + (v[ijk + jj] - 2.0 * v[ijk] + v[ijk - jj]) * dyidyi
                            + ((v[ijk + kk] - v[ijk]) * grid.dzhi[k + 1]
                                - (v[ijk] - v[ijk - kk]) * grid.dzhi[k])
                                * dzi);
            }
        }
    }

    // w lives on faces; the wall faces stay untouched.
    for k in grid.kstart + 1..grid.kend {
        let dzhi = grid.dzhi[k];
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = grid.ijk(i, j, k);

                wt[ijk] += -(i2(u[ijk - kk + ii], u[ijk + ii]) * i2(w[ijk], w[ijk + ii])
                    - i2(u[ijk - kk], u[ijk]) * i2(w[ijk - ii], w[ijk]))
                    * dxi
                    - (i2(v[ijk - kk + jj], v[ijk + jj]) * i2(w[ijk], w[ijk + jj])
                        - i2(v[ijk - kk], v[ijk]) * i2(w[ijk - jj], w[ijk]))
                        * dyi
                    - (i2(w[ijk], w[ijk + kk]) * i2(w[ijk], w[ijk + kk])
                        - i2(w[ijk - kk], w[ijk]) * i2(w[ijk - kk], w[ijk]))
                        * dzhi
                    + visc
                        * ((w[ijk + ii] - 2.0 * w[ijk] + w[ijk - ii]) * dxidxi
                            + (w[ijk + jj] - 2.0 * w[ijk] + w[ijk - jj]) * dyidyi
                            + ((w[ijk + kk] - w[ijk]) * grid.dzi[k]
                                - (w[ijk] - w[ijk - kk]) * grid.dzi[k - 1])
                                * dzhi);
            }
        }
    }
}

/// Accumulate advective and diffusive tendencies for every scalar.
pub fn scalar_tendencies(store: &mut FieldStore, grid: &Grid, svisc: f64) {
    let FieldStore {
        u, v, w, scalars, st, ..
    } = store;
    let (u, v, w) = (&u.data, &v.data, &w.data);

    let ii = 1usize;
    let jj = grid.icells;
    let kk = grid.ijcells;
    let dxi = grid.dxi;
    let dyi = grid.dyi;
    let dxidxi = dxi * dxi;
    let dyidyi = dyi * dyi;

    for (name, field) in scalars.iter() {
        let s = &field.data;
        let tend = st.get_mut(name).expect("tendency buffer per scalar");
        for k in grid.kstart..grid.kend {
            let dzi = grid.dzi[k];
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);

                    tend[ijk] += -(u[ijk + ii] * i2(s[ijk], s[ijk + ii])
                        - u[ijk] * i2(s[ijk - ii], s[ijk]))
                        * dxi
                        - (v[ijk + jj] * i2(s[ijk], s[ijk + jj])
                            - v[ijk] * i2(s[ijk - jj], s[ijk]))
                            * dyi
                        - (w[ijk + kk] * i2(s[ijk], s[ijk + kk])
                            - w[ijk] * i2(s[ijk - kk], s[ijk]))
                            * dzi
                        + svisc
                            * ((s[ijk + ii] - 2.0 * s[ijk] + s[ijk - ii]) * dxidxi
                                + (s[ijk + jj] - 2.0 * s[ijk] + s[ijk - jj]) * dyidyi
                                + ((s[ijk + kk] - s[ijk]) * grid.dzhi[k + 1]
                                    - (s[ijk] - s[ijk - kk]) * grid.dzhi[k])
                                    * dzi);
                }
            }
        }
    }
}

/// Couple a scalar into the vertical momentum as buoyancy.
///
/// The scalar is interpreted directly as buoyancy acceleration,
/// interpolated to the w faces. Wall faces stay untouched.
pub fn buoyancy_tendency(store: &mut FieldStore, grid: &Grid, scalar: &str) {
    let FieldStore { scalars, wt, .. } = store;
    let b = &scalars
        .get(scalar)
        .expect("buoyancy scalar is registered")
        .data;

    let kk = grid.ijcells;
    for k in grid.kstart + 1..grid.kend {
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = grid.ijk(i, j, k);
                wt[ijk] += i2(b[ijk - kk], b[ijk]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Network;
    use crate::config::Config;
    use crate::fields::FaceBc;
    use crate::grid::Grid;

    fn setup() -> (Grid, FieldStore) {
        let mut config = Config::default();
        config.grid.itot = 8;
        config.grid.jtot = 8;
        config.grid.ktot = 8;
        config.physics.scalars = vec!["b".into()];
        let grid = Grid::from_config(&config, 0).unwrap();
        let store = FieldStore::new(&grid, &config);
        (grid, store)
    }

    #[test]
    fn test_uniform_flow_has_no_momentum_tendency() {
        let (grid, mut store) = setup();
        let comm = Network::single();
        store.u.data.fill(1.5);
        store.v.data.fill(-0.5);
        // Free-slip walls so the uniform profile is an equilibrium.
        store.u.bc_bottom = FaceBc::Neumann(0.0);
        store.u.bc_top = FaceBc::Neumann(0.0);
        store.v.bc_bottom = FaceBc::Neumann(0.0);
        store.v.bc_top = FaceBc::Neumann(0.0);
        store.apply_boundary_conditions(&grid);
        comm.exchange_halo(&mut store.u.data, &grid).unwrap();
        comm.exchange_halo(&mut store.v.data, &grid).unwrap();
        comm.exchange_halo(&mut store.w.data, &grid).unwrap();

        momentum_tendencies(&mut store, &grid, 1e-3);

        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    assert!(store.ut[ijk].abs() < 1e-13, "ut = {}", store.ut[ijk]);
                    assert!(store.vt[ijk].abs() < 1e-13, "vt = {}", store.vt[ijk]);
                    assert!(store.wt[ijk].abs() < 1e-13, "wt = {}", store.wt[ijk]);
                }
            }
        }
    }

    #[test]
    fn test_diffusion_of_curved_profile_has_expected_sign() {
        let (grid, mut store) = setup();
        let comm = Network::single();
        // u(z) parabolic in the vertical: d2u/dz2 < 0 at the maximum.
        for k in grid.kstart..grid.kend {
            let z = grid.z[k] / grid.zsize;
            let profile = 4.0 * z * (1.0 - z);
            for j in 0..grid.jcells {
                for i in 0..grid.icells {
                    store.u.data[grid.ijk(i, j, k)] = profile;
                }
            }
        }
        store.apply_boundary_conditions(&grid);
        comm.exchange_halo(&mut store.u.data, &grid).unwrap();
        comm.exchange_halo(&mut store.v.data, &grid).unwrap();
        comm.exchange_halo(&mut store.w.data, &grid).unwrap();

        momentum_tendencies(&mut store, &grid, 1.0);

        // Mid-channel cell: pure viscous decay of the maximum.
        let k = grid.kstart + grid.kmax / 2;
        let ijk = grid.ijk(grid.istart + 2, grid.jstart + 2, k);
        assert!(
            store.ut[ijk] < 0.0,
            "diffusion should erode the velocity maximum, got {}",
            store.ut[ijk]
        );
    }

    #[test]
    fn test_buoyancy_accumulates_into_w() {
        let (grid, mut store) = setup();
        store.scalars.get_mut("b").unwrap().data.fill(0.25);
        buoyancy_tendency(&mut store, &grid, "b");

        let k = grid.kstart + 2;
        let ijk = grid.ijk(grid.istart, grid.jstart, k);
        assert!((store.wt[ijk] - 0.25).abs() < 1e-14);
        // Wall faces carry no buoyancy tendency.
        let wall = grid.ijk(grid.istart, grid.jstart, grid.kstart);
        assert_eq!(store.wt[wall], 0.0);
    }

    #[test]
    fn test_scalar_advection_conserves_integral() {
        let (grid, mut store) = setup();
        let comm = Network::single();
        // Uniform horizontal flow transporting a smooth scalar wave.
        store.u.data.fill(1.0);
        for k in grid.kstart..grid.kend {
            for j in 0..grid.jcells {
                for i in grid.istart..grid.iend {
                    let x = (i - grid.istart) as f64 / grid.itot as f64;
                    let s = (2.0 * std::f64::consts::PI * x).sin() + 1.0;
                    store.scalars.get_mut("b").unwrap().data[grid.ijk(i, j, k)] = s;
                }
            }
        }
        store.apply_boundary_conditions(&grid);
        comm.exchange_halo(&mut store.u.data, &grid).unwrap();
        comm.exchange_halo(&mut store.v.data, &grid).unwrap();
        comm.exchange_halo(&mut store.w.data, &grid).unwrap();
        comm.exchange_halo(&mut store.scalars.get_mut("b").unwrap().data, &grid)
            .unwrap();

        scalar_tendencies(&mut store, &grid, 0.0);

        // Flux form: the tendency integrates to zero over the periodic box.
        let mut total = 0.0;
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    total += store.st["b"][grid.ijk(i, j, k)] * grid.dz[k];
                }
            }
        }
        assert!(
            total.abs() < 1e-12,
            "advective flux not conservative: {total}"
        );
    }
}
