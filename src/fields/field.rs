//! Ghosted three-dimensional field storage.
//!
//! A field is a flat `Vec<f64>` over the padded local box (x fastest, then
//! y, then z) with a kind tag and a vertical boundary policy per wall.
//! Ghost cells are only meaningful immediately after boundary-condition
//! application (vertical) and halo exchange (horizontal); any interior
//! mutation leaves them stale until the next refresh, and callers are
//! responsible for refreshing before any neighbor-stencil read.

use crate::grid::Grid;

/// What a field stores, which fixes its staggering.
///
/// Momentum components live on the faces normal to their direction
/// (Arakawa-C); pressure and scalars live at cell centers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// x-momentum, staggered to x faces.
    U,
    /// y-momentum, staggered to y faces.
    V,
    /// z-momentum, staggered to z faces (edges).
    W,
    /// Pressure, cell-centered.
    Pressure,
    /// Transported scalar, cell-centered.
    Scalar,
}

/// Boundary policy at one vertical wall.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FaceBc {
    /// Fixed value at the wall, imposed by mirroring through it.
    Dirichlet(f64),
    /// Fixed gradient through the wall.
    Neumann(f64),
    /// Impermeable wall for the face-normal component: the face value
    /// itself is pinned to zero.
    Wall,
}

/// One ghosted prognostic or diagnostic array.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub data: Vec<f64>,
    pub bc_bottom: FaceBc,
    pub bc_top: FaceBc,
}

impl Field {
    /// Allocate a zeroed field on `grid` with the given policies.
    pub fn new(
        name: impl Into<String>,
        kind: FieldKind,
        grid: &Grid,
        bc_bottom: FaceBc,
        bc_top: FaceBc,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            data: vec![0.0; grid.icells * grid.jcells * grid.kcells],
            bc_bottom,
            bc_top,
        }
    }

    /// Write the vertical (domain-boundary) ghost layer for this field.
    ///
    /// Horizontal ghost cells are exclusively the communicator's concern;
    /// this touches only the wall-adjacent levels. For `Wall` the wall
    /// face itself is pinned to zero; the face-normal component has no
    /// ghost above the top wall and needs none, since every stencil stops
    /// at the wall.
    pub fn apply_vertical_bc(&mut self, grid: &Grid) {
        let (kstart, kend) = (grid.kstart, grid.kend);

        match self.bc_bottom {
            FaceBc::Dirichlet(value) => {
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        let inner = grid.ijk(i, j, kstart);
                        let ghost = grid.ijk(i, j, kstart - 1);
                        self.data[ghost] = 2.0 * value - self.data[inner];
                    }
                }
            }
            FaceBc::Neumann(grad) => {
                let dzh = grid.dzh[kstart];
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        let inner = grid.ijk(i, j, kstart);
                        let ghost = grid.ijk(i, j, kstart - 1);
                        self.data[ghost] = self.data[inner] - grad * dzh;
                    }
                }
            }
            FaceBc::Wall => {
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        let wall = grid.ijk(i, j, kstart);
                        self.data[wall] = 0.0;
                        let ghost = grid.ijk(i, j, kstart - 1);
                        self.data[ghost] = -self.data[grid.ijk(i, j, kstart + 1)];
                    }
                }
            }
        }

        match self.bc_top {
            FaceBc::Dirichlet(value) => {
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        let inner = grid.ijk(i, j, kend - 1);
                        let ghost = grid.ijk(i, j, kend);
                        self.data[ghost] = 2.0 * value - self.data[inner];
                    }
                }
            }
            FaceBc::Neumann(grad) => {
                let dzh = grid.dzh[kend];
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        let inner = grid.ijk(i, j, kend - 1);
                        let ghost = grid.ijk(i, j, kend);
                        self.data[ghost] = self.data[inner] + grad * dzh;
                    }
                }
            }
            FaceBc::Wall => {
                for j in 0..grid.jcells {
                    for i in 0..grid.icells {
                        self.data[grid.ijk(i, j, kend)] = 0.0;
                    }
                }
            }
        }
    }

    /// Copy the interior (no ghosts) into a packed buffer, k outer, j, i
    /// inner: the canonical checkpoint and transpose ordering.
    pub fn pack_interior(&self, grid: &Grid, out: &mut Vec<f64>) {
        out.clear();
        out.reserve(grid.interior_len());
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    out.push(self.data[grid.ijk(i, j, k)]);
                }
            }
        }
    }

    /// Inverse of [`Field::pack_interior`]. Ghosts are left untouched and
    /// therefore stale.
    pub fn unpack_interior(&mut self, grid: &Grid, packed: &[f64]) {
        debug_assert_eq!(packed.len(), grid.interior_len());
        let mut n = 0;
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    self.data[grid.ijk(i, j, k)] = packed[n];
                    n += 1;
                }
            }
        }
    }
}
