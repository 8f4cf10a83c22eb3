// src/coupling/transfer.rs

use nalgebra::DVector;

use crate::coupling::mapping::SpatialMapping;

/// Volume-weighted restriction of a per-element field onto the local cells
/// (heat/fluids -> neutronics direction, e.g. temperature or density).
///
/// Only fluid elements contribute to the average. Cells with no fluid
/// elements keep their existing value in `cell_field`, preserving
/// solid-region values supplied externally (input or restart file).
///
/// `elem_field` is indexed by the gathered element ordering; `cell_field` by
/// the canonical local-cell ordering. The caller is responsible for having
/// gathered `elem_field` across ranks beforehand; given identical gathered
/// data, every rank computes identical cell values.
pub fn elems_to_cells(
    mapping: &SpatialMapping,
    elem_field: &[f64],
    cell_field: &mut DVector<f64>,
) {
    debug_assert_eq!(elem_field.len(), mapping.n_elements());
    debug_assert_eq!(cell_field.len(), mapping.n_local_cells());

    for (l_cell, (_, elems)) in mapping.g_cell_to_l_elems.iter().enumerate() {
        let mut weighted = 0.0;
        let mut volume = 0.0;
        for &e in elems {
            if mapping.elem_fluid_mask[e] == 1 {
                weighted += elem_field[e] * mapping.l_elem_volumes[e];
                volume += mapping.l_elem_volumes[e];
            }
        }
        if volume > 0.0 {
            cell_field[l_cell] = weighted / volume;
        }
    }
}

/// Assignment of a per-local-cell field onto the elements (neutronics ->
/// heat/fluids direction, e.g. the heat source).
///
/// Element -> cell is a function, so each element simply reads its owning
/// cell's value; no averaging is involved. Elements whose owning cell is
/// not in the local-cell set keep their existing value.
pub fn cells_to_elems(
    mapping: &SpatialMapping,
    cell_field: &DVector<f64>,
    elem_field: &mut [f64],
) {
    debug_assert_eq!(cell_field.len(), mapping.n_local_cells());
    debug_assert_eq!(elem_field.len(), mapping.n_elements());

    for (elem, cell) in mapping.elem_to_cell.iter().enumerate() {
        if let Some(&l_cell) = mapping.g_cell_to_l_cell.get(cell) {
            elem_field[elem] = cell_field[l_cell];
        }
    }
}
