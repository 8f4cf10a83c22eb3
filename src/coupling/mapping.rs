// src/coupling/mapping.rs

use std::collections::BTreeMap;

use tracing::info;

use crate::comm::Comm;
use crate::drivers::{CellHandle, HeatFluidsDriver, NeutronicsDriver, Position};
use crate::error::{CouplingError, Result};

/// Bidirectional mapping between neutronics cells and heat/fluids elements,
/// plus the per-entity volumes and fluid masks derived from it.
///
/// Built once at startup and read-shared by every Picard phase afterwards
/// (rigid mesh assumption). Element indices refer to the ordering
/// established by the rank-order gather of local elements, NOT to the
/// heat/fluids solver's internal numbering.
///
/// The iteration order of `g_cell_to_l_elems` keys is the canonical
/// local-cell ordering: `l_cell_to_g_cell` and `l_cell_volumes` are built by
/// walking those keys in order, and every per-local-cell field vector in the
/// coupled driver is indexed the same way.
#[derive(Debug)]
pub struct SpatialMapping {
    /// Global cell handle -> gathered element indices inside that cell.
    pub g_cell_to_l_elems: BTreeMap<CellHandle, Vec<usize>>,

    /// Local cell index -> global cell handle (canonical ordering).
    pub l_cell_to_g_cell: Vec<CellHandle>,

    /// Global cell handle -> local cell index; inverse of `l_cell_to_g_cell`
    /// restricted to the cells present in the heat-coupling domain.
    pub g_cell_to_l_cell: BTreeMap<CellHandle, usize>,

    /// Gathered element index -> owning global cell handle.
    pub elem_to_cell: Vec<CellHandle>,

    /// Local cell index -> summed volume of its mapped elements.
    pub l_cell_volumes: Vec<f64>,

    /// Gathered element index -> element volume.
    pub l_elem_volumes: Vec<f64>,

    /// 1 where the gathered element lies in the fluid region.
    pub elem_fluid_mask: Vec<i32>,

    /// 1 where any mapped element of the local cell is fluid.
    pub cell_fluid_mask: Vec<i32>,

    /// Offset of the calling rank's elements within the gathered ordering.
    pub local_elem_offset: usize,

    /// Number of elements owned by the calling rank.
    pub n_local_elems: usize,
}

impl SpatialMapping {
    /// Builds the mapping from the solvers' per-rank enumerations.
    ///
    /// Element centroids, volumes and fluid flags are gathered across the
    /// coupling communicator in rank order (then within-rank order), so
    /// every rank observes the identical global element ordering. Each
    /// gathered centroid is then located in the neutronics model. A centroid
    /// outside every cell, a cell with zero mapped volume, or a mapped
    /// volume that disagrees with the cell's transport volume beyond
    /// `volume_tolerance` (relative) is a fatal configuration error.
    pub fn build<N, H>(
        neutronics: &mut N,
        heat: &H,
        comm: &Comm,
        volume_tolerance: f64,
    ) -> Result<Self>
    where
        N: NeutronicsDriver,
        H: HeatFluidsDriver,
    {
        // Gather element centroids in rank order; the concatenation order
        // defines the element indices used everywhere below.
        let local_centroids = heat.element_centroids();
        let mut flat = Vec::with_capacity(local_centroids.len() * 3);
        for p in &local_centroids {
            flat.extend_from_slice(&[p.x, p.y, p.z]);
        }
        let flat = comm.allgather_f64(&flat);
        let positions: Vec<Position> = flat
            .chunks_exact(3)
            .map(|c| Position::new(c[0], c[1], c[2]))
            .collect();

        let l_elem_volumes = comm.allgather_f64(&heat.element_volumes());
        let elem_fluid_mask = comm.allgather_i32(&heat.fluid_mask());

        // Where the calling rank's elements sit in the gathered ordering.
        let counts = comm.allgather_i32(&[local_centroids.len() as i32]);
        let local_elem_offset: usize =
            counts[..comm.rank()].iter().map(|&c| c as usize).sum();
        let n_local_elems = local_centroids.len();

        let elem_to_cell = neutronics.find(&positions)?;

        let mut g_cell_to_l_elems: BTreeMap<CellHandle, Vec<usize>> = BTreeMap::new();
        for (elem, &cell) in elem_to_cell.iter().enumerate() {
            g_cell_to_l_elems.entry(cell).or_default().push(elem);
        }

        // Walking the map keys in order fixes the canonical local-cell
        // ordering shared by all derived per-local-cell vectors.
        let mut l_cell_to_g_cell = Vec::with_capacity(g_cell_to_l_elems.len());
        let mut g_cell_to_l_cell = BTreeMap::new();
        let mut l_cell_volumes = Vec::with_capacity(g_cell_to_l_elems.len());
        let mut cell_fluid_mask = Vec::with_capacity(g_cell_to_l_elems.len());

        for (l_cell, (&g_cell, elems)) in g_cell_to_l_elems.iter().enumerate() {
            let mapped_volume: f64 = elems.iter().map(|&e| l_elem_volumes[e]).sum();
            if mapped_volume <= 0.0 {
                return Err(CouplingError::ZeroMappedVolume { cell: g_cell.0 });
            }

            let transport_volume = neutronics.get_volume(g_cell);
            let rel_err = (mapped_volume - transport_volume).abs() / transport_volume;
            if rel_err > volume_tolerance {
                return Err(CouplingError::VolumeMismatch {
                    cell: g_cell.0,
                    mapped: mapped_volume,
                    transport: transport_volume,
                    rel_err,
                    tolerance: volume_tolerance,
                });
            }

            l_cell_to_g_cell.push(g_cell);
            g_cell_to_l_cell.insert(g_cell, l_cell);
            l_cell_volumes.push(mapped_volume);
            let fluid = elems.iter().any(|&e| elem_fluid_mask[e] == 1);
            cell_fluid_mask.push(fluid as i32);
        }

        if comm.rank() == 0 {
            info!(
                "spatial mapping: {} elements mapped into {} cells ({} fluid)",
                elem_to_cell.len(),
                l_cell_to_g_cell.len(),
                cell_fluid_mask.iter().filter(|&&m| m == 1).count()
            );
        }

        Ok(SpatialMapping {
            g_cell_to_l_elems,
            l_cell_to_g_cell,
            g_cell_to_l_cell,
            elem_to_cell,
            l_cell_volumes,
            l_elem_volumes,
            elem_fluid_mask,
            cell_fluid_mask,
            local_elem_offset,
            n_local_elems,
        })
    }

    /// Number of unique neutronics cells in the heat-coupling domain.
    pub fn n_local_cells(&self) -> usize {
        self.l_cell_to_g_cell.len()
    }

    /// Number of gathered heat/fluids elements.
    pub fn n_elements(&self) -> usize {
        self.elem_to_cell.len()
    }

    /// Global cell handles of the fluid-bearing local cells, in canonical
    /// order.
    pub fn fluid_cell_handles(&self) -> Vec<CellHandle> {
        self.l_cell_to_g_cell
            .iter()
            .zip(self.cell_fluid_mask.iter())
            .filter(|(_, &mask)| mask == 1)
            .map(|(&cell, _)| cell)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockHeatFluids, MockNeutronics};

    // 2 cells of width 1.0, volume 0.5 each; 4 elements of volume 0.125.
    fn build_mapping() -> SpatialMapping {
        let mut neutronics = MockNeutronics::slab(2, 1.0, 0.5);
        let heat = MockHeatFluids::channel(8, 2.0, 1.0);
        SpatialMapping::build(&mut neutronics, &heat, &Comm::self_comm(), 1e-6).unwrap()
    }

    #[test]
    fn test_elements_partition_cells_disjointly() {
        let mapping = build_mapping();
        assert_eq!(mapping.n_local_cells(), 2);
        assert_eq!(mapping.n_elements(), 8);

        let mut seen = vec![false; 8];
        for elems in mapping.g_cell_to_l_elems.values() {
            for &e in elems {
                assert!(!seen[e], "element {} mapped to two cells", e);
                seen[e] = true;
            }
        }
        // Union over all cells covers the full element set.
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_local_global_cell_maps_are_inverses() {
        let mapping = build_mapping();
        for (l_cell, &g_cell) in mapping.l_cell_to_g_cell.iter().enumerate() {
            assert_eq!(mapping.g_cell_to_l_cell[&g_cell], l_cell);
        }
        for (&g_cell, &l_cell) in &mapping.g_cell_to_l_cell {
            assert_eq!(mapping.l_cell_to_g_cell[l_cell], g_cell);
        }
    }

    #[test]
    fn test_volumes_conserved() {
        let mapping = build_mapping();
        for (l_cell, &volume) in mapping.l_cell_volumes.iter().enumerate() {
            let _ = l_cell;
            assert!((volume - 0.5).abs() < 1e-12);
        }
        for &v in &mapping.l_elem_volumes {
            assert!((v - 0.125).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cell_fluid_mask_is_any_of_elements() {
        let mut neutronics = MockNeutronics::slab(2, 1.0, 0.5);
        let mut heat = MockHeatFluids::channel(8, 2.0, 1.0);
        // All of cell 1's elements solid, one of cell 0's solid.
        heat.fluid = vec![1, 1, 0, 1, 0, 0, 0, 0];
        let mapping =
            SpatialMapping::build(&mut neutronics, &heat, &Comm::self_comm(), 1e-6).unwrap();
        assert_eq!(mapping.cell_fluid_mask, vec![1, 0]);
        assert_eq!(mapping.fluid_cell_handles(), vec![CellHandle(0)]);
    }

    #[test]
    fn test_unmapped_position_is_fatal() {
        let mut neutronics = MockNeutronics::slab(2, 1.0, 0.5);
        // Channel longer than the slab: last elements fall outside.
        let heat = MockHeatFluids::channel(8, 3.0, 1.0);
        let err = SpatialMapping::build(&mut neutronics, &heat, &Comm::self_comm(), 1e-6)
            .unwrap_err();
        assert!(matches!(err, CouplingError::UnmappedPosition { .. }));
    }

    #[test]
    fn test_volume_mismatch_is_fatal() {
        let mut neutronics = MockNeutronics::slab(2, 1.0, 0.5);
        // Element volumes sum to 0.45 per cell against a 0.5 transport volume.
        let heat = MockHeatFluids::channel(8, 2.0, 0.9);
        let err = SpatialMapping::build(&mut neutronics, &heat, &Comm::self_comm(), 1e-6)
            .unwrap_err();
        assert!(matches!(err, CouplingError::VolumeMismatch { .. }));
    }
}
