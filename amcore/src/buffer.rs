//! Scratch-buffer layout and lifetime.
//!
//! One contiguous `f64` allocation backs every variable slot of a run:
//!
//! ```text
//! [ const slots | single slots | thread 0 region | thread 1 region | ... ]
//! ```
//!
//! Const and single slots occupy one cell each; each thread's sequential
//! region holds `slots × buffer_size` cells. Bounds are computed once per
//! run and handed out as disjoint slices (the scalar prefix shared
//! read-only, each thread region exclusively), so execution needs no locks.
use aminstr::tier::Tier;
use enum_map::EnumMap;
use log::debug;

/// Region map for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    counts: EnumMap<Tier, usize>,
    chunk: usize,
    threads: usize,
}

impl BufferLayout {
    pub fn new(counts: EnumMap<Tier, usize>, chunk: usize, threads: usize) -> Self {
        Self {
            counts,
            chunk,
            threads,
        }
    }

    pub fn counts(&self) -> &EnumMap<Tier, usize> {
        &self.counts
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.counts[tier]
    }

    /// Cells occupied by the const and single slots together.
    pub fn scalar_len(&self) -> usize {
        self.counts[Tier::Const] + self.counts[Tier::Single]
    }

    /// Cells of one thread's sequential region.
    pub fn region_len(&self) -> usize {
        self.counts[Tier::Sequential] * self.chunk
    }

    pub fn total_len(&self) -> usize {
        self.scalar_len() + self.threads * self.region_len()
    }
}

/// Owns the contiguous scratch allocation.
#[derive(Debug, Default)]
pub(crate) struct ScratchBuffer {
    cells: Vec<f64>,
}

impl ScratchBuffer {
    /// Allocate or grow to the layout's total size.
    ///
    /// The allocation is reused across runs while it stays large enough;
    /// growth invalidates prior contents (offsets shift with the layout).
    pub fn ensure(&mut self, layout: &BufferLayout) {
        let required = layout.total_len();
        if self.cells.len() < required {
            debug!(
                "growing scratch buffer from {} to {} cells",
                self.cells.len(),
                required
            );
            self.cells.resize(required, 0.0);
        }
    }

    /// The const and single areas, mutably.
    pub fn scalar_areas(&mut self, layout: &BufferLayout) -> (&mut [f64], &mut [f64]) {
        let (consts, rest) = self.cells.split_at_mut(layout.count(Tier::Const));
        let (singles, _) = rest.split_at_mut(layout.count(Tier::Single));
        (consts, singles)
    }

    /// The scalar areas read-only plus one exclusive region per thread.
    pub fn sequential_areas(
        &mut self,
        layout: &BufferLayout,
    ) -> (&[f64], &[f64], Vec<&mut [f64]>) {
        let (scalar, mut rest) = self.cells.split_at_mut(layout.scalar_len());
        let scalar: &[f64] = scalar;
        let (consts, singles) = scalar.split_at(layout.count(Tier::Const));

        let mut regions = Vec::with_capacity(layout.threads);
        for _ in 0..layout.threads {
            let (region, tail) = rest.split_at_mut(layout.region_len());
            regions.push(region);
            rest = tail;
        }
        (consts, singles, regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_map::enum_map;

    fn layout(n_const: usize, n_single: usize, n_seq: usize, chunk: usize, threads: usize) -> BufferLayout {
        BufferLayout::new(
            enum_map! {
                Tier::Const => n_const,
                Tier::Single => n_single,
                Tier::Sequential => n_seq,
            },
            chunk,
            threads,
        )
    }

    #[test]
    fn total_len_sums_scalar_prefix_and_thread_regions() {
        let layout = layout(3, 2, 4, 128, 4);
        assert_eq!(layout.scalar_len(), 5);
        assert_eq!(layout.region_len(), 512);
        assert_eq!(layout.total_len(), 5 + 4 * 512);
    }

    #[test]
    fn ensure_is_grow_only() {
        let mut buffer = ScratchBuffer::default();
        buffer.ensure(&layout(0, 0, 2, 64, 2));
        assert_eq!(buffer.cells.len(), 256);

        // A smaller layout must not shrink the allocation.
        buffer.ensure(&layout(0, 0, 1, 16, 1));
        assert_eq!(buffer.cells.len(), 256);

        buffer.ensure(&layout(4, 0, 2, 128, 2));
        assert_eq!(buffer.cells.len(), 516);
    }

    #[test]
    fn sequential_areas_hand_out_disjoint_regions() {
        let mut buffer = ScratchBuffer::default();
        let layout = layout(1, 1, 2, 8, 3);
        buffer.ensure(&layout);
        let (consts, singles, regions) = buffer.sequential_areas(&layout);
        assert_eq!(consts.len(), 1);
        assert_eq!(singles.len(), 1);
        assert_eq!(regions.len(), 3);
        assert!(regions.iter().all(|r| r.len() == 16));
    }
}
