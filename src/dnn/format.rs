//! Physical memory formats
//!
//! Logical dimensions are always given in the library's canonical order
//! (n, c, t/h/w/d as rank demands); the format describes how those
//! logical dimensions are arranged in physical memory. Plain formats are
//! permutations of the logical order; `NChw8c` blocks the channel
//! dimension in groups of 8 and pads it up to a multiple of 8.

const CHANNEL_BLOCK: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryFormat {
    /// Rank 1, plain vector
    X,
    /// Rank 2, batch x channel
    Nc,
    /// Rank 3, time x batch x channel
    Tnc,
    /// Rank 4, channel-first
    Nchw,
    /// Rank 4, channel-last
    Nhwc,
    /// Rank 5, channel-first
    Ncdhw,
    /// Rank 5, channel-last
    Ndhwc,
    /// Rank 4, channel-blocked with 8-wide channel groups
    NChw8c,
}

impl MemoryFormat {
    /// Tensor rank this format applies to
    pub fn rank(self) -> usize {
        match self {
            MemoryFormat::X => 1,
            MemoryFormat::Nc => 2,
            MemoryFormat::Tnc => 3,
            MemoryFormat::Nchw | MemoryFormat::Nhwc | MemoryFormat::NChw8c => 4,
            MemoryFormat::Ncdhw | MemoryFormat::Ndhwc => 5,
        }
    }

    /// Whether the format blocks a dimension (and may pad it)
    pub fn is_blocked(self) -> bool {
        matches!(self, MemoryFormat::NChw8c)
    }

    /// Physical ordering of the logical axes, outermost first.
    /// Blocked formats have no plain permutation.
    fn perm(self) -> Option<&'static [usize]> {
        match self {
            MemoryFormat::X => Some(&[0]),
            MemoryFormat::Nc => Some(&[0, 1]),
            MemoryFormat::Tnc => Some(&[0, 1, 2]),
            MemoryFormat::Nchw => Some(&[0, 1, 2, 3]),
            MemoryFormat::Nhwc => Some(&[0, 2, 3, 1]),
            MemoryFormat::Ncdhw => Some(&[0, 1, 2, 3, 4]),
            MemoryFormat::Ndhwc => Some(&[0, 2, 3, 4, 1]),
            MemoryFormat::NChw8c => None,
        }
    }

    /// Logical axis whose elements are adjacent in memory, if the format
    /// is a plain permutation.
    pub fn innermost_axis(self) -> Option<usize> {
        self.perm().and_then(|p| p.last().copied())
    }

    /// Per-logical-axis strides for plain permutation formats
    pub fn strides(self, dims: &[usize]) -> Option<Vec<usize>> {
        let perm = self.perm()?;
        debug_assert_eq!(perm.len(), dims.len());
        let mut strides = vec![0usize; dims.len()];
        let mut acc = 1usize;
        for &axis in perm.iter().rev() {
            strides[axis] = acc;
            acc = acc.saturating_mul(dims[axis]);
        }
        Some(strides)
    }

    /// Total number of elements the physical buffer holds, including any
    /// padding the format requires
    pub fn padded_count(self, dims: &[usize]) -> usize {
        match self {
            MemoryFormat::NChw8c => {
                let (n, c, h, w) = (dims[0], dims[1], dims[2], dims[3]);
                let c_blocks = c.div_ceil(CHANNEL_BLOCK);
                n * c_blocks * CHANNEL_BLOCK * h * w
            }
            _ => dims.iter().copied().product(),
        }
    }

    /// Physical element offset of a logical index tuple
    pub fn offset(self, idx: &[usize], dims: &[usize]) -> usize {
        match self {
            MemoryFormat::NChw8c => {
                let (n, c, h, w) = (idx[0], idx[1], idx[2], idx[3]);
                let c_blocks = dims[1].div_ceil(CHANNEL_BLOCK);
                let block = c / CHANNEL_BLOCK;
                let lane = c % CHANNEL_BLOCK;
                ((((n * c_blocks + block) * dims[2] + h) * dims[3] + w) * CHANNEL_BLOCK) + lane
            }
            _ => {
                // Permutation formats are covered by perm() above
                let strides = match self.strides(dims) {
                    Some(s) => s,
                    None => return 0,
                };
                idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
            }
        }
    }
}
