use snafu::ensure;

use crate::error::{InvalidLaunchShapeSnafu, Result};

/// Global and local work sizes of a kernel launch, padded to three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchShape {
    pub global_size: [usize; 3],
    pub local_size: [usize; 3],
}

impl LaunchShape {
    /// Build a launch shape from up to three global dimensions.
    ///
    /// A missing local size means one work item per group. Each local
    /// dimension must evenly divide its global dimension.
    pub fn new(global: &[usize], local: Option<&[usize]>) -> Result<Self> {
        let local_dims = local.unwrap_or(&[]);
        let invalid = || InvalidLaunchShapeSnafu { global: global.to_vec(), local: local_dims.to_vec() };
        ensure!(global.len() <= 3 && local_dims.len() <= global.len().max(1), invalid());

        let mut global_size = [1; 3];
        let mut local_size = [1; 3];
        global_size[..global.len()].copy_from_slice(global);
        local_size[..local_dims.len()].copy_from_slice(local_dims);
        ensure!(
            global_size.iter().zip(&local_size).all(|(&g, &l)| g > 0 && l > 0 && g % l == 0),
            invalid()
        );
        Ok(Self { global_size, local_size })
    }

    /// Total number of work items.
    pub fn work_items(&self) -> usize {
        self.global_size.iter().product()
    }
}

impl Default for LaunchShape {
    fn default() -> Self {
        Self { global_size: [1, 1, 1], local_size: [1, 1, 1] }
    }
}
