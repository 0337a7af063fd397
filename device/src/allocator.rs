use crate::buffer::Buffer;
use crate::error::Result;

/// Flat buffer management.
///
/// Methods take `&self`; implementations use interior mutability for their
/// memory tables, matching the single-threaded execution model.
pub trait Allocator {
    fn alloc(&self, len: usize) -> Result<Buffer>;

    /// Copy host data into `buffer`; lengths must match.
    fn copy_in(&self, buffer: &Buffer, data: &[f32]) -> Result<()>;

    /// Copy `buffer` into host memory; lengths must match.
    fn copy_out(&self, buffer: &Buffer, out: &mut [f32]) -> Result<()>;

    /// Read a whole buffer back to the host.
    fn read(&self, buffer: &Buffer) -> Result<Vec<f32>> {
        let mut out = vec![0.0; buffer.len()];
        self.copy_out(buffer, &mut out)?;
        Ok(out)
    }
}
