//! CPU-side client buffers

use std::sync::Arc;

use super::{format::get_bpp, Buffer, Format, Fourcc, Modifier};
use crate::utils::{Buffer as BufferCoords, Size};

/// A shared-memory buffer as attached by a client
///
/// The pixel storage is shared, cloning the buffer is cheap.
#[derive(Debug, Clone)]
pub struct ShmBuffer {
    data: Arc<[u8]>,
    size: Size<i32, BufferCoords>,
    stride: u32,
    format: Fourcc,
}

/// Error returned when the storage is too small for the declared layout
#[derive(Debug, thiserror::Error)]
#[error("shm buffer of {len} bytes cannot hold {height} rows of stride {stride}")]
pub struct InvalidShmLayout {
    len: usize,
    height: i32,
    stride: u32,
}

impl ShmBuffer {
    /// Wrap client memory in a buffer
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        size: impl Into<Size<i32, BufferCoords>>,
        stride: u32,
        format: Fourcc,
    ) -> Result<ShmBuffer, InvalidShmLayout> {
        let data = data.into();
        let size = size.into();
        let min_stride = get_bpp(format).unwrap_or(32) as u64 / 8 * size.w.max(0) as u64;
        let needed = stride as u64 * size.h.max(0) as u64;
        if (stride as u64) < min_stride || (data.len() as u64) < needed {
            return Err(InvalidShmLayout {
                len: data.len(),
                height: size.h,
                stride,
            });
        }

        Ok(ShmBuffer {
            data,
            size,
            stride,
            format,
        })
    }

    /// Raw pixel storage
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Pixel format of the buffer
    pub fn fourcc(&self) -> Fourcc {
        self.format
    }
}

impl Buffer for ShmBuffer {
    fn size(&self) -> Size<i32, BufferCoords> {
        self.size
    }

    fn format(&self) -> Format {
        Format {
            code: self.format,
            modifier: Modifier::Linear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ShmBuffer;
    use crate::backend::allocator::Fourcc;

    #[test]
    fn rejects_short_storage() {
        assert!(ShmBuffer::new(vec![0u8; 16 * 4 * 15], (16, 16), 64, Fourcc::Argb8888).is_err());
        assert!(ShmBuffer::new(vec![0u8; 16 * 4 * 16], (16, 16), 64, Fourcc::Argb8888).is_ok());
    }

    #[test]
    fn rejects_stride_narrower_than_row() {
        assert!(ShmBuffer::new(vec![0u8; 4096], (16, 16), 32, Fourcc::Argb8888).is_err());
    }
}
