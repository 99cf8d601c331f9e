use std::fs::File;
use std::io::{BufWriter, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::Result;

/// A composited plane parked in an anonymous temp file.
///
/// Samples are stored row-major as little-endian f32 and mapped back on
/// demand. The file disappears when the plane is dropped.
pub struct SpilledPlane {
    mmap: Mmap,
    _file: File,
    height: usize,
    width: usize,
}

impl SpilledPlane {
    pub fn spill(plane: &Array2<f32>) -> Result<Self> {
        let (height, width) = plane.dim();
        let file = tempfile::tempfile()?;
        {
            let mut writer = BufWriter::new(&file);
            for &v in plane.iter() {
                writer.write_f32::<LittleEndian>(v)?;
            }
            writer.flush()?;
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            _file: file,
            height,
            width,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Read the plane back into memory.
    pub fn load(&self) -> Result<Array2<f32>> {
        let mut data = vec![0.0f32; self.height * self.width];
        LittleEndian::read_f32_into(&self.mmap[..data.len() * 4], &mut data);
        Ok(Array2::from_shape_vec((self.height, self.width), data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?)
    }
}

impl std::fmt::Debug for SpilledPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpilledPlane")
            .field("height", &self.height)
            .field("width", &self.width)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spilled_plane_reads_back() {
        let plane = Array2::from_shape_fn((7, 5), |(r, c)| r as f32 * 0.1 + c as f32 * 0.01);
        let spilled = SpilledPlane::spill(&plane).unwrap();
        assert_eq!(spilled.dim(), (7, 5));
        assert_eq!(spilled.load().unwrap(), plane);
    }
}
