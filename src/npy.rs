//! NumPy `.npy` / `.npz` writers for IMU series and key-frame indices.

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::Result;
use crate::imu::ImuArchive;

const MAGIC: &[u8] = b"\x93NUMPY";
/// Magic, version and header-length prefix.
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const HEADER_ALIGN: usize = 64;

pub trait NpyElement: Copy {
    const DESCR: &'static str;

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()>;
}

impl NpyElement for f64 {
    const DESCR: &'static str = "<f8";

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_f64::<LittleEndian>(self)
    }
}

impl NpyElement for f32 {
    const DESCR: &'static str = "<f4";

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_f32::<LittleEndian>(self)
    }
}

impl NpyElement for i32 {
    const DESCR: &'static str = "<i4";

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self)
    }
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({n},)"),
        dims => {
            let parts: Vec<String> = dims.iter().map(usize::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Version 1.0 header, space padded so the data starts 64-byte aligned.
fn header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '{descr}', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(shape)
    );
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat_n(' ', pad));
    dict.push('\n');

    let mut out = Vec::with_capacity(PREAMBLE_LEN + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

/// Write a C-ordered array. `data.len()` must equal the product of `shape`.
pub fn write_npy<W: Write, T: NpyElement>(w: &mut W, shape: &[usize], data: &[T]) -> Result<()> {
    debug_assert_eq!(shape.iter().product::<usize>(), data.len());
    w.write_all(&header(T::DESCR, shape))?;
    for &v in data {
        v.write_le(w)?;
    }
    Ok(())
}

pub fn write_keyframes_npy(path: impl AsRef<Path>, keyframes: &[i32]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write_npy(&mut w, &[keyframes.len()], keyframes)?;
    w.flush()?;
    tracing::info!("Wrote {} key-frame indices to {}", keyframes.len(), path.as_ref().display());
    Ok(())
}

/// Uncompressed archive with `timestamp`, `accel` and `avel` members.
pub fn write_npz<W: Write + Seek>(writer: W, archive: &ImuArchive) -> Result<W> {
    let n = archive.len();
    let mut zw = zip::ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    zw.start_file("timestamp.npy", options).map_err(io::Error::other)?;
    write_npy(&mut zw, &[n], &archive.timestamp)?;
    zw.start_file("accel.npy", options).map_err(io::Error::other)?;
    write_npy(&mut zw, &[n, 3], archive.accel.as_flattened())?;
    zw.start_file("avel.npy", options).map_err(io::Error::other)?;
    write_npy(&mut zw, &[n, 3], archive.avel.as_flattened())?;

    Ok(zw.finish().map_err(io::Error::other)?)
}

pub fn write_npz_file(path: impl AsRef<Path>, archive: &ImuArchive) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_npz(file, archive)?;
    tracing::info!("Wrote {} IMU samples to {}", archive.len(), path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    fn data_offset(npy: &[u8]) -> usize {
        PREAMBLE_LEN + u16::from_le_bytes([npy[8], npy[9]]) as usize
    }

    #[test]
    fn header_is_aligned_and_terminated() {
        for shape in [vec![0], vec![7], vec![123_456, 3]] {
            let h = header("<f8", &shape);
            assert_eq!(h.len() % HEADER_ALIGN, 0);
            assert_eq!(&h[..6], MAGIC);
            assert_eq!(h.last(), Some(&b'\n'));
            let len = u16::from_le_bytes([h[8], h[9]]) as usize;
            assert_eq!(len + PREAMBLE_LEN, h.len());
        }
    }

    #[test]
    fn shape_literals_follow_python_tuples() {
        assert_eq!(shape_literal(&[5]), "(5,)");
        assert_eq!(shape_literal(&[5, 3]), "(5, 3)");
    }

    #[test]
    fn keyframe_array_layout() {
        let mut out = Vec::new();
        write_npy(&mut out, &[3], &[0i32, 0, 30]).unwrap();
        let data_start = data_offset(&out);
        assert_eq!(data_start % HEADER_ALIGN, 0);
        let text = String::from_utf8_lossy(&out[..data_start]);
        assert!(text.contains("'descr': '<i4'"));
        assert!(text.contains("'shape': (3,)"));
        assert_eq!(out.len(), data_start + 12);
        assert_eq!(&out[data_start + 8..], &30i32.to_le_bytes());
    }

    #[test]
    fn npz_holds_three_members() {
        let archive = ImuArchive {
            timestamp: vec![1.0, 2.0],
            accel: vec![[0.0, 0.0, 9.8], [0.1, 0.0, 9.7]],
            avel: vec![[1.0; 3], [2.0; 3]],
        };
        let bytes = write_npz(Cursor::new(Vec::new()), &archive).unwrap().into_inner();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, ["accel.npy", "avel.npy", "timestamp.npy"]);

        let mut accel = Vec::new();
        zip.by_name("accel.npy").unwrap().read_to_end(&mut accel).unwrap();
        let data_start = data_offset(&accel);
        assert!(String::from_utf8_lossy(&accel[..data_start]).contains("'shape': (2, 3)"));
        assert_eq!(accel.len(), data_start + 6 * 4);
        assert_eq!(&accel[data_start + 5 * 4..], &9.7f32.to_le_bytes());
    }
}
