//! Schema command - Print the binary record layouts found in SVO2 files

use crate::error::Result;
use crate::imu::{IMU_FIELDS, IMU_RECORD_MIN_LEN};
use crate::records::{FileHeader, FixedRecord, FrameFooter, layout_offsets};

fn record_rows<R: FixedRecord>() -> Vec<(String, &'static str, usize, usize)> {
    layout_offsets(R::LAYOUT)
        .into_iter()
        .map(|(offset, f)| (f.name.to_string(), f.ty.as_str(), offset, f.ty.width()))
        .collect()
}

fn imu_rows() -> Vec<(String, &'static str, usize, usize)> {
    IMU_FIELDS
        .iter()
        .map(|&(name, ty, offset, count)| {
            let ty_name = ty.as_str();
            let name = if count > 1 {
                format!("{name}[{count}]")
            } else {
                name.to_string()
            };
            (name, ty_name, offset, ty.width() * count)
        })
        .collect()
}

fn print_table(title: &str, size: &str, rows: &[(String, &'static str, usize, usize)]) {
    println!("{title} ({size})");
    println!("---------------------------------------------------------------");
    println!("{:<30} {:<6} {:>8} {:>6}", "field", "type", "offset", "width");
    for (name, ty, offset, width) in rows {
        println!("{:<30} {:<6} {:>#8x} {:>6}", name, ty, offset, width);
    }
    println!();
}

/// Print FileHeader, FrameFooter and IMU record layouts
pub fn print_schema() -> Result<()> {
    print_table(
        FileHeader::NAME,
        &format!("{} bytes, base64 in svo_header", FileHeader::SIZE),
        &record_rows::<FileHeader>(),
    );
    print_table(
        FrameFooter::NAME,
        &format!("{} bytes, trails every side_by_side frame", FrameFooter::SIZE),
        &record_rows::<FrameFooter>(),
    );
    print_table(
        "ImuRecord",
        &format!(">= {IMU_RECORD_MIN_LEN} bytes, one per sensors message"),
        &imu_rows(),
    );
    Ok(())
}
