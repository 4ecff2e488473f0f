//! Parse a real NOMADS subregion file when one is available locally.
//!
//! Place `gfs_sample.grib2` in `crates/grib2-parser/testdata/` or point
//! `TEST_DATA_DIR` at a directory containing it.

use std::fs;
use std::sync::Arc;

use bytes::Bytes;
use grib2_parser::{Grib2Reader, Grib2Tables};
use test_utils::require_test_file;

#[test]
fn test_parse_gfs_file() {
    let path = require_test_file!("gfs_sample.grib2");

    let data = Bytes::from(fs::read(&path).expect("Failed to read test file"));
    let mut reader = Grib2Reader::new(data, Arc::new(Grib2Tables::ncep()));

    let mut count = 0;
    while let Some(msg) = reader.next_message().expect("message should decode") {
        count += 1;
        if count <= 5 {
            println!("Band {}: {} at {}", count, msg.parameter(), msg.level());
        }
        let (rows, cols) = msg.grid_dims();
        assert!(rows > 0 && cols > 0);
    }

    assert!(count > 0, "Should find at least one message");
}

#[test]
fn test_gfs_first_band_unpacks() {
    let path = require_test_file!("gfs_sample.grib2");

    let data = Bytes::from(fs::read(&path).expect("Failed to read test file"));
    let mut reader = Grib2Reader::new(data, Arc::new(Grib2Tables::ncep()));
    let msg = reader.message_at(1).unwrap().expect("band 1");

    let (values, width, height) = msg.unpack_grid().expect("unpack");
    assert_eq!(values.len(), width * height);
    assert!(values.iter().any(|v| v.is_finite()));
}
