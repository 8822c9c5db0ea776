//! Line-level raw capture (bronze tier)

mod capture;

pub use capture::{
    capture_directory, capture_file, decode, detect_encoding, list_input_files,
    sanitize_table_name, CaptureOutcome, CaptureReport, ENCODING_SAMPLE_BYTES,
};
