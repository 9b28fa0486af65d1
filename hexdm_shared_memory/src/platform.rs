//! Platform-specific segment mapping and process helpers.

mod linux;

pub use linux::{
    SegmentMapConfig, attach_segment_map, create_segment_map, get_current_pid, is_process_alive,
};
